// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier dispatch service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use courier_core::ChannelSettings;
use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Environment-level email provider settings.
    #[serde(default)]
    pub email: EmailConfig,

    /// Environment-level SMS provider settings.
    #[serde(default)]
    pub sms: SmsConfig,

    /// Send retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Scheduled-send processing.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Settings-store caching.
    #[serde(default)]
    pub settings: SettingsCacheConfig,

    /// Secret decryption settings.
    #[serde(default)]
    pub vault: VaultConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "courier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "courier.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for the `/v1` API. `None` rejects every API request.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Externally visible base URL, used to rebuild the URL providers sign
    /// webhook requests against.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
            public_base_url: None,
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3080
}

/// Email settings supplied by the deployment environment.
///
/// These sit below the settings store and per-call overrides, and above
/// provider defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// One of `smtp`, `ses`, `gmail`.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub smtp_username: Option<String>,
    /// May be an `enc:v1:` sealed value.
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub ses_region: Option<String>,
    #[serde(default = "default_send_timeout_secs")]
    pub timeout_secs: u64,
}

impl EmailConfig {
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            is_enabled: self.enabled,
            provider: self.provider.clone(),
            from_email: self.from_email.clone(),
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            smtp_username: self.smtp_username.clone(),
            smtp_password: self.smtp_password.clone(),
            ses_region: self.ses_region.clone(),
            ..ChannelSettings::default()
        }
    }
}

/// SMS settings supplied by the deployment environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SmsConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Only `twilio` is supported.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub from_number: Option<String>,
    #[serde(default)]
    pub twilio_account_sid: Option<String>,
    /// May be an `enc:v1:` sealed value.
    #[serde(default)]
    pub twilio_auth_token: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_send_timeout_secs")]
    pub timeout_secs: u64,
    /// Reject status callbacks without a valid `X-Twilio-Signature`.
    #[serde(default = "default_verify_signatures")]
    pub verify_signatures: bool,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            provider: None,
            from_number: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            api_base_url: None,
            timeout_secs: default_send_timeout_secs(),
            verify_signatures: default_verify_signatures(),
        }
    }
}

impl SmsConfig {
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            is_enabled: self.enabled,
            provider: self.provider.clone(),
            from_number: self.from_number.clone(),
            twilio_account_sid: self.twilio_account_sid.clone(),
            twilio_auth_token: self.twilio_auth_token.clone(),
            api_base_url: self.api_base_url.clone(),
            ..ChannelSettings::default()
        }
    }
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_verify_signatures() -> bool {
    true
}

/// Retry policy for transient send failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles for each later attempt.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    30
}

fn default_max_delay_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Seconds between background ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Maximum scheduled records processed per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Hours finished jobs are kept before the worker deletes them.
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            batch_size: default_batch_size(),
            job_retention_hours: default_job_retention_hours(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    15
}

fn default_batch_size() -> usize {
    100
}

fn default_job_retention_hours() -> u64 {
    168
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsCacheConfig {
    /// How long settings-store lookups are reused, per channel.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for SettingsCacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    60
}

/// Secret decryption configuration.
///
/// The sealing key is derived with Argon2id from a passphrase read from the
/// named environment variable. Defaults follow OWASP recommendations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Environment variable holding the passphrase.
    #[serde(default = "default_passphrase_env")]
    pub passphrase_env: String,

    /// Hex-encoded 16-byte Argon2id salt. `None` disables decryption.
    #[serde(default)]
    pub salt: Option<String>,

    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB).
    #[serde(default = "default_kdf_memory_cost")]
    pub kdf_memory_cost: u32,

    /// Argon2id iteration count (default: 3).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Argon2id parallelism lanes (default: 4).
    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            passphrase_env: default_passphrase_env(),
            salt: None,
            kdf_memory_cost: default_kdf_memory_cost(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

fn default_passphrase_env() -> String {
    "COURIER_VAULT_KEY".to_string()
}

fn default_kdf_memory_cost() -> u32 {
    65536 // 64 MiB per OWASP recommendation
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}
