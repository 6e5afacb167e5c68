// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde attributes cannot express. All failures
//! are collected; validation does not stop at the first one.

use std::str::FromStr;

use courier_core::{Channel, ProviderKind};

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        invalid("gateway.host must not be empty".to_string());
    } else if host.parse::<std::net::IpAddr>().is_err()
        && !host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        invalid(format!(
            "gateway.host `{host}` is not a valid IP address or hostname"
        ));
    }

    if config.gateway.port == 0 {
        invalid("gateway.port must not be 0".to_string());
    }

    if let Some(token) = &config.gateway.bearer_token
        && token.trim().is_empty()
    {
        invalid("gateway.bearer_token must not be empty when set".to_string());
    }

    check_provider(
        &mut invalid,
        "email.provider",
        config.email.provider.as_deref(),
        Channel::Email,
    );
    check_provider(
        &mut invalid,
        "sms.provider",
        config.sms.provider.as_deref(),
        Channel::Sms,
    );

    if config.email.timeout_secs == 0 {
        invalid("email.timeout_secs must be at least 1".to_string());
    }
    if config.sms.timeout_secs == 0 {
        invalid("sms.timeout_secs must be at least 1".to_string());
    }

    if config.retry.max_attempts < 1 {
        invalid("retry.max_attempts must be at least 1".to_string());
    }
    if config.retry.base_delay_secs > config.retry.max_delay_secs {
        invalid(format!(
            "retry.base_delay_secs ({}) must not exceed retry.max_delay_secs ({})",
            config.retry.base_delay_secs, config.retry.max_delay_secs
        ));
    }

    if config.scheduler.tick_interval_secs == 0 {
        invalid("scheduler.tick_interval_secs must be at least 1".to_string());
    }
    if config.scheduler.batch_size == 0 {
        invalid("scheduler.batch_size must be at least 1".to_string());
    }

    if let Some(salt) = &config.vault.salt {
        let is_hex = salt.chars().all(|c| c.is_ascii_hexdigit());
        if salt.len() != 32 || !is_hex {
            invalid("vault.salt must be 32 hex characters (16 bytes)".to_string());
        }
    }
    if config.vault.kdf_memory_cost < 32768 {
        invalid(format!(
            "vault.kdf_memory_cost must be at least 32768 (32 MiB), got {}",
            config.vault.kdf_memory_cost
        ));
    }
    if config.vault.kdf_iterations < 2 {
        invalid(format!(
            "vault.kdf_iterations must be at least 2, got {}",
            config.vault.kdf_iterations
        ));
    }
    if config.vault.kdf_parallelism < 1 {
        invalid(format!(
            "vault.kdf_parallelism must be at least 1, got {}",
            config.vault.kdf_parallelism
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_provider(
    invalid: &mut impl FnMut(String),
    key: &str,
    provider: Option<&str>,
    channel: Channel,
) {
    let Some(name) = provider else {
        return;
    };
    match ProviderKind::from_str(name) {
        Ok(kind) if kind.channel() == channel => {}
        Ok(kind) => invalid(format!(
            "{key} `{name}` is a {} provider, not {channel}",
            kind.channel()
        )),
        Err(_) => invalid(format!("{key} `{name}` is not a known provider")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &CourierConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = CourierConfig::default();
        config.storage.database_path = "  ".to_string();
        assert!(messages(&config)[0].contains("database_path"));
    }

    #[test]
    fn unknown_email_provider_fails_validation() {
        let mut config = CourierConfig::default();
        config.email.provider = Some("pigeon".to_string());
        assert!(messages(&config)[0].contains("not a known provider"));
    }

    #[test]
    fn sms_provider_on_email_channel_fails_validation() {
        let mut config = CourierConfig::default();
        config.email.provider = Some("twilio".to_string());
        assert!(messages(&config)[0].contains("is a sms provider"));
    }

    #[test]
    fn gmail_relay_alias_is_accepted() {
        let mut config = CourierConfig::default();
        config.email.provider = Some("gmail_relay".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn inverted_retry_delays_fail_validation() {
        let mut config = CourierConfig::default();
        config.retry.base_delay_secs = 600;
        config.retry.max_delay_secs = 60;
        assert!(messages(&config)[0].contains("base_delay_secs"));
    }

    #[test]
    fn zero_gateway_port_fails_validation() {
        let mut config = CourierConfig::default();
        config.gateway.port = 0;
        assert!(messages(&config)[0].contains("gateway.port"));
    }

    #[test]
    fn malformed_salt_fails_validation() {
        let mut config = CourierConfig::default();
        config.vault.salt = Some("abc".to_string());
        assert!(messages(&config)[0].contains("vault.salt"));
    }

    #[test]
    fn errors_are_collected_not_short_circuited() {
        let mut config = CourierConfig::default();
        config.storage.database_path = String::new();
        config.scheduler.batch_size = 0;
        config.retry.max_attempts = 0;
        assert_eq!(messages(&config).len(), 3);
    }
}
