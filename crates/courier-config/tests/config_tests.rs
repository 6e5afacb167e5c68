// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Courier configuration system.

use courier_config::diagnostic::ConfigError;
use courier_config::model::CourierConfig;
use courier_config::{load_and_validate_str, load_config_from_str};
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[service]
name = "crm-courier"
log_level = "debug"

[storage]
database_path = "/tmp/courier-test.db"
wal_mode = false

[gateway]
host = "0.0.0.0"
port = 8088
bearer_token = "s3cret"
public_base_url = "https://crm.example.com"

[email]
enabled = true
provider = "ses"
from_email = "noreply@example.com"
smtp_username = "AKIA"
smtp_password = "enc:v1:abcd"
ses_region = "eu-west-1"

[sms]
enabled = true
provider = "twilio"
from_number = "+15550001111"
twilio_account_sid = "AC123"
twilio_auth_token = "tok"
verify_signatures = false

[retry]
max_attempts = 5
base_delay_secs = 10
max_delay_secs = 600

[scheduler]
tick_interval_secs = 5
batch_size = 20

[settings]
cache_ttl_secs = 0

[vault]
salt = "000102030405060708090a0b0c0d0e0f"
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should load");
    assert_eq!(config.service.name, "crm-courier");
    assert_eq!(config.gateway.port, 8088);
    assert_eq!(config.gateway.bearer_token.as_deref(), Some("s3cret"));
    assert_eq!(config.email.provider.as_deref(), Some("ses"));
    assert_eq!(config.email.ses_region.as_deref(), Some("eu-west-1"));
    assert_eq!(config.email.timeout_secs, 30);
    assert!(!config.sms.verify_signatures);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.scheduler.batch_size, 20);
    assert_eq!(config.settings.cache_ttl_secs, 0);
    assert!(!config.storage.wal_mode);
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty config should load");
    assert_eq!(config.service.name, "courier");
    assert_eq!(config.gateway.host, "127.0.0.1");
    assert_eq!(config.gateway.port, 3080);
    assert!(config.gateway.bearer_token.is_none());
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_secs, 30);
    assert_eq!(config.retry.max_delay_secs, 3600);
    assert_eq!(config.settings.cache_ttl_secs, 60);
    assert!(config.sms.verify_signatures);
    assert!(config.email.enabled.is_none());
    assert_eq!(config.vault.passphrase_env, "COURIER_VAULT_KEY");
}

#[test]
fn unknown_field_in_email_is_rejected_with_suggestion() {
    let toml = r#"
[email]
smtp_hots = "mail.example.com"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown key");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "smtp_hots"
                && suggestion.as_deref() == Some("smtp_host")
                && valid_keys.contains("smtp_port")
        })
    });
    assert!(found, "expected UnknownKey for smtp_hots, got: {errors:?}");
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let err = load_config_from_str("[telegram]\nbot_token = \"x\"\n").expect_err("reject");
    assert!(format!("{err}").contains("telegram"));
}

#[test]
fn invalid_type_is_reported() {
    let toml = r#"
[gateway]
port = "eighty"
"#;
    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("port"))),
        "got: {errors:?}"
    );
}

#[test]
fn validation_errors_surface_from_load() {
    let toml = r#"
[sms]
provider = "smtp"
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("sms.provider")))
    );
}

/// Env overrides land on underscore-containing keys intact.
#[test]
fn dotted_override_sets_underscored_key() {
    let config: CourierConfig = Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string("[email]\nsmtp_host = \"from-toml\"\n"))
        .merge(("email.smtp_host", "from-env"))
        .merge(("sms.twilio_auth_token", "tok-from-env"))
        .extract()
        .expect("should merge overrides");

    assert_eq!(config.email.smtp_host.as_deref(), Some("from-env"));
    assert_eq!(config.sms.twilio_auth_token.as_deref(), Some("tok-from-env"));
}

#[test]
fn missing_config_files_silently_skipped() {
    let config: CourierConfig = Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file("/nonexistent/path/courier.toml"))
        .extract()
        .expect("missing file should be skipped");
    assert_eq!(config.service.name, "courier");
}

#[test]
fn email_section_converts_to_channel_settings() {
    let config = load_config_from_str(
        r#"
[email]
enabled = true
provider = "smtp"
smtp_host = "mail.example.com"
smtp_port = 2525
"#,
    )
    .unwrap();

    let settings = config.email.channel_settings();
    assert_eq!(settings.is_enabled, Some(true));
    assert_eq!(settings.smtp_host.as_deref(), Some("mail.example.com"));
    assert_eq!(settings.smtp_port, Some(2525));
    assert!(settings.twilio_account_sid.is_none());
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "smtp_hots".to_string(),
        suggestion: Some("smtp_host".to_string()),
        valid_keys: "smtp_host, smtp_port".to_string(),
        span: None,
        src: None,
    };
    assert!(error.code().is_some());
    assert!(
        error
            .help()
            .unwrap()
            .to_string()
            .contains("did you mean `smtp_host`")
    );

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render");
    assert!(buf.contains("smtp_hots"));
}
