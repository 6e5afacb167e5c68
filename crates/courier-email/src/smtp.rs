// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMTP-based email adapter covering plain SMTP, Amazon SES, and Gmail relay.
//!
//! The three providers differ only in host defaults, credential
//! requirements, how the provider message id is recovered, and which webhook
//! shape they emit.

use async_trait::async_trait;
use courier_core::types::{OutboundMessage, SendReceipt, WebhookEvent, WebhookPayload};
use courier_core::{CourierError, ProviderAdapter, ProviderKind, ProviderSettings};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::Response;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::message::{build_email, new_message_id};
use crate::webhook;

pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SES_REGION: &str = "us-east-1";
pub const GMAIL_SMTP_HOST: &str = "smtp.gmail.com";

/// Port that implies TLS from the first byte instead of STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Email adapter for one resolved settings snapshot.
#[derive(Debug)]
pub struct SmtpProvider {
    settings: ProviderSettings,
}

impl SmtpProvider {
    /// Construction never fails; missing settings surface on first use.
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }

    /// The SMTP host to connect to, applying provider defaults.
    pub fn host(&self) -> Option<String> {
        if let Some(host) = self.settings.smtp_host.as_deref().filter(|h| !h.trim().is_empty()) {
            return Some(host.trim().to_string());
        }
        match self.settings.provider {
            ProviderKind::Ses => {
                let region = self
                    .settings
                    .ses_region
                    .as_deref()
                    .unwrap_or(DEFAULT_SES_REGION);
                Some(format!("email-smtp.{region}.amazonaws.com"))
            }
            ProviderKind::Gmail => Some(GMAIL_SMTP_HOST.to_string()),
            _ => None,
        }
    }

    pub fn port(&self) -> u16 {
        self.settings.smtp_port.unwrap_or(DEFAULT_SMTP_PORT)
    }

    fn credentials(&self) -> Option<Credentials> {
        let username = self.settings.smtp_username.as_deref()?;
        let password = self.settings.smtp_password.as_ref()?;
        Some(Credentials::new(
            username.to_string(),
            password.expose_secret().to_string(),
        ))
    }

    fn requires_credentials(&self) -> bool {
        matches!(self.settings.provider, ProviderKind::Ses | ProviderKind::Gmail)
    }

    /// Check that everything needed to open a connection is present.
    fn check_configured(&self) -> Result<String, CourierError> {
        if !self.settings.enabled {
            return Err(CourierError::Config(format!(
                "{} email provider is disabled",
                self.settings.provider
            )));
        }
        let host = self.host().ok_or_else(|| {
            CourierError::Config("email is not configured: smtp_host is missing".to_string())
        })?;
        if self.requires_credentials() && self.credentials().is_none() {
            return Err(CourierError::Config(format!(
                "{} requires smtp_username and smtp_password",
                self.settings.provider
            )));
        }
        Ok(host)
    }

    fn transport(&self, host: &str) -> Result<AsyncSmtpTransport<Tokio1Executor>, CourierError> {
        let port = self.port();
        let builder = if matches!(host, "localhost" | "127.0.0.1") {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        } else if port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| CourierError::Config(format!("invalid SMTP relay `{host}`: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| CourierError::Config(format!("invalid SMTP relay `{host}`: {e}")))?
        };

        let mut builder = builder.port(port).timeout(Some(self.settings.timeout));
        if let Some(credentials) = self.credentials() {
            builder = builder.credentials(credentials);
        }
        Ok(builder.build())
    }

    /// Provider message id for a successful send.
    fn external_id(&self, response: &Response, message_id: &str) -> String {
        if self.settings.provider == ProviderKind::Ses
            && let Some(id) = ses_message_id(response.first_line())
        {
            return id.to_string();
        }
        message_id
            .trim_start_matches('<')
            .trim_end_matches('>')
            .to_string()
    }
}

/// SES answers `250 Ok <message-id>`; the id is what its notifications key on.
fn ses_message_id(first_line: Option<&str>) -> Option<&str> {
    let mut words = first_line?.split_whitespace();
    match (words.next(), words.last()) {
        (Some(ok), Some(id)) if ok.eq_ignore_ascii_case("ok") => Some(id),
        _ => None,
    }
}

#[async_trait]
impl ProviderAdapter for SmtpProvider {
    fn kind(&self) -> ProviderKind {
        self.settings.provider
    }

    async fn send_message(&self, message: &OutboundMessage) -> Result<SendReceipt, CourierError> {
        let host = self.check_configured()?;
        let message_id = new_message_id(&message.from);
        let email = build_email(message, &message_id)?;
        let transport = self.transport(&host)?;

        debug!(provider = %self.settings.provider, host = %host, to = %message.to, "sending email");
        let response = tokio::time::timeout(self.settings.timeout, transport.send(email))
            .await
            .map_err(|_| CourierError::Timeout {
                duration: self.settings.timeout,
            })?
            .map_err(|e| CourierError::Send {
                message: format!("SMTP send via {host} failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let external_id = self.external_id(&response, &message_id);
        info!(provider = %self.settings.provider, external_id = %external_id, "email accepted");

        Ok(SendReceipt {
            external_id,
            provider_details: json!({
                "messageId": message_id,
                "smtpCode": response.code().to_string(),
                "smtpResponse": response
                    .message()
                    .map(|line| line.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
            }),
        })
    }

    async fn verify_configuration(&self) -> bool {
        let Ok(host) = self.check_configured() else {
            return false;
        };
        let Ok(transport) = self.transport(&host) else {
            return false;
        };
        match tokio::time::timeout(self.settings.timeout, transport.test_connection()).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                warn!(provider = %self.settings.provider, host = %host, error = %e, "SMTP connection check failed");
                false
            }
            Err(_) => {
                warn!(provider = %self.settings.provider, host = %host, "SMTP connection check timed out");
                false
            }
        }
    }

    fn handle_webhook(&self, payload: &WebhookPayload) -> Result<Vec<WebhookEvent>, CourierError> {
        match self.settings.provider {
            ProviderKind::Ses => webhook::parse_ses(payload),
            ProviderKind::Gmail => {
                debug!("gmail relay has no delivery webhooks, ignoring payload");
                Ok(Vec::new())
            }
            _ => webhook::parse_relay(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn settings(kind: ProviderKind) -> ProviderSettings {
        ProviderSettings::unconfigured(kind)
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            to: "a@x.com".into(),
            from: "b@y.com".into(),
            subject: Some("Hi".into()),
            body: "text".into(),
            ..OutboundMessage::default()
        }
    }

    #[test]
    fn host_defaults_per_provider() {
        assert_eq!(SmtpProvider::new(settings(ProviderKind::Smtp)).host(), None);
        assert_eq!(
            SmtpProvider::new(settings(ProviderKind::Ses)).host().as_deref(),
            Some("email-smtp.us-east-1.amazonaws.com")
        );
        let mut eu = settings(ProviderKind::Ses);
        eu.ses_region = Some("eu-west-1".into());
        assert_eq!(
            SmtpProvider::new(eu).host().as_deref(),
            Some("email-smtp.eu-west-1.amazonaws.com")
        );
        assert_eq!(
            SmtpProvider::new(settings(ProviderKind::Gmail)).host().as_deref(),
            Some(GMAIL_SMTP_HOST)
        );
        assert_eq!(SmtpProvider::new(settings(ProviderKind::Smtp)).port(), 587);
    }

    #[tokio::test]
    async fn missing_host_fails_fast_with_config_error() {
        let provider = SmtpProvider::new(settings(ProviderKind::Smtp));
        let err = provider.send_message(&message()).await.unwrap_err();
        assert!(matches!(err, CourierError::Config(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn gmail_without_credentials_is_a_config_error() {
        let provider = SmtpProvider::new(settings(ProviderKind::Gmail));
        let err = provider.send_message(&message()).await.unwrap_err();
        assert!(err.to_string().contains("smtp_username"));
    }

    #[tokio::test]
    async fn disabled_provider_is_a_config_error() {
        let mut s = settings(ProviderKind::Smtp);
        s.smtp_host = Some("mail.example.com".into());
        s.enabled = false;
        let err = SmtpProvider::new(s).send_message(&message()).await.unwrap_err();
        assert!(matches!(err, CourierError::Config(_)));
    }

    #[tokio::test]
    async fn verify_is_false_when_unconfigured() {
        assert!(!SmtpProvider::new(settings(ProviderKind::Smtp)).verify_configuration().await);
        assert!(!SmtpProvider::new(settings(ProviderKind::Ses)).verify_configuration().await);
    }

    #[test]
    fn credentials_require_both_parts() {
        let mut s = settings(ProviderKind::Ses);
        s.smtp_username = Some("AKIA".into());
        assert!(SmtpProvider::new(s.clone()).credentials().is_none());
        s.smtp_password = Some(SecretString::from("pw".to_string()));
        assert!(SmtpProvider::new(s).credentials().is_some());
    }

    #[test]
    fn ses_message_id_from_response_line() {
        assert_eq!(
            ses_message_id(Some("Ok 0100018f-1234-5678-000000")),
            Some("0100018f-1234-5678-000000")
        );
        assert_eq!(ses_message_id(Some("2.0.0 OK queued")), None);
        assert_eq!(ses_message_id(None), None);
    }

    #[test]
    fn webhook_shape_follows_provider() {
        let relay = WebhookPayload::json(r#"{"event":"delivered","message_id":"m1"}"#);
        let smtp = SmtpProvider::new(settings(ProviderKind::Smtp));
        assert_eq!(smtp.handle_webhook(&relay).unwrap().len(), 1);

        let gmail = SmtpProvider::new(settings(ProviderKind::Gmail));
        assert!(gmail.handle_webhook(&relay).unwrap().is_empty());

        let ses = SmtpProvider::new(settings(ProviderKind::Ses));
        assert!(ses.handle_webhook(&relay).is_err());
    }
}
