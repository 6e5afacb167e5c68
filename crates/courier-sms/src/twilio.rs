// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio Programmable Messaging adapter.
//!
//! Sends through the REST API with HTTP basic auth, pulls delivery status on
//! demand, and normalizes status callbacks.

use async_trait::async_trait;
use courier_core::types::{
    CanonicalEvent, DeliveryLookup, DeliveryStatus, OutboundMessage, SendReceipt, WebhookEvent,
    WebhookPayload,
};
use courier_core::{CourierError, ProviderAdapter, ProviderKind, ProviderSettings};
use reqwest::header::CONTENT_TYPE;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::signature::verify_signature;

/// Twilio REST API root.
pub const API_BASE_URL: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    num_segments: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Twilio message status -> canonical event.
pub fn status_event(status: &str) -> Option<CanonicalEvent> {
    match status {
        "accepted" | "scheduled" | "queued" | "sending" | "sent" => Some(CanonicalEvent::Sent),
        "delivered" => Some(CanonicalEvent::Delivered),
        "failed" | "undelivered" | "canceled" => Some(CanonicalEvent::Failed),
        "read" => Some(CanonicalEvent::Opened),
        _ => None,
    }
}

/// Twilio message status -> record status, for pull-based lookups.
pub fn status_to_delivery(status: &str) -> Option<DeliveryStatus> {
    match status_event(status)? {
        CanonicalEvent::Sent => Some(DeliveryStatus::Sent),
        CanonicalEvent::Delivered | CanonicalEvent::Opened => Some(DeliveryStatus::Delivered),
        CanonicalEvent::Failed => Some(DeliveryStatus::Failed),
        _ => None,
    }
}

/// SMS adapter for one resolved settings snapshot.
#[derive(Debug)]
pub struct TwilioProvider {
    settings: ProviderSettings,
}

struct Account<'a> {
    sid: &'a str,
    token: &'a str,
}

impl TwilioProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }

    fn base_url(&self) -> &str {
        self.settings
            .api_base_url
            .as_deref()
            .unwrap_or(API_BASE_URL)
            .trim_end_matches('/')
    }

    fn account(&self) -> Result<Account<'_>, CourierError> {
        if !self.settings.enabled {
            return Err(CourierError::Config("twilio provider is disabled".to_string()));
        }
        let sid = self
            .settings
            .twilio_account_sid
            .as_deref()
            .filter(|s| !s.trim().is_empty());
        let token = self
            .settings
            .twilio_auth_token
            .as_ref()
            .map(|t| t.expose_secret())
            .filter(|t| !t.trim().is_empty());
        match (sid, token) {
            (Some(sid), Some(token)) => Ok(Account { sid, token }),
            _ => Err(CourierError::Config(
                "sms is not configured: twilio_account_sid and twilio_auth_token are required"
                    .to_string(),
            )),
        }
    }

    fn http(&self) -> Result<reqwest::Client, CourierError> {
        reqwest::Client::builder()
            .timeout(self.settings.timeout)
            .build()
            .map_err(|e| CourierError::Internal(format!("failed to build HTTP client: {e}")))
    }

    fn request_error(&self, e: reqwest::Error) -> CourierError {
        if e.is_timeout() {
            CourierError::Timeout {
                duration: self.settings.timeout,
            }
        } else {
            CourierError::Send {
                message: format!("Twilio request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }

    /// Map a non-success response. Credential and parameter rejections are
    /// permanent; throttling and server errors are transient.
    async fn response_error(response: reqwest::Response) -> CourierError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ApiError>(&body) {
            Ok(ApiError {
                code: Some(code),
                message: Some(message),
            }) => format!("Twilio error {code}: {message}"),
            _ => format!("Twilio returned {status}: {body}"),
        };
        match status.as_u16() {
            401 | 403 => CourierError::Config(detail),
            400 | 404 => CourierError::Validation(detail),
            _ => CourierError::send(detail),
        }
    }

    fn parse_callback(payload: &WebhookPayload) -> Result<Vec<(String, String)>, CourierError> {
        let looks_json = payload.body.trim_start().starts_with('{');
        if payload.is_form_encoded() || !looks_json {
            return serde_urlencoded::from_str(&payload.body)
                .map_err(|e| CourierError::Webhook(format!("malformed form payload: {e}")));
        }
        let object: serde_json::Map<String, Value> = serde_json::from_str(&payload.body)
            .map_err(|e| CourierError::Webhook(format!("malformed JSON payload: {e}")))?;
        Ok(object
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect())
    }

    fn check_signature(
        &self,
        payload: &WebhookPayload,
        params: &[(String, String)],
    ) -> Result<(), CourierError> {
        if !self.settings.verify_signatures {
            return Ok(());
        }
        let account = self
            .account()
            .map_err(|_| CourierError::Webhook("cannot verify signature: no auth token".into()))?;
        let signature = payload
            .header("x-twilio-signature")
            .ok_or_else(|| CourierError::Webhook("missing X-Twilio-Signature".into()))?;
        let url = payload
            .url
            .as_deref()
            .ok_or_else(|| CourierError::Webhook("cannot verify signature: request URL unknown".into()))?;
        if verify_signature(account.token, url, params, signature) {
            Ok(())
        } else {
            Err(CourierError::Webhook("invalid Twilio signature".into()))
        }
    }
}

#[async_trait]
impl ProviderAdapter for TwilioProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Twilio
    }

    async fn send_message(&self, message: &OutboundMessage) -> Result<SendReceipt, CourierError> {
        let account = self.account()?;
        let url = format!("{}/Accounts/{}/Messages.json", self.base_url(), account.sid);

        let mut form = vec![
            ("To", message.to.as_str()),
            ("From", message.from.as_str()),
            ("Body", message.body.as_str()),
        ];
        if let Some(callback) = message.metadata.get("statusCallback").and_then(Value::as_str) {
            form.push(("StatusCallback", callback));
        }
        let body = serde_urlencoded::to_string(&form)
            .map_err(|e| CourierError::Internal(format!("cannot encode Twilio form: {e}")))?;

        debug!(to = %message.to, "sending sms via twilio");
        let response = self
            .http()?
            .post(&url)
            .basic_auth(account.sid, Some(account.token))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            let err = Self::response_error(response).await;
            warn!(error = %err, "twilio rejected message");
            return Err(err);
        }

        let resource: MessageResource = response
            .json()
            .await
            .map_err(|e| CourierError::send(format!("unreadable Twilio response: {e}")))?;
        info!(external_id = %resource.sid, status = ?resource.status, "sms accepted");

        Ok(SendReceipt {
            provider_details: json!({
                "status": resource.status,
                "numSegments": resource.num_segments,
                "errorCode": resource.error_code,
            }),
            external_id: resource.sid,
        })
    }

    async fn verify_configuration(&self) -> bool {
        let Ok(account) = self.account() else {
            return false;
        };
        let Ok(client) = self.http() else {
            return false;
        };
        let url = format!("{}/Accounts/{}.json", self.base_url(), account.sid);
        match client
            .get(&url)
            .basic_auth(account.sid, Some(account.token))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "twilio credential check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "twilio unreachable");
                false
            }
        }
    }

    async fn get_delivery_status(&self, external_id: &str) -> Result<DeliveryLookup, CourierError> {
        let account = self.account()?;
        let url = format!(
            "{}/Accounts/{}/Messages/{external_id}.json",
            self.base_url(),
            account.sid
        );
        let response = self
            .http()?
            .get(&url)
            .basic_auth(account.sid, Some(account.token))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        if !response.status().is_success() {
            return Err(Self::response_error(response).await);
        }

        let resource: MessageResource = response
            .json()
            .await
            .map_err(|e| CourierError::send(format!("unreadable Twilio response: {e}")))?;
        let status = resource.status.unwrap_or_default();
        match status_to_delivery(&status) {
            Some(delivery) => Ok(DeliveryLookup::Status(delivery)),
            None => {
                warn!(status = %status, sid = %resource.sid, "unrecognised twilio status");
                Ok(DeliveryLookup::NotSupported)
            }
        }
    }

    fn handle_webhook(&self, payload: &WebhookPayload) -> Result<Vec<WebhookEvent>, CourierError> {
        let params = Self::parse_callback(payload)?;
        self.check_signature(payload, &params)?;

        let field = |names: &[&str]| {
            names.iter().find_map(|name| {
                params
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.as_str())
            })
        };

        let Some(sid) = field(&["MessageSid", "SmsSid"]).filter(|s| !s.is_empty()) else {
            warn!("twilio callback without MessageSid, skipping");
            return Ok(Vec::new());
        };
        let Some(status) = field(&["MessageStatus", "SmsStatus"]) else {
            warn!(sid, "twilio callback without MessageStatus, skipping");
            return Ok(Vec::new());
        };
        let Some(event) = status_event(status) else {
            debug!(sid, status, "ignoring twilio status");
            return Ok(Vec::new());
        };

        let mut details = serde_json::Map::new();
        for (key, value) in &params {
            details.insert(key.clone(), Value::String(value.clone()));
        }

        Ok(vec![WebhookEvent {
            external_id: sid.to_string(),
            event,
            details: Value::Object(details),
        }])
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::signature::compute_signature;

    fn settings(base_url: Option<&str>) -> ProviderSettings {
        let mut s = ProviderSettings::unconfigured(ProviderKind::Twilio);
        s.twilio_account_sid = Some("AC123".into());
        s.twilio_auth_token = Some(SecretString::from("token".to_string()));
        s.from_number = Some("+15559990000".into());
        s.api_base_url = base_url.map(str::to_string);
        s
    }

    fn sms() -> OutboundMessage {
        OutboundMessage {
            to: "+15550001111".into(),
            from: "+15559990000".into(),
            body: "Your appointment is confirmed".into(),
            ..OutboundMessage::default()
        }
    }

    #[tokio::test]
    async fn send_posts_form_and_returns_sid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Accounts/AC123/Messages.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B15550001111"))
            .and(body_string_contains("Body=Your+appointment+is+confirmed"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "sid": "SM42",
                "status": "queued",
                "num_segments": "1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = TwilioProvider::new(settings(Some(&server.uri())));
        let receipt = provider.send_message(&sms()).await.unwrap();
        assert_eq!(receipt.external_id, "SM42");
        assert_eq!(receipt.provider_details["status"], "queued");
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = TwilioProvider::new(settings(Some(&server.uri())))
            .send_message(&sms())
            .await
            .unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }

    #[tokio::test]
    async fn invalid_number_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 21211,
                "message": "The 'To' number is not a valid phone number.",
                "status": 400
            })))
            .mount(&server)
            .await;

        let err = TwilioProvider::new(settings(Some(&server.uri())))
            .send_message(&sms())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("21211"));
    }

    #[tokio::test]
    async fn bad_credentials_are_config_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = TwilioProvider::new(settings(Some(&server.uri())))
            .send_message(&sms())
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Config(_)));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_network() {
        let mut s = ProviderSettings::unconfigured(ProviderKind::Twilio);
        s.api_base_url = Some("http://127.0.0.1:9".into());
        let err = TwilioProvider::new(s).send_message(&sms()).await.unwrap_err();
        assert!(matches!(err, CourierError::Config(_)));
        assert!(!TwilioProvider::new(ProviderSettings::unconfigured(ProviderKind::Twilio))
            .verify_configuration()
            .await);
    }

    #[tokio::test]
    async fn verify_configuration_fetches_account() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Accounts/AC123.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sid": "AC123"})))
            .mount(&server)
            .await;
        assert!(TwilioProvider::new(settings(Some(&server.uri()))).verify_configuration().await);
    }

    #[tokio::test]
    async fn delivery_status_is_pulled_and_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Accounts/AC123/Messages/SM42.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"sid": "SM42", "status": "undelivered"})),
            )
            .mount(&server)
            .await;
        let lookup = TwilioProvider::new(settings(Some(&server.uri())))
            .get_delivery_status("SM42")
            .await
            .unwrap();
        assert_eq!(lookup, DeliveryLookup::Status(DeliveryStatus::Failed));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_event("queued"), Some(CanonicalEvent::Sent));
        assert_eq!(status_event("sending"), Some(CanonicalEvent::Sent));
        assert_eq!(status_event("delivered"), Some(CanonicalEvent::Delivered));
        assert_eq!(status_event("undelivered"), Some(CanonicalEvent::Failed));
        assert_eq!(status_event("failed"), Some(CanonicalEvent::Failed));
        assert_eq!(status_event("receiving"), None);
    }

    #[test]
    fn form_callback_becomes_event() {
        let payload = WebhookPayload::form(
            "MessageSid=MID-1&MessageStatus=delivered&ErrorCode=&To=%2B15550001111",
        );
        let provider = TwilioProvider::new(settings(None));
        let events = provider.handle_webhook(&payload).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_id, "MID-1");
        assert_eq!(events[0].event, CanonicalEvent::Delivered);
        assert_eq!(events[0].details["To"], "+15550001111");
    }

    #[test]
    fn json_callback_is_accepted() {
        let payload = WebhookPayload::json(r#"{"MessageSid":"MID-1","MessageStatus":"failed","ErrorCode":30003}"#);
        let events = TwilioProvider::new(settings(None)).handle_webhook(&payload).unwrap();
        assert_eq!(events[0].event, CanonicalEvent::Failed);
        assert_eq!(events[0].details["ErrorCode"], "30003");
    }

    #[test]
    fn callback_without_sid_is_skipped() {
        let payload = WebhookPayload::form("MessageStatus=delivered");
        assert!(TwilioProvider::new(settings(None)).handle_webhook(&payload).unwrap().is_empty());
    }

    #[test]
    fn signatures_are_enforced_when_enabled() {
        let mut s = settings(None);
        s.verify_signatures = true;
        let provider = TwilioProvider::new(s);

        let url = "https://crm.example.com/webhooks/twilio";
        let body = "MessageSid=SM1&MessageStatus=delivered";
        let params = vec![
            ("MessageSid".to_string(), "SM1".to_string()),
            ("MessageStatus".to_string(), "delivered".to_string()),
        ];

        let mut payload = WebhookPayload::form(body);
        payload.url = Some(url.to_string());
        assert!(provider.handle_webhook(&payload).is_err());

        payload.headers.insert(
            "x-twilio-signature".to_string(),
            compute_signature("token", url, &params),
        );
        assert_eq!(provider.handle_webhook(&payload).unwrap().len(), 1);

        payload
            .headers
            .insert("x-twilio-signature".to_string(), compute_signature("wrong", url, &params));
        assert!(matches!(provider.handle_webhook(&payload), Err(CourierError::Webhook(_))));
    }
}
