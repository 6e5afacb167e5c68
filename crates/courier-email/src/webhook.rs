// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsers for email delivery callbacks.
//!
//! Two shapes are understood: the generic relay format (`{event, message_id}`
//! objects, singly or batched in an array) and Amazon SNS envelopes carrying
//! SES notifications.

use courier_core::CourierError;
use courier_core::types::{CanonicalEvent, WebhookEvent, WebhookPayload};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

fn parse_json(payload: &WebhookPayload) -> Result<Value, CourierError> {
    serde_json::from_str(&payload.body)
        .map_err(|e| CourierError::Webhook(format!("malformed JSON payload: {e}")))
}

/// Strip the angle brackets SMTP servers put around message ids.
fn bare_message_id(raw: &str) -> &str {
    raw.trim().trim_start_matches('<').trim_end_matches('>')
}

fn relay_event(name: &str) -> Option<CanonicalEvent> {
    match name {
        "delivered" => Some(CanonicalEvent::Delivered),
        "bounce" | "bounced" => Some(CanonicalEvent::Bounced),
        "dropped" => Some(CanonicalEvent::Failed),
        "open" => Some(CanonicalEvent::Opened),
        "click" => Some(CanonicalEvent::Clicked),
        "spam_report" | "spamreport" => Some(CanonicalEvent::Complaint),
        "processed" | "sent" => Some(CanonicalEvent::Sent),
        _ => None,
    }
}

/// Parse a generic relay callback.
pub fn parse_relay(payload: &WebhookPayload) -> Result<Vec<WebhookEvent>, CourierError> {
    let items = match parse_json(payload)? {
        Value::Array(items) => items,
        item @ Value::Object(_) => vec![item],
        _ => {
            return Err(CourierError::Webhook(
                "relay payload must be an object or an array".to_string(),
            ));
        }
    };

    let mut events = Vec::with_capacity(items.len());
    for item in items {
        let Some(name) = item.get("event").and_then(Value::as_str) else {
            warn!("relay webhook item without `event`, skipping");
            continue;
        };
        let Some(event) = relay_event(name) else {
            debug!(event = name, "ignoring unrecognised relay event");
            continue;
        };
        let external_id = ["message_id", "sg_message_id", "smtp-id"]
            .iter()
            .find_map(|key| item.get(*key).and_then(Value::as_str))
            .map(bare_message_id)
            .filter(|id| !id.is_empty());
        let Some(external_id) = external_id else {
            warn!(event = name, "relay webhook item without a message id, skipping");
            continue;
        };

        events.push(WebhookEvent {
            external_id: external_id.to_string(),
            event,
            details: item.clone(),
        });
    }
    Ok(events)
}

#[derive(Debug, Deserialize)]
struct SnsEnvelope {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "TopicArn", default)]
    topic_arn: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SesNotification {
    #[serde(default)]
    notification_type: Option<String>,
    #[serde(default)]
    event_type: Option<String>,
    mail: SesMail,
    #[serde(flatten)]
    rest: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SesMail {
    message_id: String,
}

fn ses_event(kind: &str) -> Option<CanonicalEvent> {
    match kind {
        "Delivery" => Some(CanonicalEvent::Delivered),
        "Bounce" => Some(CanonicalEvent::Bounced),
        "Complaint" => Some(CanonicalEvent::Complaint),
        "Send" => Some(CanonicalEvent::Sent),
        "Open" => Some(CanonicalEvent::Opened),
        "Click" => Some(CanonicalEvent::Clicked),
        "Reject" | "Rendering Failure" => Some(CanonicalEvent::Failed),
        _ => None,
    }
}

/// Parse an SNS envelope carrying an SES notification.
///
/// Subscription handshakes are logged and produce no events.
pub fn parse_ses(payload: &WebhookPayload) -> Result<Vec<WebhookEvent>, CourierError> {
    let envelope: SnsEnvelope = serde_json::from_str(&payload.body)
        .map_err(|e| CourierError::Webhook(format!("malformed SNS envelope: {e}")))?;

    match envelope.kind.as_str() {
        "Notification" => {}
        "SubscriptionConfirmation" | "UnsubscribeConfirmation" => {
            info!(
                kind = %envelope.kind,
                topic = envelope.topic_arn.as_deref().unwrap_or("unknown"),
                "SNS subscription message received; confirm it from the AWS console"
            );
            return Ok(Vec::new());
        }
        other => {
            debug!(kind = other, "ignoring SNS message type");
            return Ok(Vec::new());
        }
    }

    let message = envelope
        .message
        .ok_or_else(|| CourierError::Webhook("SNS notification without Message".to_string()))?;
    let notification: SesNotification = serde_json::from_str(&message)
        .map_err(|e| CourierError::Webhook(format!("malformed SES notification: {e}")))?;

    let Some(kind) = notification
        .notification_type
        .as_deref()
        .or(notification.event_type.as_deref())
    else {
        warn!("SES notification without notificationType or eventType");
        return Ok(Vec::new());
    };
    let Some(event) = ses_event(kind) else {
        debug!(kind, "ignoring SES notification type");
        return Ok(Vec::new());
    };

    // The type-specific object (`bounce`, `delivery`, ...) is the useful part.
    let key = kind.to_ascii_lowercase().replace(' ', "");
    let mut details = serde_json::Map::new();
    details.insert("notificationType".to_string(), Value::String(kind.to_string()));
    if let Some(fragment) = notification
        .rest
        .iter()
        .find(|(k, _)| k.to_ascii_lowercase() == key)
        .map(|(_, v)| v.clone())
    {
        details.insert(key, fragment);
    }

    Ok(vec![WebhookEvent {
        external_id: bare_message_id(&notification.mail.message_id).to_string(),
        event,
        details: Value::Object(details),
    }])
}
