// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by adapters, storage, and the dispatch pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CourierError;
use crate::settings::ChannelSettings;

/// Category exempt from marketing opt-out rules (receipts, password resets).
pub const TRANSACTIONAL_CATEGORY: &str = "transactional";

/// Returns true when a message of this category bypasses the preference gate.
///
/// An absent category is treated the same as transactional.
pub fn is_transactional(category: Option<&str>) -> bool {
    match category {
        None => true,
        Some(c) => c.trim().is_empty() || c.eq_ignore_ascii_case(TRANSACTIONAL_CATEGORY),
    }
}

/// Delivery medium of a communication.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    PortalMessage,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Delivery status of a communication record.
///
/// Status only moves forward: `pending < sent < {delivered, bounced, failed}`.
/// The three terminal states do not order against each other and none of
/// them can be left once reached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Bounced,
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered | Self::Failed | Self::Bounced => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Statuses from which a transition to `self` is allowed.
    pub fn predecessors(self) -> &'static [DeliveryStatus] {
        match self {
            Self::Pending => &[],
            Self::Sent => &[Self::Pending],
            Self::Delivered | Self::Failed | Self::Bounced => &[Self::Pending, Self::Sent],
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduledStatus {
    Immediate,
    Scheduled,
    Cancelled,
}

/// Channel-agnostic form of a delivery notification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CanonicalEvent {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Failed,
    Complaint,
}

impl CanonicalEvent {
    /// Terminal status this event moves a record into, if any.
    ///
    /// Engagement events (opens, clicks, complaints) and provider-side `sent`
    /// acknowledgements are recorded in history without touching status.
    pub fn terminal_status(self) -> Option<DeliveryStatus> {
        match self {
            Self::Delivered => Some(DeliveryStatus::Delivered),
            Self::Bounced => Some(DeliveryStatus::Bounced),
            Self::Failed => Some(DeliveryStatus::Failed),
            Self::Sent | Self::Opened | Self::Clicked | Self::Complaint => None,
        }
    }
}

/// The closed set of CRM entity kinds a communication can be about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum EntityKind {
    Lead,
    Account,
    Contact,
    Deal,
    Quote,
}

/// Opaque reference to a CRM entity. The dispatch core never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectEntity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: i64,
}

impl SubjectEntity {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for SubjectEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

fn blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Check the channel-specific required fields of a communication.
///
/// Email requires subject, recipient, and sender; SMS requires recipient and
/// sender. Portal messages only need a recipient. `from` is checked after the
/// configured default sender has been applied.
pub fn validate_fields(
    channel: Channel,
    to: &str,
    from: Option<&str>,
    subject: Option<&str>,
) -> Result<(), CourierError> {
    validate_content(channel, to, subject)?;
    validate_sender(channel, from)
}

/// Recipient and subject checks; everything except the sender.
pub fn validate_content(
    channel: Channel,
    to: &str,
    subject: Option<&str>,
) -> Result<(), CourierError> {
    if to.trim().is_empty() {
        return Err(CourierError::Validation(format!(
            "{channel} requires a recipient address"
        )));
    }
    if channel == Channel::Email && blank(subject) {
        return Err(CourierError::Validation("email requires a subject".into()));
    }
    Ok(())
}

pub fn validate_sender(channel: Channel, from: Option<&str>) -> Result<(), CourierError> {
    if !blank(from) {
        return Ok(());
    }
    match channel {
        Channel::Email => Err(CourierError::Validation(
            "email requires a from address".into(),
        )),
        Channel::Sms => Err(CourierError::Validation("sms requires a from number".into())),
        Channel::PortalMessage => Ok(()),
    }
}

/// A communication as requested by a CRM caller, before it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationDraft {
    pub channel: Channel,
    pub subject_entity: SubjectEntity,
    pub to: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Explicit per-call provider settings; highest resolution priority.
    #[serde(default)]
    pub settings_override: Option<ChannelSettings>,
}

impl CommunicationDraft {
    /// Build a minimal draft; remaining fields default to empty.
    pub fn new(
        channel: Channel,
        subject_entity: SubjectEntity,
        to: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            subject_entity,
            to: to.into(),
            from: None,
            subject: None,
            body: body.into(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: None,
            category: None,
            metadata: serde_json::Map::new(),
            settings_override: None,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Validate the fields known before the sender is resolved.
    ///
    /// A missing `from` is accepted here; the channel's configured default
    /// sender fills it at dispatch time.
    pub fn validate(&self) -> Result<(), CourierError> {
        validate_content(self.channel, &self.to, self.subject.as_deref())
    }
}

/// One outbound or inbound message and its delivery state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationRecord {
    pub id: i64,
    pub subject_entity: SubjectEntity,
    pub direction: Direction,
    pub channel: Channel,
    pub provider: Option<String>,
    pub status: DeliveryStatus,
    pub category: Option<String>,
    pub subject: Option<String>,
    pub body: String,
    pub from_address: Option<String>,
    pub to_address: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub scheduled_status: ScheduledStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing)]
    pub settings_override: Option<ChannelSettings>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommunicationRecord {
    /// Whether a dispatch of this record would be a duplicate.
    pub fn already_dispatched(&self) -> bool {
        matches!(
            self.status,
            DeliveryStatus::Sent | DeliveryStatus::Delivered
        )
    }
}

/// Append-only entry in a communication's delivery history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationEvent {
    pub id: i64,
    pub communication_id: i64,
    pub event_type: CanonicalEvent,
    pub occurred_at: DateTime<Utc>,
    pub details: serde_json::Value,
}

/// Result of applying a delivery event to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedEvent {
    pub event_id: i64,
    pub previous_status: DeliveryStatus,
    pub status: DeliveryStatus,
}

impl AppliedEvent {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.status
    }
}

// --- Preferences ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PreferenceAction {
    OptIn,
    OptOut,
}

/// Opt-in/opt-out state of one recipient for a channel and category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRecord {
    pub id: i64,
    pub recipient: SubjectEntity,
    pub channel: Channel,
    pub category: Option<String>,
    pub opted_in: bool,
    pub opted_in_at: Option<DateTime<Utc>>,
    pub opted_out_at: Option<DateTime<Utc>>,
    pub opt_out_reason: Option<String>,
    #[serde(skip_serializing)]
    pub unsubscribe_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A requested opt change, applied as an upsert plus one audit entry.
#[derive(Debug, Clone)]
pub struct PreferenceChange {
    pub recipient: SubjectEntity,
    pub channel: Channel,
    pub category: Option<String>,
    pub action: PreferenceAction,
    pub reason: Option<String>,
    pub ip: Option<String>,
    pub at: DateTime<Utc>,
    /// Used only when the change creates the record.
    pub new_token: String,
}

/// Immutable compliance trail entry for one opt change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceAuditEntry {
    pub id: i64,
    pub preference_id: i64,
    pub action: PreferenceAction,
    pub reason: Option<String>,
    pub ip: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

// --- Provider boundary ---

/// Fully resolved message handed to a provider adapter.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub to: String,
    pub from: String,
    pub subject: Option<String>,
    pub body: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Successful provider acceptance of a message.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub external_id: String,
    pub provider_details: serde_json::Value,
}

/// Answer to a pull-based delivery status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryLookup {
    Status(DeliveryStatus),
    NotSupported,
}

/// Raw inbound provider callback as received over HTTP.
#[derive(Debug, Clone, Default)]
pub struct WebhookPayload {
    pub content_type: Option<String>,
    pub body: String,
    /// Header names lowercased.
    pub headers: std::collections::BTreeMap<String, String>,
    /// Public URL the provider posted to, for signature checks.
    pub url: Option<String>,
}

impl WebhookPayload {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn form(body: impl Into<String>) -> Self {
        Self {
            content_type: Some("application/x-www-form-urlencoded".to_string()),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_form_encoded(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
    }
}

/// One normalized delivery notification extracted from a webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub external_id: String,
    pub event: CanonicalEvent,
    pub details: serde_json::Value,
}

// --- Job queue ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A delayed unit of send work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub communication_id: i64,
    /// Send attempts already made for the communication before this job.
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: JobStatus,
    pub available_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Sent,
        DeliveryStatus::Delivered,
        DeliveryStatus::Failed,
        DeliveryStatus::Bounced,
    ];

    #[test]
    fn terminal_states_never_transition() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn forward_transitions_allowed() {
        use DeliveryStatus::*;
        assert!(Pending.can_transition_to(Sent));
        assert!(Pending.can_transition_to(Failed));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Sent.can_transition_to(Bounced));
        assert!(Sent.can_transition_to(Failed));
        assert!(!Sent.can_transition_to(Pending));
        assert!(!Sent.can_transition_to(Sent));
    }

    #[test]
    fn predecessors_agree_with_transition_rule() {
        for to in ALL {
            for from in ALL {
                assert_eq!(
                    to.predecessors().contains(&from),
                    from.can_transition_to(to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn engagement_events_do_not_change_status() {
        assert_eq!(CanonicalEvent::Opened.terminal_status(), None);
        assert_eq!(CanonicalEvent::Clicked.terminal_status(), None);
        assert_eq!(CanonicalEvent::Complaint.terminal_status(), None);
        assert_eq!(
            CanonicalEvent::Bounced.terminal_status(),
            Some(DeliveryStatus::Bounced)
        );
    }

    #[test]
    fn enums_use_snake_case_wire_names() {
        assert_eq!(Channel::PortalMessage.to_string(), "portal_message");
        assert_eq!(Channel::from_str("sms").unwrap(), Channel::Sms);
        assert_eq!(
            serde_json::to_string(&ScheduledStatus::Scheduled).unwrap(),
            "\"scheduled\""
        );
        assert_eq!(EntityKind::from_str("Lead").unwrap(), EntityKind::Lead);
        assert!(EntityKind::from_str("Invoice").is_err());
    }

    #[test]
    fn subject_entity_serializes_with_type_key() {
        let entity = SubjectEntity::new(EntityKind::Lead, 7);
        let json = serde_json::to_value(entity).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Lead", "id": 7}));
        assert_eq!(entity.to_string(), "Lead#7");
    }

    #[test]
    fn transactional_category_detection() {
        assert!(is_transactional(None));
        assert!(is_transactional(Some("transactional")));
        assert!(is_transactional(Some("Transactional")));
        assert!(!is_transactional(Some("marketing")));
    }

    #[test]
    fn email_requires_subject_and_sender() {
        let err = validate_fields(Channel::Email, "a@x.com", Some("b@y.com"), Some("  "));
        assert!(matches!(err, Err(CourierError::Validation(_))));
        let err = validate_fields(Channel::Email, "a@x.com", None, Some("Hi"));
        assert!(matches!(err, Err(CourierError::Validation(_))));
        assert!(validate_fields(Channel::Email, "a@x.com", Some("b@y.com"), Some("Hi")).is_ok());
    }

    #[test]
    fn sms_requires_recipient_and_sender() {
        assert!(validate_fields(Channel::Sms, "", Some("+15550000"), None).is_err());
        assert!(validate_fields(Channel::Sms, "+15551111", None, None).is_err());
        assert!(validate_fields(Channel::Sms, "+15551111", Some("+15550000"), None).is_ok());
    }

    #[test]
    fn draft_validation_defers_sender_check() {
        let draft = CommunicationDraft::new(
            Channel::Email,
            SubjectEntity::new(EntityKind::Account, 3),
            "a@x.com",
            "text",
        )
        .with_subject("Hi");
        assert!(draft.validate().is_ok());

        let no_subject = CommunicationDraft::new(
            Channel::Email,
            SubjectEntity::new(EntityKind::Account, 3),
            "a@x.com",
            "text",
        );
        assert!(no_subject.validate().is_err());
    }

    #[test]
    fn draft_deserializes_from_camel_case() {
        let json = serde_json::json!({
            "channel": "email",
            "subjectEntity": {"type": "Quote", "id": 12},
            "to": "a@x.com",
            "subject": "Your quote",
            "body": "text",
            "replyTo": "sales@y.com",
            "category": "transactional"
        });
        let draft: CommunicationDraft = serde_json::from_value(json).unwrap();
        assert_eq!(draft.subject_entity.kind, EntityKind::Quote);
        assert_eq!(draft.reply_to.as_deref(), Some("sales@y.com"));
        assert!(draft.cc.is_empty());
    }

    #[test]
    fn webhook_payload_header_lookup_is_case_insensitive() {
        let mut payload = WebhookPayload::form("MessageSid=SM1");
        payload
            .headers
            .insert("x-twilio-signature".into(), "abc".into());
        assert_eq!(payload.header("X-Twilio-Signature"), Some("abc"));
        assert!(payload.is_form_encoded());
    }

    mod monotonic {
        use proptest::prelude::*;

        use super::super::*;

        fn any_event() -> impl Strategy<Value = CanonicalEvent> {
            prop_oneof![
                Just(CanonicalEvent::Sent),
                Just(CanonicalEvent::Delivered),
                Just(CanonicalEvent::Opened),
                Just(CanonicalEvent::Clicked),
                Just(CanonicalEvent::Bounced),
                Just(CanonicalEvent::Failed),
                Just(CanonicalEvent::Complaint),
            ]
        }

        proptest! {
            #[test]
            fn status_never_leaves_terminal(events in proptest::collection::vec(any_event(), 0..32)) {
                let mut status = DeliveryStatus::Sent;
                let mut reached_terminal = false;
                for event in events {
                    if let Some(next) = event.terminal_status()
                        && status.can_transition_to(next)
                    {
                        status = next;
                    }
                    if reached_terminal {
                        prop_assert!(status.is_terminal());
                    }
                    reached_terminal |= status.is_terminal();
                }
            }
        }
    }
}
