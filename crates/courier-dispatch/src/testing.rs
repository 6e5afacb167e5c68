// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unit-test fixtures shared by the dispatch modules.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use courier_core::types::{
    CanonicalEvent, OutboundMessage, SendReceipt, WebhookEvent, WebhookPayload,
};
use courier_core::{
    Channel, ChannelSettings, Clock, CommunicationDraft, CommunicationStore, CourierError,
    EntityKind, ProviderAdapter, ProviderKind, SubjectEntity,
};
use courier_storage::SqliteStorage;

use crate::{Courier, ProviderRegistry, SettingsResolver};

pub(crate) struct StepClock(Mutex<DateTime<Utc>>);

impl StepClock {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()))
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Adapter replaying scripted send results; succeeds once the script runs out.
pub(crate) struct StubAdapter {
    kind: ProviderKind,
    script: Mutex<VecDeque<Result<String, CourierError>>>,
    pub(crate) sends: AtomicUsize,
    pub(crate) webhook_events: Mutex<Vec<WebhookEvent>>,
}

impl StubAdapter {
    pub(crate) fn new(kind: ProviderKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            sends: AtomicUsize::new(0),
            webhook_events: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn push(&self, result: Result<&str, CourierError>) {
        self.script
            .lock()
            .unwrap()
            .push_back(result.map(str::to_string));
    }

    pub(crate) fn emit(&self, external_id: &str, event: CanonicalEvent) {
        self.webhook_events.lock().unwrap().push(WebhookEvent {
            external_id: external_id.to_string(),
            event,
            details: serde_json::json!({ "stub": true }),
        });
    }

    pub(crate) fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn send_message(&self, _message: &OutboundMessage) -> Result<SendReceipt, CourierError> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        let next = self.script.lock().unwrap().pop_front();
        let external_id = match next {
            Some(result) => result?,
            None => format!("STUB-{n}"),
        };
        Ok(SendReceipt {
            external_id,
            provider_details: serde_json::json!({}),
        })
    }

    async fn verify_configuration(&self) -> bool {
        true
    }

    fn handle_webhook(&self, _payload: &WebhookPayload) -> Result<Vec<WebhookEvent>, CourierError> {
        Ok(self.webhook_events.lock().unwrap().clone())
    }
}

pub(crate) struct Fixture {
    pub(crate) courier: Courier,
    pub(crate) store: Arc<dyn CommunicationStore>,
    pub(crate) clock: Arc<StepClock>,
    pub(crate) smtp: Arc<StubAdapter>,
}

pub(crate) async fn fixture() -> Fixture {
    let store: Arc<dyn CommunicationStore> = Arc::new(SqliteStorage::open_in_memory().await.unwrap());
    let clock = Arc::new(StepClock::new());
    let smtp = StubAdapter::new(ProviderKind::Smtp);
    let stub = smtp.clone();
    let registry = ProviderRegistry::new().with_adapter(ProviderKind::Smtp, move |_| {
        stub.clone() as Arc<dyn ProviderAdapter>
    });
    let settings = SettingsResolver::new().with_env(
        Channel::Email,
        ChannelSettings {
            from_email: Some("crm@y.com".into()),
            ..Default::default()
        },
    );
    let courier = Courier::builder(store.clone())
        .clock(clock.clone())
        .registry(registry)
        .settings(settings)
        .build();
    Fixture {
        courier,
        store,
        clock,
        smtp,
    }
}

pub(crate) fn email(to: &str) -> CommunicationDraft {
    CommunicationDraft::new(
        Channel::Email,
        SubjectEntity::new(EntityKind::Lead, 7),
        to,
        "text",
    )
    .with_from("b@y.com")
    .with_subject("Hi")
}
