// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with queued send outcomes and
//! queued webhook events, recording every message it is asked to send.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use courier_core::types::{
    CanonicalEvent, DeliveryLookup, OutboundMessage, SendReceipt, WebhookEvent, WebhookPayload,
};
use courier_core::{CourierError, DeliveryStatus, ProviderAdapter, ProviderKind};

#[derive(Default)]
struct Inner {
    outcomes: VecDeque<Result<String, CourierError>>,
    sent: Vec<OutboundMessage>,
    events: Vec<WebhookEvent>,
    healthy: Option<bool>,
}

/// A provider whose send results are popped from a FIFO queue.
///
/// When the queue is empty a send succeeds with `MOCK-<n>` as the external
/// id. Clones share the queue and the call log.
#[derive(Clone)]
pub struct MockProvider {
    kind: ProviderKind,
    inner: Arc<Mutex<Inner>>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an accepted send with the given external id.
    pub fn succeed_with(&self, external_id: &str) -> &Self {
        self.lock().outcomes.push_back(Ok(external_id.to_string()));
        self
    }

    /// Queue a retryable send failure.
    pub fn fail_transient(&self, message: &str) -> &Self {
        self.lock()
            .outcomes
            .push_back(Err(CourierError::send(message.to_string())));
        self
    }

    /// Queue a configuration failure, which is never retried.
    pub fn fail_config(&self, message: &str) -> &Self {
        self.lock()
            .outcomes
            .push_back(Err(CourierError::Config(message.to_string())));
        self
    }

    /// Have the next `handle_webhook` call report this event.
    pub fn emit(&self, external_id: &str, event: CanonicalEvent) -> &Self {
        self.lock().events.push(WebhookEvent {
            external_id: external_id.to_string(),
            event,
            details: serde_json::json!({ "mock": true }),
        });
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.lock().healthy = Some(healthy);
    }

    /// Number of `send_message` calls so far.
    pub fn call_count(&self) -> usize {
        self.lock().sent.len()
    }

    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.lock().sent.clone()
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn send_message(&self, message: &OutboundMessage) -> Result<SendReceipt, CourierError> {
        let mut inner = self.lock();
        inner.sent.push(message.clone());
        let n = inner.sent.len();
        let external_id = match inner.outcomes.pop_front() {
            Some(outcome) => outcome?,
            None => format!("MOCK-{n}"),
        };
        Ok(SendReceipt {
            external_id,
            provider_details: serde_json::json!({ "mock": true, "call": n }),
        })
    }

    async fn verify_configuration(&self) -> bool {
        self.lock().healthy.unwrap_or(true)
    }

    async fn get_delivery_status(&self, _external_id: &str) -> Result<DeliveryLookup, CourierError> {
        Ok(DeliveryLookup::Status(DeliveryStatus::Sent))
    }

    fn handle_webhook(&self, _payload: &WebhookPayload) -> Result<Vec<WebhookEvent>, CourierError> {
        Ok(std::mem::take(&mut self.lock().events))
    }
}
