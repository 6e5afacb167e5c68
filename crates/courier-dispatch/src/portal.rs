// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-app portal messages.
//!
//! Portal messages are stored by the CRM and shown to the recipient on next
//! login; there is no transport, so acceptance is immediate.

use async_trait::async_trait;
use courier_core::types::{OutboundMessage, SendReceipt, WebhookEvent, WebhookPayload};
use courier_core::{CourierError, ProviderAdapter, ProviderKind, ProviderSettings};
use serde_json::json;
use tracing::debug;

#[derive(Debug)]
pub struct PortalProvider {
    settings: ProviderSettings,
}

impl PortalProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProviderAdapter for PortalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Portal
    }

    async fn send_message(&self, message: &OutboundMessage) -> Result<SendReceipt, CourierError> {
        if !self.settings.enabled {
            return Err(CourierError::Config("portal messages are disabled".to_string()));
        }
        let external_id = format!("portal-{}", uuid::Uuid::new_v4());
        debug!(%external_id, to = %message.to, "portal message accepted");
        Ok(SendReceipt {
            external_id,
            provider_details: json!({ "delivery": "in_app" }),
        })
    }

    async fn verify_configuration(&self) -> bool {
        self.settings.enabled
    }

    fn handle_webhook(&self, _payload: &WebhookPayload) -> Result<Vec<WebhookEvent>, CourierError> {
        Ok(Vec::new())
    }
}
