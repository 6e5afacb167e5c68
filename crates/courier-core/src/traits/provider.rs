// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for outbound transports (SMTP, SES, Twilio, etc.).

use async_trait::async_trait;

use crate::error::CourierError;
use crate::settings::ProviderKind;
use crate::types::{DeliveryLookup, OutboundMessage, SendReceipt, WebhookEvent, WebhookPayload};

/// Uniform contract over one concrete message transport.
///
/// Adapters are stateless with respect to communication records: they never
/// read or write storage. An adapter instance is built from a single resolved
/// settings snapshot and used for one send or one webhook.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    /// Which provider this adapter implements.
    fn kind(&self) -> ProviderKind;

    /// Hand a message to the provider.
    ///
    /// Fails with [`CourierError::Config`] before any network call when
    /// mandatory settings are missing, and with [`CourierError::Send`] when
    /// the transport or provider rejects the message.
    async fn send_message(&self, message: &OutboundMessage) -> Result<SendReceipt, CourierError>;

    /// Lightweight connectivity and credential check.
    ///
    /// Returns `false` rather than an error when the provider is not
    /// configured.
    async fn verify_configuration(&self) -> bool;

    /// Pull the current delivery status of a previously sent message.
    async fn get_delivery_status(&self, external_id: &str) -> Result<DeliveryLookup, CourierError> {
        let _ = external_id;
        Ok(DeliveryLookup::NotSupported)
    }

    /// Translate a provider-native callback into canonical events.
    fn handle_webhook(&self, payload: &WebhookPayload) -> Result<Vec<WebhookEvent>, CourierError>;
}
