// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The send path for one communication record.
//!
//! A dispatch makes at most one provider call. Successful and permanently
//! failed attempts write the record exactly once; transient failures leave it
//! untouched so the retry coordinator can decide what happens next.

use std::sync::Arc;

use courier_core::types::{
    OutboundMessage, is_transactional, validate_content, validate_sender,
};
use courier_core::{
    Clock, CommunicationRecord, CommunicationStore, CourierError, DeliveryStatus, ProviderKind,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::preferences::PreferenceGate;
use crate::registry::ProviderRegistry;
use crate::settings::SettingsResolver;

/// Result of one dispatch that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The provider accepted the message.
    Sent {
        provider: ProviderKind,
        external_id: String,
    },
    /// The record was already sent or delivered; nothing was done.
    AlreadySent {
        provider: Option<String>,
        external_id: Option<String>,
    },
    /// The recipient opted out of this category.
    ComplianceBlocked { reason: String },
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::ComplianceBlocked { .. })
    }
}

/// Caller-facing summary of a send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub provider: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn failure(id: Option<i64>, provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            id,
            external_id: None,
            provider: provider.into(),
            status: DeliveryStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Whether an error is settled by failing the record outright.
pub(crate) fn is_permanent(err: &CourierError) -> bool {
    matches!(err, CourierError::Config(_) | CourierError::Validation(_))
}

pub struct Dispatcher {
    store: Arc<dyn CommunicationStore>,
    gate: PreferenceGate,
    settings: Arc<SettingsResolver>,
    registry: ProviderRegistry,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn CommunicationStore>,
        gate: PreferenceGate,
        settings: Arc<SettingsResolver>,
        registry: ProviderRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gate,
            settings,
            registry,
            clock,
        }
    }

    /// Send the communication `id` once.
    ///
    /// Returns the transient error untouched (no write) so the caller can
    /// schedule a retry. Configuration and validation failures mark the
    /// record `failed` before returning.
    pub async fn dispatch(&self, id: i64) -> Result<DispatchOutcome, CourierError> {
        let record = self
            .store
            .get_communication(id)
            .await?
            .ok_or_else(|| CourierError::communication_not_found(id))?;

        if record.already_dispatched() {
            debug!(communication_id = id, status = %record.status, "already dispatched, skipping");
            return Ok(DispatchOutcome::AlreadySent {
                provider: record.provider,
                external_id: record.external_id,
            });
        }
        if record.status.is_terminal() {
            return Err(CourierError::Validation(format!(
                "communication {id} is already {}",
                record.status
            )));
        }

        match self.attempt(&record).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if is_permanent(&e) => {
                warn!(communication_id = id, error = %e, "send failed permanently");
                self.store
                    .mark_failed(id, &e.to_string(), self.clock.now())
                    .await?;
                Err(e)
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(communication_id = id, error = %e, "send failed, may be retried");
                }
                Err(e)
            }
        }
    }

    async fn attempt(&self, record: &CommunicationRecord) -> Result<DispatchOutcome, CourierError> {
        let id = record.id;
        validate_content(record.channel, &record.to_address, record.subject.as_deref())?;

        let category = record.category.as_deref();
        if !is_transactional(category)
            && !self
                .gate
                .can_send(record.subject_entity, record.channel, category)
                .await?
        {
            let reason = format!(
                "{} opted out of {} {}",
                record.subject_entity,
                category.unwrap_or_default(),
                record.channel
            );
            self.store
                .mark_failed(id, &format!("compliance blocked: {reason}"), self.clock.now())
                .await?;
            info!(communication_id = id, %reason, "send blocked by preferences");
            return Ok(DispatchOutcome::ComplianceBlocked { reason });
        }

        let settings = self
            .settings
            .resolve(record.channel, record.settings_override.as_ref())
            .await?;
        if !settings.enabled {
            return Err(CourierError::Config(format!(
                "{} is not configured",
                record.channel
            )));
        }

        let from = record
            .from_address
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .or(settings.default_from())
            .unwrap_or_default()
            .to_string();
        validate_sender(record.channel, Some(&from))?;

        let message = OutboundMessage {
            to: record.to_address.clone(),
            from: from.clone(),
            subject: record.subject.clone(),
            body: record.body.clone(),
            cc: record.cc.clone(),
            bcc: record.bcc.clone(),
            reply_to: record.reply_to.clone(),
            metadata: record.metadata.clone(),
        };

        let adapter = self.registry.build(settings);
        let provider = adapter.kind();
        debug!(communication_id = id, %provider, "handing message to provider");
        let receipt = adapter.send_message(&message).await?;

        // The provider has the message now. From here on no error may lead
        // to another attempt.
        match self
            .store
            .mark_sent(
                id,
                &provider.to_string(),
                &receipt.external_id,
                &from,
                receipt.provider_details,
                self.clock.now(),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(communication_id = id, "record moved on during send, status left as is");
            }
            Err(e) => {
                error!(
                    communication_id = id,
                    %provider,
                    external_id = %receipt.external_id,
                    error = %e,
                    "message accepted by provider but not recorded"
                );
            }
        }
        info!(
            communication_id = id,
            %provider,
            external_id = %receipt.external_id,
            "communication sent"
        );
        Ok(DispatchOutcome::Sent {
            provider,
            external_id: receipt.external_id,
        })
    }
}
