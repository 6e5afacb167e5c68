// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery callbacks to canonical events on communication records.

use std::sync::Arc;

use courier_core::types::WebhookPayload;
use courier_core::{Clock, CommunicationStore, CourierError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::registry::{ProviderRegistry, parse_provider};
use crate::settings::SettingsResolver;

/// Tally of one ingested callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Events the provider payload contained.
    pub received: usize,
    /// Events appended to a record's history.
    pub applied: usize,
    /// Applied events that also moved the record's status.
    pub status_changes: usize,
    /// Events whose external id matched no record.
    pub unmatched: usize,
    pub unknown_provider: bool,
}

pub struct WebhookNormalizer {
    store: Arc<dyn CommunicationStore>,
    settings: Arc<SettingsResolver>,
    registry: ProviderRegistry,
    clock: Arc<dyn Clock>,
}

impl WebhookNormalizer {
    pub fn new(
        store: Arc<dyn CommunicationStore>,
        settings: Arc<SettingsResolver>,
        registry: ProviderRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            settings,
            registry,
            clock,
        }
    }

    /// Parse a provider callback and apply each event to its record.
    ///
    /// An unknown provider or an unmatched external id is logged and
    /// reported, never an error. Errors are malformed or unauthenticated
    /// payloads and storage failures.
    pub async fn ingest(
        &self,
        provider_name: &str,
        payload: &WebhookPayload,
    ) -> Result<IngestReport, CourierError> {
        let Ok(kind) = parse_provider(provider_name) else {
            warn!(provider = provider_name, "webhook for unknown provider ignored");
            return Ok(IngestReport {
                unknown_provider: true,
                ..IngestReport::default()
            });
        };

        let settings = self.settings.resolve_provider(kind).await?;
        let adapter = self.registry.build(settings);
        let events = adapter.handle_webhook(payload)?;
        let hint = kind.to_string();

        let mut report = IngestReport {
            received: events.len(),
            ..IngestReport::default()
        };
        for event in events {
            let Some(record) = self
                .store
                .find_by_external_id(&event.external_id, Some(&hint))
                .await?
            else {
                warn!(
                    provider = %kind,
                    external_id = %event.external_id,
                    event = %event.event,
                    "webhook for unknown message skipped"
                );
                report.unmatched += 1;
                continue;
            };

            let applied = self
                .store
                .apply_event(record.id, event.event, event.details, self.clock.now())
                .await?;
            report.applied += 1;
            if applied.status_changed() {
                report.status_changes += 1;
                info!(
                    communication_id = record.id,
                    from = %applied.previous_status,
                    to = %applied.status,
                    "delivery status updated"
                );
            } else {
                debug!(
                    communication_id = record.id,
                    event = %event.event,
                    status = %applied.status,
                    "event recorded"
                );
            }
        }
        Ok(report)
    }
}
