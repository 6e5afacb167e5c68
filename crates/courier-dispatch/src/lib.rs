// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send pipeline for Courier.
//!
//! [`Courier`] wires the compliance gate, settings resolution, provider
//! registry, dispatcher, retry coordinator, scheduler and webhook normalizer
//! over one [`CommunicationStore`] and one [`Clock`]. Callers that enqueue a
//! send get an acknowledgement of the enqueue, not of delivery; a [`Worker`]
//! drains the queue in the background.

pub mod dispatcher;
pub mod portal;
pub mod preferences;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod settings;
pub mod webhook;
pub mod worker;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_config::model::CourierConfig;
use courier_core::types::WebhookPayload;
use courier_core::{
    Channel, Clock, CommunicationDraft, CommunicationEvent, CommunicationRecord,
    CommunicationStore, CourierError, DeliveryStatus, SettingsSource, SystemClock,
};
use courier_vault::SecretSealer;
use serde::Serialize;
use tracing::{debug, info};

pub use dispatcher::{DispatchOutcome, Dispatcher, SendResult};
pub use portal::PortalProvider;
pub use preferences::{PreferenceGate, new_unsubscribe_token};
pub use registry::{ProviderRegistry, parse_provider, provider_for_channel};
pub use retry::{AttemptOutcome, RetryCoordinator, RetryPolicy};
pub use scheduler::{ProcessReport, ScheduledCommunication, Scheduler};
pub use settings::{SettingsResolver, StaticSettings};
pub use webhook::{IngestReport, WebhookNormalizer};
pub use worker::{TickReport, Worker};

/// A record together with its delivery history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationView {
    #[serde(flatten)]
    pub record: CommunicationRecord,
    pub events: Vec<CommunicationEvent>,
}

/// Entry point to the dispatch core. Cheap to clone.
#[derive(Clone)]
pub struct Courier {
    store: Arc<dyn CommunicationStore>,
    clock: Arc<dyn Clock>,
    settings: Arc<SettingsResolver>,
    registry: ProviderRegistry,
    gate: PreferenceGate,
    dispatcher: Arc<Dispatcher>,
    retry: Arc<RetryCoordinator>,
    scheduler: Arc<Scheduler>,
    webhooks: Arc<WebhookNormalizer>,
}

pub struct CourierBuilder {
    store: Arc<dyn CommunicationStore>,
    clock: Arc<dyn Clock>,
    registry: ProviderRegistry,
    settings: SettingsResolver,
    policy: RetryPolicy,
    batch_size: usize,
}

impl CourierBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn settings(mut self, settings: SettingsResolver) -> Self {
        self.settings = settings;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Records claimed per `process_due` run.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn build(self) -> Courier {
        let Self {
            store,
            clock,
            registry,
            settings,
            policy,
            batch_size,
        } = self;
        let settings = Arc::new(settings);
        let gate = PreferenceGate::new(store.clone(), clock.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            gate.clone(),
            settings.clone(),
            registry.clone(),
            clock.clone(),
        ));
        let retry = Arc::new(RetryCoordinator::new(
            dispatcher.clone(),
            store.clone(),
            policy,
            clock.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            retry.clone(),
            clock.clone(),
            batch_size,
        ));
        let webhooks = Arc::new(WebhookNormalizer::new(
            store.clone(),
            settings.clone(),
            registry.clone(),
            clock.clone(),
        ));
        Courier {
            store,
            clock,
            settings,
            registry,
            gate,
            dispatcher,
            retry,
            scheduler,
            webhooks,
        }
    }
}

impl Courier {
    pub fn builder(store: Arc<dyn CommunicationStore>) -> CourierBuilder {
        CourierBuilder {
            store,
            clock: Arc::new(SystemClock),
            registry: ProviderRegistry::new(),
            settings: SettingsResolver::new(),
            policy: RetryPolicy::default(),
            batch_size: 100,
        }
    }

    /// Wire a production instance from loaded configuration.
    pub fn from_config(
        config: &CourierConfig,
        store: Arc<dyn CommunicationStore>,
        source: Option<Arc<dyn SettingsSource>>,
        sealer: Option<Arc<SecretSealer>>,
    ) -> Self {
        let mut settings = SettingsResolver::from_config(config).with_sealer(sealer);
        if let Some(source) = source {
            settings = settings.with_source(source);
        }
        Self::builder(store)
            .settings(settings)
            .retry_policy(RetryPolicy::from_config(&config.retry))
            .batch_size(config.scheduler.batch_size)
            .build()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn retry(&self) -> &RetryCoordinator {
        &self.retry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn webhooks(&self) -> &WebhookNormalizer {
        &self.webhooks
    }

    pub fn preferences(&self) -> &PreferenceGate {
        &self.gate
    }

    pub fn settings(&self) -> &SettingsResolver {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn CommunicationStore> {
        &self.store
    }

    /// Background loop over this instance's scheduler and job queue.
    pub fn worker(&self, interval: Duration) -> Worker {
        Worker::new(
            self.scheduler.clone(),
            self.retry.clone(),
            self.store.clone(),
            self.clock.clone(),
            interval,
        )
    }

    /// Validate and persist a draft as a `pending` record. Nothing is sent.
    pub async fn create(&self, draft: &CommunicationDraft) -> Result<i64, CourierError> {
        draft.validate()?;
        self.store
            .insert_communication(draft, None, self.clock.now())
            .await
    }

    /// Persist a draft and queue its first send attempt.
    ///
    /// The result acknowledges the enqueue: `status` is `pending` and no
    /// external id is known yet.
    ///
    /// Settings are resolved before anything is written, so a configuration
    /// error leaves no record behind.
    pub async fn send(&self, draft: CommunicationDraft) -> Result<SendResult, CourierError> {
        draft.validate()?;
        let provider = self.provider_name(&draft).await?;
        let id = self.create(&draft).await?;
        let job_id = self.retry.submit(id).await?;
        debug!(communication_id = id, job_id, %provider, "send queued");
        Ok(SendResult {
            success: true,
            id: Some(id),
            external_id: None,
            provider,
            status: DeliveryStatus::Pending,
            error: None,
        })
    }

    /// Persist a draft and make the first attempt inline.
    ///
    /// A transient failure still queues a retry; the result then reports
    /// `pending` with the error that caused it.
    pub async fn send_now(&self, draft: CommunicationDraft) -> Result<SendResult, CourierError> {
        let id = self.create(&draft).await?;
        self.deliver(id).await
    }

    /// Make a send attempt for an existing record.
    ///
    /// A record that was already sent reports success without a provider
    /// call.
    pub async fn deliver(&self, id: i64) -> Result<SendResult, CourierError> {
        let outcome = self.retry.execute(id, 1).await?;
        let provider = match self.store.get_communication(id).await? {
            Some(CommunicationRecord {
                provider: Some(provider),
                ..
            }) => provider,
            Some(record) => self
                .settings
                .resolve(record.channel, record.settings_override.as_ref())
                .await
                .map(|settings| settings.provider.to_string())
                .unwrap_or_default(),
            None => String::new(),
        };

        let result = match outcome {
            AttemptOutcome::Dispatched(DispatchOutcome::Sent { external_id, .. }) => SendResult {
                success: true,
                id: Some(id),
                external_id: Some(external_id),
                provider,
                status: DeliveryStatus::Sent,
                error: None,
            },
            AttemptOutcome::Dispatched(DispatchOutcome::AlreadySent { external_id, .. }) => {
                SendResult {
                    success: true,
                    id: Some(id),
                    external_id,
                    provider,
                    status: DeliveryStatus::Sent,
                    error: None,
                }
            }
            AttemptOutcome::Dispatched(DispatchOutcome::ComplianceBlocked { reason }) => {
                SendResult::failure(Some(id), provider, format!("compliance blocked: {reason}"))
            }
            AttemptOutcome::RetryScheduled { error, .. } => SendResult {
                success: false,
                id: Some(id),
                external_id: None,
                provider,
                status: DeliveryStatus::Pending,
                error: Some(error),
            },
            AttemptOutcome::Failed { error, .. } => SendResult::failure(Some(id), provider, error),
            AttemptOutcome::Missing => {
                return Err(CourierError::communication_not_found(id));
            }
        };
        Ok(result)
    }

    pub async fn schedule(
        &self,
        draft: &CommunicationDraft,
        at: DateTime<Utc>,
    ) -> Result<ScheduledCommunication, CourierError> {
        self.scheduler.schedule(draft, at).await
    }

    pub async fn cancel(&self, id: i64) -> Result<bool, CourierError> {
        self.scheduler.cancel(id).await
    }

    pub async fn process_due(&self) -> Result<ProcessReport, CourierError> {
        self.scheduler.process_due().await
    }

    pub async fn ingest_webhook(
        &self,
        provider: &str,
        payload: &WebhookPayload,
    ) -> Result<IngestReport, CourierError> {
        self.webhooks.ingest(provider, payload).await
    }

    pub async fn communication(&self, id: i64) -> Result<CommunicationView, CourierError> {
        let record = self
            .store
            .get_communication(id)
            .await?
            .ok_or_else(|| CourierError::communication_not_found(id))?;
        let events = self.store.list_events(id).await?;
        Ok(CommunicationView { record, events })
    }

    /// Check that the provider configured for `channel` is usable.
    pub async fn verify(&self, channel: Channel) -> Result<bool, CourierError> {
        let settings = self.settings.resolve(channel, None).await?;
        if !settings.enabled {
            info!(%channel, "channel disabled, nothing to verify");
            return Ok(false);
        }
        let provider = settings.provider;
        let ok = self.registry.build(settings).verify_configuration().await;
        info!(%channel, %provider, ok, "provider configuration checked");
        Ok(ok)
    }

    async fn provider_name(&self, draft: &CommunicationDraft) -> Result<String, CourierError> {
        let settings = self
            .settings
            .resolve(draft.channel, draft.settings_override.as_ref())
            .await?;
        Ok(settings.provider.to_string())
    }
}
