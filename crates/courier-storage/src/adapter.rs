// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the CommunicationStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use courier_config::model::StorageConfig;
use courier_core::types::{
    AppliedEvent, CanonicalEvent, Channel, CommunicationDraft, CommunicationEvent,
    CommunicationRecord, ComplianceAuditEntry, Job, PreferenceChange, PreferenceRecord,
    SubjectEntity,
};
use courier_core::{CommunicationStore, CourierError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed store. Delegates every operation to the typed query modules.
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the configured database file, running migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, CourierError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite storage initialized");
        Ok(Self::new(db))
    }

    pub async fn open_in_memory() -> Result<Self, CourierError> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checkpoint and close the underlying database.
    pub async fn close(self) -> Result<(), CourierError> {
        self.db.close().await
    }
}

#[async_trait]
impl CommunicationStore for SqliteStorage {
    // --- Communication records ---

    async fn insert_communication(
        &self,
        draft: &CommunicationDraft,
        scheduled_for: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<i64, CourierError> {
        queries::communications::insert(&self.db, draft, scheduled_for, now).await
    }

    async fn get_communication(
        &self,
        id: i64,
    ) -> Result<Option<CommunicationRecord>, CourierError> {
        queries::communications::get(&self.db, id).await
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
        provider_hint: Option<&str>,
    ) -> Result<Option<CommunicationRecord>, CourierError> {
        queries::communications::find_by_external_id(&self.db, external_id, provider_hint).await
    }

    async fn mark_sent(
        &self,
        id: i64,
        provider: &str,
        external_id: &str,
        from_address: &str,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<bool, CourierError> {
        queries::communications::mark_sent(
            &self.db,
            id,
            provider,
            external_id,
            from_address,
            details,
            at,
        )
        .await
    }

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, CourierError> {
        queries::communications::mark_failed(&self.db, id, error, at).await
    }

    async fn apply_event(
        &self,
        id: i64,
        event: CanonicalEvent,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<AppliedEvent, CourierError> {
        queries::events::apply(&self.db, id, event, details, at).await
    }

    async fn list_events(&self, id: i64) -> Result<Vec<CommunicationEvent>, CourierError> {
        queries::events::list(&self.db, id).await
    }

    // --- Scheduling ---

    async fn due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<i64>, CourierError> {
        queries::communications::due_scheduled(&self.db, now, limit).await
    }

    async fn claim_scheduled(&self, id: i64, now: DateTime<Utc>) -> Result<bool, CourierError> {
        queries::communications::claim_scheduled(&self.db, id, now).await
    }

    async fn cancel_scheduled(&self, id: i64, now: DateTime<Utc>) -> Result<bool, CourierError> {
        queries::communications::cancel_scheduled(&self.db, id, now).await
    }

    // --- Preferences ---

    async fn find_preference(
        &self,
        recipient: SubjectEntity,
        channel: Channel,
        category: Option<&str>,
    ) -> Result<Option<PreferenceRecord>, CourierError> {
        queries::preferences::find(&self.db, recipient, channel, category).await
    }

    async fn apply_preference_change(
        &self,
        change: &PreferenceChange,
    ) -> Result<PreferenceRecord, CourierError> {
        queries::preferences::apply_change(&self.db, change).await
    }

    async fn find_preference_by_token(
        &self,
        token: &str,
    ) -> Result<Option<PreferenceRecord>, CourierError> {
        queries::preferences::find_by_token(&self.db, token).await
    }

    async fn list_preference_audit(
        &self,
        preference_id: i64,
    ) -> Result<Vec<ComplianceAuditEntry>, CourierError> {
        queries::preferences::list_audit(&self.db, preference_id).await
    }

    // --- Job queue ---

    async fn enqueue_job(
        &self,
        communication_id: i64,
        attempts: u32,
        max_attempts: u32,
        available_at: DateTime<Utc>,
    ) -> Result<i64, CourierError> {
        queries::queue::enqueue(
            &self.db,
            communication_id,
            attempts,
            max_attempts,
            available_at,
            Utc::now(),
        )
        .await
    }

    async fn dequeue_job(&self, now: DateTime<Utc>) -> Result<Option<Job>, CourierError> {
        queries::queue::dequeue(&self.db, now).await
    }

    async fn ack_job(&self, id: i64, now: DateTime<Utc>) -> Result<(), CourierError> {
        queries::queue::ack(&self.db, id, now).await
    }

    async fn fail_job(&self, id: i64, error: &str, now: DateTime<Utc>) -> Result<(), CourierError> {
        queries::queue::fail(&self.db, id, error, now).await
    }

    async fn purge_jobs(&self, before: DateTime<Utc>) -> Result<usize, CourierError> {
        queries::queue::purge(&self.db, before).await
    }
}
