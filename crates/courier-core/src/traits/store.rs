// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage trait for communication records, preferences, and the job queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CourierError;
use crate::types::{
    AppliedEvent, CanonicalEvent, Channel, CommunicationDraft, CommunicationEvent,
    CommunicationRecord, ComplianceAuditEntry, Job, PreferenceChange, PreferenceRecord,
    SubjectEntity,
};

/// Durable state of the dispatch core.
///
/// Every status-changing method is a compare-and-set: it only applies when
/// the stored state still matches the expected predecessor, and reports
/// whether it applied. Implementations must make each call atomic.
#[async_trait]
pub trait CommunicationStore: Send + Sync + 'static {
    // --- Communication records ---

    /// Persist a new outbound record in `pending`. A `scheduled_for` time
    /// stores it as `scheduled`; otherwise it is `immediate`.
    async fn insert_communication(
        &self,
        draft: &CommunicationDraft,
        scheduled_for: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<i64, CourierError>;

    async fn get_communication(&self, id: i64)
    -> Result<Option<CommunicationRecord>, CourierError>;

    /// Find the record correlated with a provider message id.
    ///
    /// When several providers share the id, the record sent through
    /// `provider_hint` wins.
    async fn find_by_external_id(
        &self,
        external_id: &str,
        provider_hint: Option<&str>,
    ) -> Result<Option<CommunicationRecord>, CourierError>;

    /// `pending -> sent`, storing provider, external id, and sender, and
    /// appending the `sent` event in the same transaction.
    async fn mark_sent(
        &self,
        id: i64,
        provider: &str,
        external_id: &str,
        from_address: &str,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<bool, CourierError>;

    /// `pending|sent -> failed` with the error message and `failed_at`.
    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, CourierError>;

    /// Append an event and, when it implies a forward terminal transition,
    /// move the record's status and stamp the matching timestamp.
    async fn apply_event(
        &self,
        id: i64,
        event: CanonicalEvent,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<AppliedEvent, CourierError>;

    /// Delivery history ordered by occurrence.
    async fn list_events(&self, id: i64) -> Result<Vec<CommunicationEvent>, CourierError>;

    // --- Scheduling ---

    /// Ids of `scheduled` records whose time has come, oldest first.
    async fn due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<i64>, CourierError>;

    /// `scheduled -> immediate`; false when another runner claimed it first
    /// or it was cancelled.
    async fn claim_scheduled(&self, id: i64, now: DateTime<Utc>) -> Result<bool, CourierError>;

    /// `scheduled -> cancelled`.
    async fn cancel_scheduled(&self, id: i64, now: DateTime<Utc>) -> Result<bool, CourierError>;

    // --- Preferences ---

    async fn find_preference(
        &self,
        recipient: SubjectEntity,
        channel: Channel,
        category: Option<&str>,
    ) -> Result<Option<PreferenceRecord>, CourierError>;

    /// Create or update the preference and append one audit entry.
    async fn apply_preference_change(
        &self,
        change: &PreferenceChange,
    ) -> Result<PreferenceRecord, CourierError>;

    async fn find_preference_by_token(
        &self,
        token: &str,
    ) -> Result<Option<PreferenceRecord>, CourierError>;

    async fn list_preference_audit(
        &self,
        preference_id: i64,
    ) -> Result<Vec<ComplianceAuditEntry>, CourierError>;

    // --- Job queue ---

    /// Queue a send attempt for a communication, runnable at `available_at`.
    async fn enqueue_job(
        &self,
        communication_id: i64,
        attempts: u32,
        max_attempts: u32,
        available_at: DateTime<Utc>,
    ) -> Result<i64, CourierError>;

    /// Claim the oldest runnable job, locking it against other workers.
    async fn dequeue_job(&self, now: DateTime<Utc>) -> Result<Option<Job>, CourierError>;

    async fn ack_job(&self, id: i64, now: DateTime<Utc>) -> Result<(), CourierError>;

    /// Return a job that hit an infrastructure error to the queue, or fail
    /// it permanently once its attempt budget is spent.
    async fn fail_job(&self, id: i64, error: &str, now: DateTime<Utc>) -> Result<(), CourierError>;

    /// Delete completed and failed jobs last updated before `before`.
    async fn purge_jobs(&self, before: DateTime<Utc>) -> Result<usize, CourierError>;
}
