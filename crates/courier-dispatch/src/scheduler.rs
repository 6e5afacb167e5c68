// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deferred sends.
//!
//! A scheduled record sits in `scheduled_status = scheduled` until a
//! `process_due` run claims it. The claim is a compare-and-set to
//! `immediate`, so concurrent runners never send the same record twice, and
//! a cancelled record can no longer be claimed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_core::{
    Clock, CommunicationDraft, CommunicationStore, CourierError, ScheduledStatus,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::dispatcher::DispatchOutcome;
use crate::retry::{AttemptOutcome, RetryCoordinator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledCommunication {
    pub id: i64,
    pub scheduled_status: ScheduledStatus,
    pub scheduled_for: DateTime<Utc>,
}

/// Tally of one `process_due` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub due: usize,
    pub claimed: usize,
    pub sent: usize,
    pub blocked: usize,
    pub retry_scheduled: usize,
    pub failed: usize,
    /// Claimed by another runner or cancelled in between.
    pub skipped: usize,
    /// Handed to the job queue after an infrastructure error.
    pub deferred: usize,
}

pub struct Scheduler {
    store: Arc<dyn CommunicationStore>,
    retry: Arc<RetryCoordinator>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn CommunicationStore>,
        retry: Arc<RetryCoordinator>,
        clock: Arc<dyn Clock>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            retry,
            clock,
            batch_size: batch_size.max(1),
        }
    }

    /// Store a draft for sending at `at`. Nothing is sent now.
    pub async fn schedule(
        &self,
        draft: &CommunicationDraft,
        at: DateTime<Utc>,
    ) -> Result<ScheduledCommunication, CourierError> {
        draft.validate()?;
        let id = self
            .store
            .insert_communication(draft, Some(at), self.clock.now())
            .await?;
        info!(communication_id = id, scheduled_for = %at, "communication scheduled");
        Ok(ScheduledCommunication {
            id,
            scheduled_status: ScheduledStatus::Scheduled,
            scheduled_for: at,
        })
    }

    /// Stop a scheduled send. Returns false when it is no longer scheduled
    /// (already claimed or cancelled); an attempt in flight is not aborted.
    pub async fn cancel(&self, id: i64) -> Result<bool, CourierError> {
        if self.store.cancel_scheduled(id, self.clock.now()).await? {
            info!(communication_id = id, "scheduled send cancelled");
            return Ok(true);
        }
        match self.store.get_communication(id).await? {
            Some(record) => {
                debug!(communication_id = id, status = %record.scheduled_status, "nothing to cancel");
                Ok(false)
            }
            None => Err(CourierError::communication_not_found(id)),
        }
    }

    /// Claim and send every scheduled record that has come due.
    pub async fn process_due(&self) -> Result<ProcessReport, CourierError> {
        let now = self.clock.now();
        let due = self.store.due_scheduled(now, self.batch_size).await?;
        let mut report = ProcessReport {
            due: due.len(),
            ..ProcessReport::default()
        };

        for id in due {
            if !self.store.claim_scheduled(id, self.clock.now()).await? {
                debug!(communication_id = id, "already claimed or cancelled");
                report.skipped += 1;
                continue;
            }
            report.claimed += 1;

            match self.retry.execute(id, 1).await {
                Ok(AttemptOutcome::Dispatched(DispatchOutcome::ComplianceBlocked { .. })) => {
                    report.blocked += 1;
                }
                Ok(AttemptOutcome::Dispatched(_)) => report.sent += 1,
                Ok(AttemptOutcome::RetryScheduled { .. }) => report.retry_scheduled += 1,
                Ok(AttemptOutcome::Failed { .. }) | Ok(AttemptOutcome::Missing) => {
                    report.failed += 1;
                }
                Err(e) => {
                    // The claim already happened; the queue picks the send up.
                    warn!(communication_id = id, error = %e, "scheduled send hit an error, queueing");
                    match self.retry.submit(id).await {
                        Ok(_) => report.deferred += 1,
                        Err(e) => {
                            error!(communication_id = id, error = %e, "could not queue scheduled send");
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                sent = report.sent,
                retry_scheduled = report.retry_scheduled,
                failed = report.failed,
                "processed due communications"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use courier_core::DeliveryStatus;

    use super::*;
    use crate::testing::{email, fixture};

    #[tokio::test]
    async fn nothing_is_sent_before_due_time() {
        let fx = fixture().await;
        let at = fx.clock.now() + Duration::hours(1);
        let scheduled = fx.courier.scheduler().schedule(&email("a@x.com"), at).await.unwrap();
        assert_eq!(scheduled.scheduled_status, ScheduledStatus::Scheduled);

        let report = fx.courier.scheduler().process_due().await.unwrap();
        assert_eq!(report, ProcessReport::default());
        assert_eq!(fx.smtp.sends(), 0);

        fx.clock.advance(Duration::minutes(61));
        let report = fx.courier.scheduler().process_due().await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(fx.smtp.sends(), 1);

        let record = fx.store.get_communication(scheduled.id).await.unwrap().unwrap();
        assert_eq!(record.scheduled_status, ScheduledStatus::Immediate);
        assert_eq!(record.status, DeliveryStatus::Sent);

        let report = fx.courier.scheduler().process_due().await.unwrap();
        assert_eq!(report.due, 0);
        assert_eq!(fx.smtp.sends(), 1);
    }

    #[tokio::test]
    async fn cancelled_records_are_skipped() {
        let fx = fixture().await;
        let at = fx.clock.now() + Duration::minutes(5);
        let scheduled = fx.courier.scheduler().schedule(&email("a@x.com"), at).await.unwrap();
        assert!(fx.courier.scheduler().cancel(scheduled.id).await.unwrap());
        assert!(!fx.courier.scheduler().cancel(scheduled.id).await.unwrap());

        fx.clock.advance(Duration::minutes(10));
        let report = fx.courier.scheduler().process_due().await.unwrap();
        assert_eq!(report.due, 0);
        assert_eq!(fx.smtp.sends(), 0);
        let record = fx.store.get_communication(scheduled.id).await.unwrap().unwrap();
        assert_eq!(record.scheduled_status, ScheduledStatus::Cancelled);
        assert_eq!(record.status, DeliveryStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_unknown_record_is_not_found() {
        let fx = fixture().await;
        let err = fx.courier.scheduler().cancel(31337).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn invalid_drafts_are_rejected_up_front() {
        let fx = fixture().await;
        let mut draft = email("a@x.com");
        draft.subject = None;
        let err = fx
            .courier
            .scheduler()
            .schedule(&draft, fx.clock.now())
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));
    }

    #[tokio::test]
    async fn transient_failure_on_due_send_is_retried_via_queue() {
        let fx = fixture().await;
        fx.smtp.push(Err(CourierError::send("connection reset")));
        let at = fx.clock.now();
        fx.courier.scheduler().schedule(&email("a@x.com"), at).await.unwrap();

        let report = fx.courier.scheduler().process_due().await.unwrap();
        assert_eq!(report.retry_scheduled, 1);
        assert_eq!(report.sent, 0);
    }
}
