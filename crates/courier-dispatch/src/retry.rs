// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential-backoff retry around the dispatcher.
//!
//! Backoff is a new row in the job queue with a later `available_at`; no
//! task ever sleeps waiting for a retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_config::model::RetryConfig;
use courier_core::types::Job;
use courier_core::{Clock, CommunicationStore, CourierError};
use tracing::{info, warn};

use crate::dispatcher::{DispatchOutcome, Dispatcher, is_permanent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }

    /// Wait before the attempt following `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// What one attempt under the coordinator led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Dispatched(DispatchOutcome),
    RetryScheduled {
        attempt: u32,
        retry_at: DateTime<Utc>,
        error: String,
    },
    /// The record is `failed`: a permanent error, or retries ran out.
    Failed { attempt: u32, error: String },
    /// The record no longer exists.
    Missing,
}

pub struct RetryCoordinator {
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn CommunicationStore>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RetryCoordinator {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        store: Arc<dyn CommunicationStore>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Queue the first attempt for a background worker.
    pub async fn submit(&self, communication_id: i64) -> Result<i64, CourierError> {
        let now = self.clock.now();
        self.store
            .enqueue_job(communication_id, 0, self.policy.max_attempts, now)
            .await
    }

    /// Run the attempt a queued job stands for.
    pub async fn run_job(&self, job: &Job) -> Result<AttemptOutcome, CourierError> {
        self.execute(job.communication_id, job.attempts + 1).await
    }

    /// Make attempt number `attempt` (1-based) for a communication.
    ///
    /// Errors returned from here are infrastructure failures (storage); send
    /// failures are folded into the outcome.
    pub async fn execute(
        &self,
        communication_id: i64,
        attempt: u32,
    ) -> Result<AttemptOutcome, CourierError> {
        let err = match self.dispatcher.dispatch(communication_id).await {
            Ok(outcome) => return Ok(AttemptOutcome::Dispatched(outcome)),
            Err(e) => e,
        };

        if err.is_not_found() {
            warn!(communication_id, "communication no longer exists, dropping send");
            return Ok(AttemptOutcome::Missing);
        }
        if is_permanent(&err) {
            return Ok(AttemptOutcome::Failed {
                attempt,
                error: err.to_string(),
            });
        }
        if !err.is_transient() {
            return Err(err);
        }

        let error = err.to_string();
        let now = self.clock.now();
        if attempt >= self.policy.max_attempts {
            self.store.mark_failed(communication_id, &error, now).await?;
            warn!(communication_id, attempt, %error, "retries exhausted, communication failed");
            return Ok(AttemptOutcome::Failed { attempt, error });
        }

        let delay = self.policy.delay_after(attempt);
        let retry_at = now
            + chrono::Duration::from_std(delay)
                .map_err(|e| CourierError::Internal(format!("retry delay out of range: {e}")))?;
        self.store
            .enqueue_job(communication_id, attempt, self.policy.max_attempts, retry_at)
            .await?;
        info!(
            communication_id,
            attempt,
            retry_in_secs = delay.as_secs(),
            "send attempt failed, retry scheduled"
        );
        Ok(AttemptOutcome::RetryScheduled {
            attempt,
            retry_at,
            error,
        })
    }
}
