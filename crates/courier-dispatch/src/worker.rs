// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background loop: due scheduled sends and queued retry attempts.

use std::sync::Arc;
use std::time::Duration;

use courier_core::{Clock, CommunicationStore, CourierError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::retry::RetryCoordinator;
use crate::scheduler::{ProcessReport, Scheduler};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub scheduled: ProcessReport,
    pub jobs_run: usize,
    /// Jobs that hit an infrastructure error and went back to the queue.
    pub jobs_failed: usize,
    /// Finished jobs removed by the retention sweep.
    pub jobs_purged: usize,
}

pub struct Worker {
    scheduler: Arc<Scheduler>,
    retry: Arc<RetryCoordinator>,
    store: Arc<dyn CommunicationStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    max_jobs: usize,
    job_retention: Duration,
}

impl Worker {
    pub fn new(
        scheduler: Arc<Scheduler>,
        retry: Arc<RetryCoordinator>,
        store: Arc<dyn CommunicationStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            retry,
            store,
            clock,
            interval,
            max_jobs: 100,
            job_retention: Duration::from_secs(7 * 24 * 3600),
        }
    }

    /// Cap on queued jobs drained per tick.
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs.max(1);
        self
    }

    /// How long completed and failed jobs are kept before they are deleted.
    pub fn with_job_retention(mut self, retention: Duration) -> Self {
        self.job_retention = retention;
        self
    }

    /// Tick until `cancel` fires. A failed tick is logged and the loop goes on.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "dispatch worker started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if report != TickReport::default() => {
                            debug!(?report, "worker tick");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "worker tick failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("dispatch worker shutting down");
                    break;
                }
            }
        }
    }

    /// One pass: process due scheduled sends, drain runnable jobs, then
    /// drop finished jobs older than the retention window.
    pub async fn tick(&self) -> Result<TickReport, CourierError> {
        let scheduled = self.scheduler.process_due().await?;
        let (jobs_run, jobs_failed) = self.drain_jobs().await?;
        let jobs_purged = self.purge_finished_jobs().await?;
        Ok(TickReport {
            scheduled,
            jobs_run,
            jobs_failed,
            jobs_purged,
        })
    }

    async fn purge_finished_jobs(&self) -> Result<usize, CourierError> {
        // A retention too large to represent keeps everything.
        let Some(cutoff) = chrono::Duration::from_std(self.job_retention)
            .ok()
            .and_then(|retention| self.clock.now().checked_sub_signed(retention))
        else {
            return Ok(0);
        };
        let purged = self.store.purge_jobs(cutoff).await?;
        if purged > 0 {
            debug!(purged, "finished jobs purged");
        }
        Ok(purged)
    }

    async fn drain_jobs(&self) -> Result<(usize, usize), CourierError> {
        let mut run = 0;
        let mut failed = 0;
        while run < self.max_jobs {
            let Some(job) = self.store.dequeue_job(self.clock.now()).await? else {
                break;
            };
            run += 1;
            match self.retry.run_job(&job).await {
                Ok(outcome) => {
                    debug!(job_id = job.id, communication_id = job.communication_id, ?outcome, "job done");
                    self.store.ack_job(job.id, self.clock.now()).await?;
                }
                Err(e) => {
                    error!(job_id = job.id, communication_id = job.communication_id, error = %e, "job failed");
                    failed += 1;
                    self.store
                        .fail_job(job.id, &e.to_string(), self.clock.now())
                        .await?;
                }
            }
        }
        Ok((run, failed))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use courier_core::DeliveryStatus;

    use super::*;
    use crate::testing::{email, fixture};

    #[tokio::test]
    async fn tick_drains_retries_until_success() {
        let fx = fixture().await;
        fx.smtp.push(Err(CourierError::send("421 busy")));
        let result = fx.courier.send(email("a@x.com")).await.unwrap();
        let id = result.id.unwrap();
        assert_eq!(result.status, DeliveryStatus::Pending);
        let worker = fx.courier.worker(Duration::from_secs(1));

        let report = worker.tick().await.unwrap();
        assert_eq!(report.jobs_run, 1);
        let record = fx.store.get_communication(id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Pending);

        // backoff not yet elapsed
        let report = worker.tick().await.unwrap();
        assert_eq!(report.jobs_run, 0);

        fx.clock.advance(ChronoDuration::seconds(30));
        let report = worker.tick().await.unwrap();
        assert_eq!(report.jobs_run, 1);
        let record = fx.store.get_communication(id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Sent);
        assert_eq!(fx.smtp.sends(), 2);
    }

    #[tokio::test]
    async fn tick_sends_due_scheduled_records() {
        let fx = fixture().await;
        let at = fx.clock.now() + ChronoDuration::minutes(2);
        fx.courier.schedule(&email("a@x.com"), at).await.unwrap();
        let worker = fx.courier.worker(Duration::from_secs(1));

        assert_eq!(worker.tick().await.unwrap(), TickReport::default());
        fx.clock.advance(ChronoDuration::minutes(2));
        let report = worker.tick().await.unwrap();
        assert_eq!(report.scheduled.sent, 1);
    }

    #[tokio::test]
    async fn jobs_per_tick_are_bounded() {
        let fx = fixture().await;
        for n in 0..3 {
            fx.courier.send(email(&format!("a{n}@x.com"))).await.unwrap();
        }
        let worker = fx.courier.worker(Duration::from_secs(1)).with_max_jobs(2);
        assert_eq!(worker.tick().await.unwrap().jobs_run, 2);
        assert_eq!(worker.tick().await.unwrap().jobs_run, 1);
        assert_eq!(fx.smtp.sends(), 3);
    }

    #[tokio::test]
    async fn finished_jobs_are_purged_after_retention() {
        let fx = fixture().await;
        fx.courier.send(email("a@x.com")).await.unwrap();
        let worker = fx
            .courier
            .worker(Duration::from_secs(1))
            .with_job_retention(Duration::from_secs(3600));

        let report = worker.tick().await.unwrap();
        assert_eq!(report.jobs_run, 1);
        assert_eq!(report.jobs_purged, 0);

        fx.clock.advance(ChronoDuration::minutes(61));
        assert_eq!(worker.tick().await.unwrap().jobs_purged, 1);
        assert_eq!(worker.tick().await.unwrap().jobs_purged, 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let fx = fixture().await;
        let worker = fx.courier.worker(Duration::from_millis(10));
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), worker.run(cancel))
            .await
            .unwrap();
    }
}
