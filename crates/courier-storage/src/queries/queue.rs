// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crash-safe job queue for delayed send attempts.

use chrono::{DateTime, Duration, Utc};
use courier_core::CourierError;
use courier_core::time::format_ts;
use courier_core::types::{Job, JobStatus};
use rusqlite::{OptionalExtension, params};

use super::{enum_col, opt_ts_col, ts_col};
use crate::database::{Database, map_tr_err};

/// How long a dequeued job stays locked before another worker may reclaim it.
fn lock_duration() -> Duration {
    Duration::minutes(5)
}

/// Enqueue a send attempt. Returns the job id.
pub async fn enqueue(
    db: &Database,
    communication_id: i64,
    attempts: u32,
    max_attempts: u32,
    available_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<i64, CourierError> {
    let available_at = format_ts(available_at);
    let now = format_ts(now);
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO jobs (communication_id, attempts, max_attempts, status,
                                   available_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?5)",
                params![communication_id, attempts, max_attempts, available_at, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Claim the oldest runnable job.
///
/// A job is runnable when it is pending and due, or when a previous worker's
/// lock has expired. The claim marks it `processing` with a fresh lock.
pub async fn dequeue(db: &Database, now: DateTime<Utc>) -> Result<Option<Job>, CourierError> {
    let locked_until = format_ts(now + lock_duration());
    let now = format_ts(now);
    db.connection()
        .call(move |conn| -> Result<Option<Job>, rusqlite::Error> {
            let tx = conn.transaction()?;

            let job = tx
                .query_row(
                    "SELECT id, communication_id, attempts, max_attempts, status,
                            available_at, locked_until, last_error
                     FROM jobs
                     WHERE (status = 'pending' AND available_at <= ?1)
                        OR (status = 'processing' AND locked_until <= ?1)
                     ORDER BY available_at ASC, id ASC
                     LIMIT 1",
                    params![now],
                    |row| {
                        Ok(Job {
                            id: row.get(0)?,
                            communication_id: row.get(1)?,
                            attempts: row.get(2)?,
                            max_attempts: row.get(3)?,
                            status: enum_col(row, 4)?,
                            available_at: ts_col(row, 5)?,
                            locked_until: opt_ts_col(row, 6)?,
                            last_error: row.get(7)?,
                        })
                    },
                )
                .optional()?;

            let Some(job) = job else {
                tx.commit()?;
                return Ok(None);
            };

            tx.execute(
                "UPDATE jobs SET status = 'processing', locked_until = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![job.id, locked_until, now],
            )?;
            tx.commit()?;

            Ok(Some(Job {
                status: JobStatus::Processing,
                locked_until: courier_core::time::parse_ts(&locked_until),
                ..job
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a job completed.
pub async fn ack(db: &Database, id: i64, now: DateTime<Utc>) -> Result<(), CourierError> {
    let now = format_ts(now);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET status = 'completed', locked_until = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed run of a job.
///
/// Increments attempts. If attempts >= max_attempts, sets status to `failed`.
/// Otherwise resets to `pending`, runnable immediately, and clears the lock.
pub async fn fail(
    db: &Database,
    id: i64,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), CourierError> {
    let error = error.to_string();
    let now = format_ts(now);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let (attempts, max_attempts): (u32, u32) = conn.query_row(
                "SELECT attempts, max_attempts FROM jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            let status = if new_attempts >= max_attempts {
                JobStatus::Failed
            } else {
                JobStatus::Pending
            };
            conn.execute(
                "UPDATE jobs SET status = ?2, attempts = ?3, last_error = ?4,
                     locked_until = NULL, available_at = ?5, updated_at = ?5
                 WHERE id = ?1",
                params![id, status.to_string(), new_attempts, error, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete completed and failed jobs last touched before `before`.
/// Returns the number of rows removed.
pub async fn purge(db: &Database, before: DateTime<Utc>) -> Result<usize, CourierError> {
    let before = format_ts(before);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM jobs
                 WHERE status IN ('completed', 'failed') AND updated_at < ?1",
                params![before],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Count jobs in a status; used by health reporting and tests.
pub async fn count(db: &Database, status: JobStatus) -> Result<i64, CourierError> {
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM jobs WHERE status = ?1",
                params![status.to_string()],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}
