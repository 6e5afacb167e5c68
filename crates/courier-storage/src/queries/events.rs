// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery history: append-only events and the status moves they imply.

use chrono::{DateTime, Utc};
use courier_core::time::format_ts;
use courier_core::types::{AppliedEvent, CanonicalEvent, CommunicationEvent, DeliveryStatus};
use courier_core::CourierError;
use rusqlite::params;

use super::communications::current_status;
use super::{enum_col, json_col, to_json, ts_col};
use crate::database::{Database, map_tr_err};

fn timestamp_column(status: DeliveryStatus) -> Option<&'static str> {
    match status {
        DeliveryStatus::Delivered => Some("delivered_at"),
        DeliveryStatus::Failed | DeliveryStatus::Bounced => Some("failed_at"),
        DeliveryStatus::Pending | DeliveryStatus::Sent => None,
    }
}

enum Outcome {
    Missing,
    Applied(AppliedEvent),
}

/// Append `event` and, if it implies a forward terminal transition, move the
/// record's status. The status update is guarded by the expected predecessor
/// so a concurrent transition wins cleanly.
pub async fn apply(
    db: &Database,
    id: i64,
    event: CanonicalEvent,
    details: serde_json::Value,
    at: DateTime<Utc>,
) -> Result<AppliedEvent, CourierError> {
    let at = format_ts(at);
    let outcome = db
        .connection()
        .call(move |conn| -> Result<Outcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some(previous) = current_status(&tx, id)? else {
                return Ok(Outcome::Missing);
            };

            tx.execute(
                "INSERT INTO communication_events (communication_id, event_type, occurred_at, details)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, event.to_string(), at, to_json(&details)?],
            )?;
            let event_id = tx.last_insert_rowid();

            let mut status = previous;
            if let Some(next) = event.terminal_status()
                && previous.can_transition_to(next)
            {
                let stamp = timestamp_column(next).unwrap_or("updated_at");
                let changed = tx.execute(
                    &format!(
                        "UPDATE communications SET status = ?2, {stamp} = ?3, updated_at = ?3
                         WHERE id = ?1 AND status = ?4"
                    ),
                    params![id, next.to_string(), at, previous.to_string()],
                )?;
                if changed == 1 {
                    status = next;
                }
            }

            tx.commit()?;
            Ok(Outcome::Applied(AppliedEvent {
                event_id,
                previous_status: previous,
                status,
            }))
        })
        .await
        .map_err(map_tr_err)?;

    match outcome {
        Outcome::Applied(applied) => Ok(applied),
        Outcome::Missing => Err(CourierError::communication_not_found(id)),
    }
}

/// History of one communication, oldest first.
pub async fn list(db: &Database, id: i64) -> Result<Vec<CommunicationEvent>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<CommunicationEvent>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, communication_id, event_type, occurred_at, details
                 FROM communication_events
                 WHERE communication_id = ?1
                 ORDER BY occurred_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok(CommunicationEvent {
                    id: row.get(0)?,
                    communication_id: row.get(1)?,
                    event_type: enum_col(row, 2)?,
                    occurred_at: ts_col(row, 3)?,
                    details: json_col(row, 4)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
