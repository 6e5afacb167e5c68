// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Communication record persistence and compare-and-set status updates.

use chrono::{DateTime, Utc};
use courier_core::time::format_ts;
use courier_core::types::{
    CanonicalEvent, CommunicationDraft, CommunicationRecord, DeliveryStatus, ScheduledStatus,
    SubjectEntity,
};
use courier_core::{ChannelSettings, CourierError};
use rusqlite::{OptionalExtension, Row, params};

use super::{enum_col, json_col, opt_ts_col, to_json, ts_col};
use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, subject_type, subject_id, direction, channel, provider, status,
    category, subject, body, from_address, to_address, cc, bcc, reply_to, external_id,
    error_message, scheduled_for, scheduled_status, sent_at, delivered_at, failed_at,
    metadata, settings_override, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<CommunicationRecord> {
    let settings_override: Option<String> = row.get(23)?;
    let settings_override = settings_override
        .map(|raw| serde_json::from_str::<ChannelSettings>(&raw))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(23, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(CommunicationRecord {
        id: row.get(0)?,
        subject_entity: SubjectEntity::new(enum_col(row, 1)?, row.get(2)?),
        direction: enum_col(row, 3)?,
        channel: enum_col(row, 4)?,
        provider: row.get(5)?,
        status: enum_col(row, 6)?,
        category: row.get(7)?,
        subject: row.get(8)?,
        body: row.get(9)?,
        from_address: row.get(10)?,
        to_address: row.get(11)?,
        cc: json_col(row, 12)?,
        bcc: json_col(row, 13)?,
        reply_to: row.get(14)?,
        external_id: row.get(15)?,
        error_message: row.get(16)?,
        scheduled_for: opt_ts_col(row, 17)?,
        scheduled_status: enum_col(row, 18)?,
        sent_at: opt_ts_col(row, 19)?,
        delivered_at: opt_ts_col(row, 20)?,
        failed_at: opt_ts_col(row, 21)?,
        metadata: json_col(row, 22)?,
        settings_override,
        created_at: ts_col(row, 24)?,
        updated_at: ts_col(row, 25)?,
    })
}

/// Insert a new outbound record in `pending`. Returns its id.
pub async fn insert(
    db: &Database,
    draft: &CommunicationDraft,
    scheduled_for: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<i64, CourierError> {
    let draft = draft.clone();
    let scheduled_status = if scheduled_for.is_some() {
        ScheduledStatus::Scheduled
    } else {
        ScheduledStatus::Immediate
    };
    let now = format_ts(now);
    let scheduled_for = scheduled_for.map(format_ts);

    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            let settings_override = draft.settings_override.as_ref().map(to_json).transpose()?;
            conn.execute(
                "INSERT INTO communications (
                    direction, channel, subject_type, subject_id, status, category,
                    subject, body, from_address, to_address, cc, bcc, reply_to,
                    scheduled_for, scheduled_status, metadata, settings_override,
                    created_at, updated_at
                 ) VALUES ('outbound', ?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                           ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
                params![
                    draft.channel.to_string(),
                    draft.subject_entity.kind.to_string(),
                    draft.subject_entity.id,
                    draft.category,
                    draft.subject,
                    draft.body,
                    draft.from,
                    draft.to,
                    to_json(&draft.cc)?,
                    to_json(&draft.bcc)?,
                    draft.reply_to,
                    scheduled_for,
                    scheduled_status.to_string(),
                    to_json(&draft.metadata)?,
                    settings_override,
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: i64) -> Result<Option<CommunicationRecord>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<CommunicationRecord>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM communications WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Look up by provider message id, preferring rows sent via `provider_hint`
/// and then the most recent.
pub async fn find_by_external_id(
    db: &Database,
    external_id: &str,
    provider_hint: Option<&str>,
) -> Result<Option<CommunicationRecord>, CourierError> {
    let external_id = external_id.to_string();
    let provider_hint = provider_hint.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<Option<CommunicationRecord>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM communications
                     WHERE external_id = ?1
                     ORDER BY IFNULL(provider = ?2, 0) DESC, id DESC
                     LIMIT 1"
                ),
                params![external_id, provider_hint],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// `pending -> sent` plus the synthetic `sent` event, atomically.
pub async fn mark_sent(
    db: &Database,
    id: i64,
    provider: &str,
    external_id: &str,
    from_address: &str,
    details: serde_json::Value,
    at: DateTime<Utc>,
) -> Result<bool, CourierError> {
    let provider = provider.to_string();
    let external_id = external_id.to_string();
    let from_address = from_address.to_string();
    let at = format_ts(at);

    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE communications
                 SET status = 'sent', provider = ?2, external_id = ?3, from_address = ?4,
                     sent_at = ?5, error_message = NULL, updated_at = ?5
                 WHERE id = ?1 AND status = 'pending'",
                params![id, provider, external_id, from_address, at],
            )?;
            if changed == 1 {
                tx.execute(
                    "INSERT INTO communication_events (communication_id, event_type, occurred_at, details)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, CanonicalEvent::Sent.to_string(), at, to_json(&details)?],
                )?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `pending|sent -> failed` with the error message.
pub async fn mark_failed(
    db: &Database,
    id: i64,
    error: &str,
    at: DateTime<Utc>,
) -> Result<bool, CourierError> {
    let error = error.to_string();
    let at = format_ts(at);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE communications
                 SET status = 'failed', error_message = ?2, failed_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND status IN ('pending', 'sent')",
                params![id, error, at],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Current status, or `None` if the record does not exist.
pub(crate) fn current_status(
    conn: &rusqlite::Connection,
    id: i64,
) -> rusqlite::Result<Option<DeliveryStatus>> {
    conn.query_row(
        "SELECT status FROM communications WHERE id = ?1",
        params![id],
        |row| enum_col(row, 0),
    )
    .optional()
}

/// Ids of scheduled records due at or before `now`, earliest first.
pub async fn due_scheduled(
    db: &Database,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<i64>, CourierError> {
    let now = format_ts(now);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<i64>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id FROM communications
                 WHERE scheduled_status = 'scheduled' AND scheduled_for <= ?1
                 ORDER BY scheduled_for ASC, id ASC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![now, limit], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

async fn swap_scheduled_status(
    db: &Database,
    id: i64,
    to: ScheduledStatus,
    now: DateTime<Utc>,
) -> Result<bool, CourierError> {
    let now = format_ts(now);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE communications SET scheduled_status = ?2, updated_at = ?3
                 WHERE id = ?1 AND scheduled_status = 'scheduled'",
                params![id, to.to_string(), now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `scheduled -> immediate`. Only one caller can win.
pub async fn claim_scheduled(db: &Database, id: i64, now: DateTime<Utc>) -> Result<bool, CourierError> {
    swap_scheduled_status(db, id, ScheduledStatus::Immediate, now).await
}

/// `scheduled -> cancelled`.
pub async fn cancel_scheduled(db: &Database, id: i64, now: DateTime<Utc>) -> Result<bool, CourierError> {
    swap_scheduled_status(db, id, ScheduledStatus::Cancelled, now).await
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use courier_core::types::{Channel, EntityKind};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn email() -> CommunicationDraft {
        CommunicationDraft::new(
            Channel::Email,
            SubjectEntity::new(EntityKind::Contact, 42),
            "a@x.com",
            "text",
        )
        .with_from("b@y.com")
        .with_subject("Hi")
    }

    #[tokio::test]
    async fn insert_and_get_round_trip_fields() {
        let db = Database::open_in_memory().await.unwrap();
        let mut draft = email().with_category("newsletter");
        draft.cc = vec!["c@x.com".into()];
        draft.metadata.insert("campaign".into(), serde_json::json!("spring"));
        draft.settings_override = Some(ChannelSettings {
            smtp_host: Some("relay.local".into()),
            ..ChannelSettings::default()
        });

        let id = insert(&db, &draft, None, t0()).await.unwrap();
        let record = get(&db, id).await.unwrap().unwrap();

        assert_eq!(record.status, DeliveryStatus::Pending);
        assert_eq!(record.scheduled_status, ScheduledStatus::Immediate);
        assert_eq!(record.subject_entity, SubjectEntity::new(EntityKind::Contact, 42));
        assert_eq!(record.cc, vec!["c@x.com".to_string()]);
        assert_eq!(record.category.as_deref(), Some("newsletter"));
        assert_eq!(record.metadata["campaign"], "spring");
        assert_eq!(
            record.settings_override.unwrap().smtp_host.as_deref(),
            Some("relay.local")
        );
        assert_eq!(record.created_at, t0());
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(get(&db, 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_sent_applies_once() {
        let db = Database::open_in_memory().await.unwrap();
        let id = insert(&db, &email(), None, t0()).await.unwrap();

        assert!(mark_sent(&db, id, "smtp", "MID-1", "b@y.com", serde_json::json!({}), t0())
            .await
            .unwrap());
        assert!(!mark_sent(&db, id, "smtp", "MID-2", "b@y.com", serde_json::json!({}), t0())
            .await
            .unwrap());

        let record = get(&db, id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Sent);
        assert_eq!(record.external_id.as_deref(), Some("MID-1"));
        assert_eq!(record.sent_at, Some(t0()));
    }

    #[tokio::test]
    async fn mark_failed_does_not_leave_terminal_states() {
        let db = Database::open_in_memory().await.unwrap();
        let id = insert(&db, &email(), None, t0()).await.unwrap();

        assert!(mark_failed(&db, id, "smtp down", t0()).await.unwrap());
        assert!(!mark_failed(&db, id, "again", t0()).await.unwrap());
        let record = get(&db, id).await.unwrap().unwrap();
        assert_eq!(record.error_message.as_deref(), Some("smtp down"));
        assert_eq!(record.failed_at, Some(t0()));
    }

    #[tokio::test]
    async fn external_id_lookup_prefers_hinted_provider() {
        let db = Database::open_in_memory().await.unwrap();
        let a = insert(&db, &email(), None, t0()).await.unwrap();
        let b = insert(&db, &email(), None, t0()).await.unwrap();
        mark_sent(&db, a, "smtp", "SHARED", "b@y.com", serde_json::json!({}), t0())
            .await
            .unwrap();
        mark_sent(&db, b, "ses", "SHARED", "b@y.com", serde_json::json!({}), t0())
            .await
            .unwrap();

        let hinted = find_by_external_id(&db, "SHARED", Some("smtp")).await.unwrap();
        assert_eq!(hinted.unwrap().id, a);
        let unhinted = find_by_external_id(&db, "SHARED", None).await.unwrap();
        assert_eq!(unhinted.unwrap().id, b);
        assert!(find_by_external_id(&db, "nope", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn due_scheduled_selects_only_due_rows_in_order() {
        let db = Database::open_in_memory().await.unwrap();
        let later = insert(&db, &email(), Some(t0() + Duration::hours(2)), t0())
            .await
            .unwrap();
        let soon = insert(&db, &email(), Some(t0() + Duration::minutes(5)), t0())
            .await
            .unwrap();
        let sooner = insert(&db, &email(), Some(t0() + Duration::minutes(1)), t0())
            .await
            .unwrap();
        insert(&db, &email(), None, t0()).await.unwrap();

        let due = due_scheduled(&db, t0() + Duration::minutes(10), 10).await.unwrap();
        assert_eq!(due, vec![sooner, soon]);
        let due = due_scheduled(&db, t0() + Duration::hours(3), 1).await.unwrap();
        assert_eq!(due, vec![sooner]);
        assert!(!due.contains(&later));
    }

    #[tokio::test]
    async fn claim_and_cancel_are_exclusive() {
        let db = Database::open_in_memory().await.unwrap();
        let id = insert(&db, &email(), Some(t0()), t0()).await.unwrap();

        assert!(claim_scheduled(&db, id, t0()).await.unwrap());
        assert!(!claim_scheduled(&db, id, t0()).await.unwrap());
        assert!(!cancel_scheduled(&db, id, t0()).await.unwrap());

        let other = insert(&db, &email(), Some(t0()), t0()).await.unwrap();
        assert!(cancel_scheduled(&db, other, t0()).await.unwrap());
        assert!(!claim_scheduled(&db, other, t0()).await.unwrap());
        let record = get(&db, other).await.unwrap().unwrap();
        assert_eq!(record.scheduled_status, ScheduledStatus::Cancelled);
        assert!(due_scheduled(&db, t0(), 10).await.unwrap().is_empty());
    }
}
