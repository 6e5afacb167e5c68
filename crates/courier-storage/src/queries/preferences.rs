// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opt-in/opt-out records and their compliance audit trail.

use courier_core::CourierError;
use courier_core::time::format_ts;
use courier_core::types::{
    Channel, ComplianceAuditEntry, PreferenceAction, PreferenceChange, PreferenceRecord,
    SubjectEntity,
};
use rusqlite::{OptionalExtension, Row, params};

use super::{enum_col, opt_ts_col, ts_col};
use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, recipient_type, recipient_id, channel, category, opted_in,
    opted_in_at, opted_out_at, opt_out_reason, unsubscribe_token, created_at, updated_at";

const SCOPE: &str = "recipient_type = ?1 AND recipient_id = ?2 AND channel = ?3
    AND IFNULL(category, '') = IFNULL(?4, '')";

fn from_row(row: &Row<'_>) -> rusqlite::Result<PreferenceRecord> {
    Ok(PreferenceRecord {
        id: row.get(0)?,
        recipient: SubjectEntity::new(enum_col(row, 1)?, row.get(2)?),
        channel: enum_col(row, 3)?,
        category: row.get(4)?,
        opted_in: row.get(5)?,
        opted_in_at: opt_ts_col(row, 6)?,
        opted_out_at: opt_ts_col(row, 7)?,
        opt_out_reason: row.get(8)?,
        unsubscribe_token: row.get(9)?,
        created_at: ts_col(row, 10)?,
        updated_at: ts_col(row, 11)?,
    })
}

fn select_scoped(
    conn: &rusqlite::Connection,
    recipient: SubjectEntity,
    channel: Channel,
    category: Option<&str>,
) -> rusqlite::Result<Option<PreferenceRecord>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM preferences WHERE {SCOPE}"),
        params![
            recipient.kind.to_string(),
            recipient.id,
            channel.to_string(),
            category
        ],
        from_row,
    )
    .optional()
}

pub async fn find(
    db: &Database,
    recipient: SubjectEntity,
    channel: Channel,
    category: Option<&str>,
) -> Result<Option<PreferenceRecord>, CourierError> {
    let category = category.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<Option<PreferenceRecord>, rusqlite::Error> {
            select_scoped(conn, recipient, channel, category.as_deref())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn find_by_token(
    db: &Database,
    token: &str,
) -> Result<Option<PreferenceRecord>, CourierError> {
    let token = token.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<PreferenceRecord>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM preferences WHERE unsubscribe_token = ?1"),
                params![token],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Upsert the preference and append its audit entry in one transaction.
///
/// A newly created record takes `change.new_token`; an existing record keeps
/// its token.
pub async fn apply_change(
    db: &Database,
    change: &PreferenceChange,
) -> Result<PreferenceRecord, CourierError> {
    let change = change.clone();
    db.connection()
        .call(move |conn| -> Result<PreferenceRecord, rusqlite::Error> {
            let tx = conn.transaction()?;
            let at = format_ts(change.at);
            let opted_in = change.action == PreferenceAction::OptIn;
            let existing = select_scoped(
                &tx,
                change.recipient,
                change.channel,
                change.category.as_deref(),
            )?;

            let preference_id = match existing {
                Some(existing) => {
                    if opted_in {
                        tx.execute(
                            "UPDATE preferences SET opted_in = 1, opted_in_at = ?2,
                                 opted_out_at = NULL, opt_out_reason = NULL, updated_at = ?2
                             WHERE id = ?1",
                            params![existing.id, at],
                        )?;
                    } else {
                        tx.execute(
                            "UPDATE preferences SET opted_in = 0, opted_out_at = ?2,
                                 opt_out_reason = ?3, updated_at = ?2
                             WHERE id = ?1",
                            params![existing.id, at, change.reason],
                        )?;
                    }
                    existing.id
                }
                None => {
                    let (opted_in_at, opted_out_at, reason) = if opted_in {
                        (Some(&at), None, None)
                    } else {
                        (None, Some(&at), change.reason.as_deref())
                    };
                    tx.execute(
                        "INSERT INTO preferences (
                            recipient_type, recipient_id, channel, category, opted_in,
                            opted_in_at, opted_out_at, opt_out_reason, unsubscribe_token,
                            created_at, updated_at
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                        params![
                            change.recipient.kind.to_string(),
                            change.recipient.id,
                            change.channel.to_string(),
                            change.category,
                            opted_in,
                            opted_in_at,
                            opted_out_at,
                            reason,
                            change.new_token,
                            at,
                        ],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            tx.execute(
                "INSERT INTO preference_audit (preference_id, action, reason, ip_address, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    preference_id,
                    change.action.to_string(),
                    change.reason,
                    change.ip,
                    at
                ],
            )?;

            let record = tx.query_row(
                &format!("SELECT {COLUMNS} FROM preferences WHERE id = ?1"),
                params![preference_id],
                from_row,
            )?;
            tx.commit()?;
            Ok(record)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_audit(
    db: &Database,
    preference_id: i64,
) -> Result<Vec<ComplianceAuditEntry>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<ComplianceAuditEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, preference_id, action, reason, ip_address, occurred_at
                 FROM preference_audit
                 WHERE preference_id = ?1
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![preference_id], |row| {
                Ok(ComplianceAuditEntry {
                    id: row.get(0)?,
                    preference_id: row.get(1)?,
                    action: enum_col(row, 2)?,
                    reason: row.get(3)?,
                    ip: row.get(4)?,
                    occurred_at: ts_col(row, 5)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use courier_core::types::EntityKind;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn change(action: PreferenceAction, category: Option<&str>, token: &str) -> PreferenceChange {
        PreferenceChange {
            recipient: SubjectEntity::new(EntityKind::Contact, 42),
            channel: Channel::Email,
            category: category.map(str::to_string),
            action,
            reason: (action == PreferenceAction::OptOut).then(|| "too many emails".to_string()),
            ip: Some("203.0.113.9".to_string()),
            at: t0(),
            new_token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn opt_out_then_in_updates_one_record_with_two_audits() {
        let db = Database::open_in_memory().await.unwrap();

        let out = apply_change(&db, &change(PreferenceAction::OptOut, Some("newsletter"), "tok-1"))
            .await
            .unwrap();
        assert!(!out.opted_in);
        assert_eq!(out.opt_out_reason.as_deref(), Some("too many emails"));
        assert_eq!(out.unsubscribe_token, "tok-1");

        let mut back_in = change(PreferenceAction::OptIn, Some("newsletter"), "tok-2");
        back_in.at = t0() + Duration::days(1);
        let back = apply_change(&db, &back_in).await.unwrap();
        assert_eq!(back.id, out.id);
        assert!(back.opted_in);
        assert_eq!(back.unsubscribe_token, "tok-1");
        assert!(back.opt_out_reason.is_none());
        assert!(back.opted_out_at.is_none());
        assert_eq!(back.opted_in_at, Some(back_in.at));

        let audit = list_audit(&db, out.id).await.unwrap();
        let actions: Vec<_> = audit.iter().map(|a| a.action).collect();
        assert_eq!(actions, vec![PreferenceAction::OptOut, PreferenceAction::OptIn]);
        assert_eq!(audit[0].ip.as_deref(), Some("203.0.113.9"));
    }

    #[tokio::test]
    async fn categories_are_scoped_separately() {
        let db = Database::open_in_memory().await.unwrap();
        apply_change(&db, &change(PreferenceAction::OptOut, Some("newsletter"), "a"))
            .await
            .unwrap();
        apply_change(&db, &change(PreferenceAction::OptIn, None, "b"))
            .await
            .unwrap();

        let recipient = SubjectEntity::new(EntityKind::Contact, 42);
        let newsletter = find(&db, recipient, Channel::Email, Some("newsletter"))
            .await
            .unwrap()
            .unwrap();
        let general = find(&db, recipient, Channel::Email, None).await.unwrap().unwrap();
        assert!(!newsletter.opted_in);
        assert!(general.opted_in);
        assert!(find(&db, recipient, Channel::Sms, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_lookup() {
        let db = Database::open_in_memory().await.unwrap();
        let created = apply_change(&db, &change(PreferenceAction::OptIn, None, "tok-xyz"))
            .await
            .unwrap();
        let found = find_by_token(&db, "tok-xyz").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(find_by_token(&db, "unknown").await.unwrap().is_none());
    }
}
