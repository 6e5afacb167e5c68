// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opt-in/opt-out compliance gate.
//!
//! Consulted before every non-transactional send. Opt changes are upserts
//! that always append one audit entry, so the compliance trail records every
//! request even when the state does not change.

use std::sync::Arc;

use courier_core::types::{
    ComplianceAuditEntry, PreferenceAction, PreferenceChange, is_transactional,
};
use courier_core::{Channel, Clock, CommunicationStore, CourierError, PreferenceRecord, SubjectEntity};
use rand::RngCore;
use tracing::{debug, info};

/// Bytes of entropy in an unsubscribe token (hex encoded to 64 chars).
const TOKEN_BYTES: usize = 32;

/// Fresh random unsubscribe token.
///
/// Tokens carry no recipient data; they are only a lookup key.
pub fn new_unsubscribe_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Categories are matched trimmed and lowercased; blank means none.
fn normalize_category(category: Option<&str>) -> Option<String> {
    category
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
}

#[derive(Clone)]
pub struct PreferenceGate {
    store: Arc<dyn CommunicationStore>,
    clock: Arc<dyn Clock>,
}

impl PreferenceGate {
    pub fn new(store: Arc<dyn CommunicationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Whether a message of `category` may be sent to `recipient`.
    ///
    /// Transactional (or uncategorised) messages always pass. Otherwise the
    /// send is allowed unless a matching record says the recipient opted
    /// out; a missing record counts as allowed.
    pub async fn can_send(
        &self,
        recipient: SubjectEntity,
        channel: Channel,
        category: Option<&str>,
    ) -> Result<bool, CourierError> {
        if is_transactional(category) {
            return Ok(true);
        }
        let category = normalize_category(category);
        let allowed = self
            .store
            .find_preference(recipient, channel, category.as_deref())
            .await?
            .is_none_or(|pref| pref.opted_in);
        debug!(%recipient, %channel, ?category, allowed, "preference check");
        Ok(allowed)
    }

    pub async fn opt_in(
        &self,
        recipient: SubjectEntity,
        channel: Channel,
        category: Option<&str>,
        ip: Option<&str>,
    ) -> Result<PreferenceRecord, CourierError> {
        let record = self
            .apply(recipient, channel, category, PreferenceAction::OptIn, None, ip)
            .await?;
        info!(%recipient, %channel, ?category, "recipient opted in");
        Ok(record)
    }

    pub async fn opt_out(
        &self,
        recipient: SubjectEntity,
        channel: Channel,
        category: Option<&str>,
        reason: Option<&str>,
        ip: Option<&str>,
    ) -> Result<PreferenceRecord, CourierError> {
        let record = self
            .apply(recipient, channel, category, PreferenceAction::OptOut, reason, ip)
            .await?;
        info!(%recipient, %channel, ?category, "recipient opted out");
        Ok(record)
    }

    pub async fn by_unsubscribe_token(
        &self,
        token: &str,
    ) -> Result<Option<PreferenceRecord>, CourierError> {
        if token.is_empty() {
            return Ok(None);
        }
        self.store.find_preference_by_token(token).await
    }

    /// Opt out the owner of `token`. `None` when the token is unknown.
    pub async fn unsubscribe(
        &self,
        token: &str,
        ip: Option<&str>,
    ) -> Result<Option<PreferenceRecord>, CourierError> {
        let Some(pref) = self.by_unsubscribe_token(token).await? else {
            return Ok(None);
        };
        let record = self
            .apply(
                pref.recipient,
                pref.channel,
                pref.category.as_deref(),
                PreferenceAction::OptOut,
                Some("unsubscribe link"),
                ip,
            )
            .await?;
        info!(preference_id = record.id, "unsubscribed via link");
        Ok(Some(record))
    }

    pub async fn audit_trail(
        &self,
        preference_id: i64,
    ) -> Result<Vec<ComplianceAuditEntry>, CourierError> {
        self.store.list_preference_audit(preference_id).await
    }

    async fn apply(
        &self,
        recipient: SubjectEntity,
        channel: Channel,
        category: Option<&str>,
        action: PreferenceAction,
        reason: Option<&str>,
        ip: Option<&str>,
    ) -> Result<PreferenceRecord, CourierError> {
        let change = PreferenceChange {
            recipient,
            channel,
            category: normalize_category(category),
            action,
            reason: reason.map(str::to_string),
            ip: ip.map(str::to_string),
            at: self.clock.now(),
            new_token: new_unsubscribe_token(),
        };
        self.store.apply_preference_change(&change).await
    }
}
