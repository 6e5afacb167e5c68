// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only access to the externally owned settings store.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::settings::ChannelSettings;
use crate::types::Channel;

/// Settings maintained outside the dispatch core (e.g. an admin settings
/// table). The core only reads it.
#[async_trait]
pub trait SettingsSource: Send + Sync + 'static {
    /// Stored settings for a channel, or `None` when nothing is stored.
    async fn channel_settings(&self, channel: Channel)
    -> Result<Option<ChannelSettings>, CourierError>;
}
