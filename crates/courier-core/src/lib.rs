// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier communication dispatch service.
//!
//! This crate provides the error taxonomy, the domain types for outbound
//! communications and their delivery history, and the trait seams that
//! provider adapters, storage backends, and settings stores implement.

pub mod error;
pub mod settings;
pub mod time;
pub mod traits;
pub mod types;

pub use error::CourierError;
pub use settings::{ChannelSettings, ProviderKind, ProviderSettings};
pub use time::{Clock, SystemClock};
pub use traits::{CommunicationStore, ProviderAdapter, SettingsSource};
pub use types::{
    CanonicalEvent, Channel, CommunicationDraft, CommunicationEvent, CommunicationRecord,
    DeliveryStatus, Direction, EntityKind, PreferenceRecord, ScheduledStatus, SubjectEntity,
};
