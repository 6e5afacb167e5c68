// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams of the dispatch core.
//!
//! All async traits use `#[async_trait]` so they can be held as trait objects.

pub mod provider;
pub mod settings;
pub mod store;

pub use provider::ProviderAdapter;
pub use settings::SettingsSource;
pub use store::CommunicationStore;
