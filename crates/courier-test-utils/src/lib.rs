// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides a scripted provider, a hand-driven clock and a harness wiring a
//! full [`courier_dispatch::Courier`] over SQLite, so send, retry, schedule
//! and webhook flows run without network access or wall-clock waits.
//!
//! # Components
//!
//! - [`MockProvider`] - provider adapter with scripted outcomes and a call log
//! - [`ManualClock`] - clock that only moves when told to
//! - [`TestHarness`] - isolated `Courier` plus handles for assertions

pub mod clock;
pub mod harness;
pub mod mock_provider;

pub use clock::ManualClock;
pub use harness::{TestHarness, email_draft, sms_draft};
pub use mock_provider::MockProvider;
