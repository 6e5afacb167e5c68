// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio SMS provider adapter for the Courier dispatch service.

pub mod signature;
pub mod twilio;

pub use twilio::TwilioProvider;
