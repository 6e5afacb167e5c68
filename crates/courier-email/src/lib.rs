// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Email provider adapters for the Courier dispatch service.
//!
//! A single SMTP transport serves plain SMTP relays, Amazon SES (through its
//! SMTP interface), and Gmail relay. Delivery callbacks are parsed from the
//! generic relay format or from SNS-wrapped SES notifications.

pub mod message;
pub mod smtp;
pub mod webhook;

pub use smtp::SmtpProvider;
