// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for Courier.
//!
//! Exposes the send API to CRM callers (bearer authenticated), accepts
//! delivery callbacks from providers, and serves public unsubscribe links.
//! Handlers only translate HTTP to [`courier_dispatch::Courier`] calls; no
//! send happens on the request path except through the job queue.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use server::{GatewayState, ServerConfig, router, start_server};
