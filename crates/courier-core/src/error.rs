// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier dispatch service.

use thiserror::Error;

/// The primary error type used across provider adapters, storage, and the
/// dispatch pipeline.
///
/// Compliance refusals and webhook correlation misses are not errors; they
/// are reported through normal return values.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Required provider credentials or settings are missing or malformed.
    /// Permanent: never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// A communication failed channel-specific field validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport failure or provider-side rejection (rate limit, invalid
    /// recipient, network error). Transient: retried up to the bound.
    #[error("send error: {message}")]
    Send {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage backend errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A referenced entity no longer exists.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// An inbound provider callback could not be parsed.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// Secret sealing or unsealing failed.
    #[error("vault error: {0}")]
    Vault(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Shorthand for a [`CourierError::Send`] without an underlying source.
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`CourierError::NotFound`] on a communication record.
    pub fn communication_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "communication".to_string(),
            id: id.to_string(),
        }
    }

    /// Whether a retry of the same operation may succeed.
    ///
    /// Only transport-level failures are transient. Configuration and
    /// validation failures will fail identically on every attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Send { .. } | Self::Timeout { .. })
    }

    /// Whether the error is a record-not-found at execution time.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
