// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM sealing for provider credentials.
//!
//! Credentials such as SMTP passwords and Twilio auth tokens may be stored
//! sealed (`enc:v1:...`) in config files or the settings store. The sealing
//! key is derived from a passphrase with Argon2id.

pub mod crypto;
pub mod kdf;
pub mod sealer;

pub use sealer::{SEALED_PREFIX, SecretSealer, is_sealed, reveal};

/// Mask a secret for display: first 4 characters, then `...`.
pub fn mask_secret(secret: &str) -> String {
    match secret.char_indices().nth(4) {
        Some((idx, _)) => format!("{}...", &secret[..idx]),
        None => "****".to_string(),
    }
}
