// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sealed-value envelope for secrets kept in settings stores and config files.
//!
//! A sealed value is `enc:v1:` followed by standard base64 of
//! `nonce || ciphertext_with_tag`. Anything without the prefix is plaintext.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use courier_config::model::VaultConfig;
use courier_core::CourierError;
use ring::aead::NONCE_LEN;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::{crypto, kdf};

/// Prefix marking a sealed value.
pub const SEALED_PREFIX: &str = "enc:v1:";

/// Returns true if `value` is in the sealed envelope format.
pub fn is_sealed(value: &str) -> bool {
    value.starts_with(SEALED_PREFIX)
}

/// Holds the derived sealing key in memory.
///
/// Debug output omits the key.
pub struct SecretSealer {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for SecretSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSealer")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SecretSealer {
    pub fn new(key: Zeroizing<[u8; 32]>) -> Self {
        Self { key }
    }

    /// Derive the sealing key from a passphrase and the `[vault]` salt.
    pub fn from_passphrase(
        passphrase: &SecretString,
        config: &VaultConfig,
    ) -> Result<Self, CourierError> {
        let salt = config
            .salt
            .as_deref()
            .ok_or_else(|| CourierError::Vault("vault.salt is not configured".to_string()))?;
        let salt = kdf::parse_salt(salt)?;
        let key = kdf::derive_key_with(passphrase.expose_secret().as_bytes(), &salt, config)?;
        Ok(Self::new(key))
    }

    /// Build a sealer from the environment, if one is configured.
    ///
    /// Returns `Ok(None)` when no salt is configured or the passphrase
    /// variable is unset; sealed values then cannot be opened.
    pub fn from_env(config: &VaultConfig) -> Result<Option<Self>, CourierError> {
        if config.salt.is_none() {
            debug!("vault.salt not set, sealed secrets are disabled");
            return Ok(None);
        }
        let Ok(passphrase) = std::env::var(&config.passphrase_env) else {
            debug!(
                env = %config.passphrase_env,
                "vault passphrase variable not set, sealed secrets are disabled"
            );
            return Ok(None);
        };
        Self::from_passphrase(&SecretString::from(passphrase), config).map(Some)
    }

    /// Seal a plaintext secret into the `enc:v1:` envelope.
    pub fn seal_value(&self, plaintext: &str) -> Result<String, CourierError> {
        let (ciphertext, nonce) = crypto::seal(&self.key, plaintext.as_bytes())?;
        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ciphertext);
        Ok(format!("{SEALED_PREFIX}{}", STANDARD.encode(raw)))
    }

    /// Open a sealed value. Fails on a missing prefix, bad encoding, or a
    /// failed authentication check.
    pub fn open_value(&self, sealed: &str) -> Result<SecretString, CourierError> {
        let encoded = sealed
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| CourierError::Vault("value is not sealed".to_string()))?;
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CourierError::Vault(format!("sealed value is not valid base64: {e}")))?;
        if raw.len() < NONCE_LEN + 16 {
            return Err(CourierError::Vault("sealed value is truncated".to_string()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| CourierError::Vault("sealed value is truncated".to_string()))?;

        let plaintext = Zeroizing::new(crypto::open(&self.key, &nonce, ciphertext)?);
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| CourierError::Vault("sealed value is not UTF-8".to_string()))?;
        Ok(SecretString::from(text.to_owned()))
    }
}

/// Turn a stored credential into a usable secret.
///
/// Plaintext passes through. Sealed values are opened with `sealer`; when
/// that is impossible the failure is logged and the value treated as absent.
pub fn reveal(sealer: Option<&SecretSealer>, field: &str, value: &str) -> Option<SecretString> {
    if !is_sealed(value) {
        return Some(SecretString::from(value.to_owned()));
    }
    let Some(sealer) = sealer else {
        warn!(field, "sealed secret found but no vault key is configured");
        return None;
    };
    match sealer.open_value(value) {
        Ok(secret) => Some(secret),
        Err(e) => {
            warn!(field, error = %e, "failed to open sealed secret, treating as unset");
            None
        }
    }
}
