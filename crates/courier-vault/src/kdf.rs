// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argon2id key derivation from a passphrase.

use courier_config::model::VaultConfig;
use courier_core::CourierError;
use zeroize::Zeroizing;

/// Derive a 32-byte key from `passphrase` using Argon2id v0x13.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8; 16],
    memory_cost: u32,
    iterations: u32,
    parallelism: u32,
) -> Result<Zeroizing<[u8; 32]>, CourierError> {
    let params = argon2::Params::new(memory_cost, iterations, parallelism, Some(32))
        .map_err(|e| CourierError::Vault(format!("invalid Argon2id parameters: {e}")))?;

    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase, salt, output.as_mut())
        .map_err(|e| CourierError::Vault(format!("Argon2id key derivation failed: {e}")))?;

    Ok(output)
}

/// Derive the sealing key using the cost parameters from `[vault]`.
pub fn derive_key_with(
    passphrase: &[u8],
    salt: &[u8; 16],
    config: &VaultConfig,
) -> Result<Zeroizing<[u8; 32]>, CourierError> {
    derive_key(
        passphrase,
        salt,
        config.kdf_memory_cost,
        config.kdf_iterations,
        config.kdf_parallelism,
    )
}

/// Parse the hex salt from `[vault] salt`.
pub fn parse_salt(hex_salt: &str) -> Result<[u8; 16], CourierError> {
    let bytes = hex::decode(hex_salt.trim())
        .map_err(|e| CourierError::Vault(format!("vault salt is not valid hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CourierError::Vault("vault salt must be exactly 16 bytes".to_string()))
}
