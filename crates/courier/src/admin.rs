// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands: provider verification and secret sealing.

use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::Arc;

use courier_config::CourierConfig;
use courier_core::{Channel, CommunicationStore, CourierError};
use courier_dispatch::Courier;
use courier_storage::SqliteStorage;
use courier_vault::SecretSealer;
use secrecy::SecretString;

const CHANNELS: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::PortalMessage];

fn parse_channels(channel: Option<&str>) -> Result<Vec<Channel>, CourierError> {
    match channel {
        None => Ok(CHANNELS.to_vec()),
        Some(name) => Channel::from_str(name)
            .map(|c| vec![c])
            .map_err(|_| CourierError::Validation(format!("unknown channel: {name}"))),
    }
}

/// `courier verify [channel]`: one line per channel, non-zero exit on failure.
pub async fn run_verify(config: CourierConfig, channel: Option<&str>) -> Result<(), CourierError> {
    let channels = parse_channels(channel)?;

    let storage = SqliteStorage::open(&config.storage).await?;
    let store: Arc<dyn CommunicationStore> = Arc::new(storage);
    let sealer = SecretSealer::from_env(&config.vault)?.map(Arc::new);
    let courier = Courier::from_config(&config, store, None, sealer);

    let mut failed = Vec::new();
    for channel in channels {
        let ok = courier.verify(channel).await?;
        println!("{channel:<16} {}", if ok { "ok" } else { "FAILED" });
        if !ok {
            failed.push(channel.to_string());
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(CourierError::Config(format!(
            "provider verification failed for: {}",
            failed.join(", ")
        )))
    }
}

/// Vault passphrase from the configured env var, else an interactive prompt.
fn passphrase(config: &CourierConfig) -> Result<SecretString, CourierError> {
    if let Ok(value) = std::env::var(&config.vault.passphrase_env) {
        return Ok(SecretString::from(value));
    }
    if !std::io::stdin().is_terminal() {
        return Err(CourierError::Vault(format!(
            "no vault passphrase: set {} or run interactively",
            config.vault.passphrase_env
        )));
    }
    rpassword::prompt_password("Vault passphrase: ")
        .map(SecretString::from)
        .map_err(|e| CourierError::Vault(format!("failed to read passphrase: {e}")))
}

/// `courier seal-secret`: read a secret without echo and print its sealed form.
pub fn run_seal_secret(config: &CourierConfig) -> Result<(), CourierError> {
    let sealer = SecretSealer::from_passphrase(&passphrase(config)?, &config.vault)?;
    let secret = rpassword::prompt_password("Secret to seal: ")
        .map_err(|e| CourierError::Vault(format!("failed to read secret: {e}")))?;
    if secret.is_empty() {
        return Err(CourierError::Validation("secret is empty".to_string()));
    }
    println!("{}", sealer.seal_value(&secret)?);
    Ok(())
}
