// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Closed mapping from provider names to adapter implementations.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use courier_core::{Channel, CourierError, ProviderAdapter, ProviderKind, ProviderSettings};
use courier_email::SmtpProvider;
use courier_sms::TwilioProvider;

use crate::portal::PortalProvider;

/// Builds an adapter from one resolved settings snapshot.
pub type AdapterFactory = Arc<dyn Fn(ProviderSettings) -> Arc<dyn ProviderAdapter> + Send + Sync>;

/// Parse a configured provider name. Unknown names are configuration errors.
pub fn parse_provider(name: &str) -> Result<ProviderKind, CourierError> {
    ProviderKind::from_str(name.trim())
        .map_err(|_| CourierError::Config(format!("unknown provider '{name}'")))
}

/// Parse a provider name and check that it serves `channel`.
pub fn provider_for_channel(name: &str, channel: Channel) -> Result<ProviderKind, CourierError> {
    let kind = parse_provider(name)?;
    if kind.channel() != channel {
        return Err(CourierError::Config(format!(
            "provider '{kind}' cannot deliver {channel}"
        )));
    }
    Ok(kind)
}

fn builtin(settings: ProviderSettings) -> Arc<dyn ProviderAdapter> {
    match settings.provider {
        ProviderKind::Smtp | ProviderKind::Ses | ProviderKind::Gmail => {
            Arc::new(SmtpProvider::new(settings))
        }
        ProviderKind::Twilio => Arc::new(TwilioProvider::new(settings)),
        ProviderKind::Portal => Arc::new(PortalProvider::new(settings)),
    }
}

/// Every [`ProviderKind`] has a compiled-in adapter; a kind can be
/// re-pointed at another implementation (used by tests and embedders).
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    overrides: HashMap<ProviderKind, AdapterFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the adapter used for `kind`.
    pub fn with_adapter<F>(mut self, kind: ProviderKind, factory: F) -> Self
    where
        F: Fn(ProviderSettings) -> Arc<dyn ProviderAdapter> + Send + Sync + 'static,
    {
        self.overrides.insert(kind, Arc::new(factory));
        self
    }

    /// Adapter for the provider named in `settings`.
    pub fn build(&self, settings: ProviderSettings) -> Arc<dyn ProviderAdapter> {
        match self.overrides.get(&settings.provider) {
            Some(factory) => factory(settings),
            None => builtin(settings),
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}
