// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider settings resolution.
//!
//! Layers, highest first: per-call override, settings store, environment
//! config (`[email]`/`[sms]`), provider defaults. Fields merge one by one, so
//! a store that only sets `fromEmail` still inherits the environment's SMTP
//! host. Sealed secrets are opened here; the adapters only ever see
//! plaintext [`SecretString`]s.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::CourierConfig;
use courier_core::{
    Channel, ChannelSettings, CourierError, ProviderKind, ProviderSettings, SettingsSource,
};
use courier_vault::{SecretSealer, reveal};
use dashmap::DashMap;
use secrecy::SecretString;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::registry::provider_for_channel;

struct CachedSettings {
    fetched_at: Instant,
    settings: Option<ChannelSettings>,
}

/// Environment layer for one channel.
#[derive(Debug, Clone)]
struct EnvLayer {
    settings: ChannelSettings,
    timeout: Duration,
}

impl Default for EnvLayer {
    fn default() -> Self {
        Self {
            settings: ChannelSettings::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct SettingsResolver {
    source: Option<Arc<dyn SettingsSource>>,
    sealer: Option<Arc<SecretSealer>>,
    email: EnvLayer,
    sms: EnvLayer,
    portal: EnvLayer,
    verify_signatures: bool,
    ttl: Duration,
    cache: DashMap<Channel, CachedSettings>,
}

impl SettingsResolver {
    /// Resolver with no environment layer, store, or sealer.
    pub fn new() -> Self {
        Self {
            source: None,
            sealer: None,
            email: EnvLayer::default(),
            sms: EnvLayer::default(),
            portal: EnvLayer::default(),
            verify_signatures: false,
            ttl: Duration::from_secs(60),
            cache: DashMap::new(),
        }
    }

    pub fn from_config(config: &CourierConfig) -> Self {
        Self {
            email: EnvLayer {
                settings: config.email.channel_settings(),
                timeout: Duration::from_secs(config.email.timeout_secs),
            },
            sms: EnvLayer {
                settings: config.sms.channel_settings(),
                timeout: Duration::from_secs(config.sms.timeout_secs),
            },
            verify_signatures: config.sms.verify_signatures,
            ttl: Duration::from_secs(config.settings.cache_ttl_secs),
            ..Self::new()
        }
    }

    pub fn with_source(mut self, source: Arc<dyn SettingsSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_sealer(mut self, sealer: Option<Arc<SecretSealer>>) -> Self {
        self.sealer = sealer;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_env(mut self, channel: Channel, settings: ChannelSettings) -> Self {
        self.env_mut(channel).settings = settings;
        self
    }

    pub fn with_signature_verification(mut self, verify: bool) -> Self {
        self.verify_signatures = verify;
        self
    }

    fn env(&self, channel: Channel) -> &EnvLayer {
        match channel {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
            Channel::PortalMessage => &self.portal,
        }
    }

    fn env_mut(&mut self, channel: Channel) -> &mut EnvLayer {
        match channel {
            Channel::Email => &mut self.email,
            Channel::Sms => &mut self.sms,
            Channel::PortalMessage => &mut self.portal,
        }
    }

    /// Drop cached settings-store lookups.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    /// Settings for a send on `channel`, honouring the provider selected by
    /// the highest layer that names one.
    pub async fn resolve(
        &self,
        channel: Channel,
        call: Option<&ChannelSettings>,
    ) -> Result<ProviderSettings, CourierError> {
        let merged = self.merged(channel, call).await?;
        let kind = match merged.provider.as_deref() {
            Some(name) if !name.trim().is_empty() => provider_for_channel(name, channel)?,
            _ => ProviderKind::default_for(channel),
        };
        Ok(self.finish(channel, kind, merged))
    }

    /// Settings for a specific provider, whatever the channel selects.
    ///
    /// Used for webhooks, which arrive addressed to a provider.
    pub async fn resolve_provider(&self, kind: ProviderKind) -> Result<ProviderSettings, CourierError> {
        let channel = kind.channel();
        let merged = self.merged(channel, None).await?;
        Ok(self.finish(channel, kind, merged))
    }

    async fn merged(
        &self,
        channel: Channel,
        call: Option<&ChannelSettings>,
    ) -> Result<ChannelSettings, CourierError> {
        let stored = self.stored(channel).await?;
        let env = &self.env(channel).settings;
        let lower = match stored {
            Some(stored) => stored.or(env),
            None => env.clone(),
        };
        Ok(match call {
            Some(call) => call.clone().or(&lower),
            None => lower,
        })
    }

    async fn stored(&self, channel: Channel) -> Result<Option<ChannelSettings>, CourierError> {
        let Some(source) = &self.source else {
            return Ok(None);
        };
        if let Some(settings) = self.cached(channel) {
            return Ok(settings);
        }
        let settings = source.channel_settings(channel).await?;
        debug!(%channel, found = settings.is_some(), "loaded stored settings");
        self.cache.insert(
            channel,
            CachedSettings {
                fetched_at: Instant::now(),
                settings: settings.clone(),
            },
        );
        Ok(settings)
    }

    fn cached(&self, channel: Channel) -> Option<Option<ChannelSettings>> {
        let entry = self.cache.get(&channel)?;
        (entry.fetched_at.elapsed() < self.ttl).then(|| entry.settings.clone())
    }

    /// Open a credential. `Err(())` when a value was set but cannot be used.
    fn secret(&self, field: &str, value: Option<&str>) -> Result<Option<SecretString>, ()> {
        match value.filter(|v| !v.trim().is_empty()) {
            None => Ok(None),
            Some(v) => reveal(self.sealer.as_deref(), field, v).map(Some).ok_or(()),
        }
    }

    fn finish(&self, channel: Channel, kind: ProviderKind, merged: ChannelSettings) -> ProviderSettings {
        let smtp_password = self.secret("smtp_password", merged.smtp_password.as_deref());
        let twilio_auth_token =
            self.secret("twilio_auth_token", merged.twilio_auth_token.as_deref());
        if smtp_password.is_err() || twilio_auth_token.is_err() {
            warn!(%channel, provider = %kind, "credential unusable, provider will report not configured");
        }
        ProviderSettings {
            channel,
            provider: kind,
            enabled: merged.is_enabled.unwrap_or(true),
            from_email: merged.from_email,
            from_number: merged.from_number,
            smtp_host: merged.smtp_host,
            smtp_port: merged.smtp_port,
            smtp_username: merged.smtp_username,
            smtp_password: smtp_password.unwrap_or_default(),
            ses_region: merged.ses_region,
            twilio_account_sid: merged.twilio_account_sid,
            twilio_auth_token: twilio_auth_token.unwrap_or_default(),
            api_base_url: merged.api_base_url,
            timeout: self.env(channel).timeout,
            verify_signatures: self.verify_signatures && channel == Channel::Sms,
        }
    }
}

impl Default for SettingsResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings store backed by a fixed map; useful when settings live in config
/// or in tests.
#[derive(Debug, Default, Clone)]
pub struct StaticSettings {
    channels: std::collections::HashMap<Channel, ChannelSettings>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Channel, settings: ChannelSettings) -> Self {
        self.channels.insert(channel, settings);
        self
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn channel_settings(
        &self,
        channel: Channel,
    ) -> Result<Option<ChannelSettings>, CourierError> {
        Ok(self.channels.get(&channel).cloned())
    }
}
