// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider selection and per-channel settings.
//!
//! [`ChannelSettings`] is the partial, layered view consumed from the
//! settings store, the environment config, and per-call overrides.
//! [`ProviderSettings`] is the resolved snapshot threaded into exactly one
//! adapter call.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::Channel;

/// The closed set of provider implementations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Smtp,
    Ses,
    #[strum(to_string = "gmail", serialize = "gmail_relay")]
    Gmail,
    Twilio,
    Portal,
}

impl ProviderKind {
    /// The channel this provider delivers on.
    pub fn channel(self) -> Channel {
        match self {
            Self::Smtp | Self::Ses | Self::Gmail => Channel::Email,
            Self::Twilio => Channel::Sms,
            Self::Portal => Channel::PortalMessage,
        }
    }

    /// Provider used for a channel when no layer names one.
    pub fn default_for(channel: Channel) -> Self {
        match channel {
            Channel::Email => Self::Smtp,
            Channel::Sms => Self::Twilio,
            Channel::PortalMessage => Self::Portal,
        }
    }
}

/// Partial per-channel settings. Every field is optional so layers can be
/// merged field by field.
///
/// Secret fields may carry an `enc:v1:` sealed value; they are decrypted
/// during resolution, never here.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSettings {
    #[serde(default)]
    pub is_enabled: Option<bool>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub from_number: Option<String>,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub ses_region: Option<String>,
    #[serde(default)]
    pub twilio_account_sid: Option<String>,
    #[serde(default)]
    pub twilio_auth_token: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl ChannelSettings {
    /// Fill every unset field of `self` from `lower`.
    pub fn or(self, lower: &ChannelSettings) -> ChannelSettings {
        ChannelSettings {
            is_enabled: self.is_enabled.or(lower.is_enabled),
            provider: self.provider.or_else(|| lower.provider.clone()),
            from_email: self.from_email.or_else(|| lower.from_email.clone()),
            from_number: self.from_number.or_else(|| lower.from_number.clone()),
            smtp_host: self.smtp_host.or_else(|| lower.smtp_host.clone()),
            smtp_port: self.smtp_port.or(lower.smtp_port),
            smtp_username: self.smtp_username.or_else(|| lower.smtp_username.clone()),
            smtp_password: self.smtp_password.or_else(|| lower.smtp_password.clone()),
            ses_region: self.ses_region.or_else(|| lower.ses_region.clone()),
            twilio_account_sid: self
                .twilio_account_sid
                .or_else(|| lower.twilio_account_sid.clone()),
            twilio_auth_token: self
                .twilio_auth_token
                .or_else(|| lower.twilio_auth_token.clone()),
            api_base_url: self.api_base_url.or_else(|| lower.api_base_url.clone()),
        }
    }
}

impl std::fmt::Debug for ChannelSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSettings")
            .field("is_enabled", &self.is_enabled)
            .field("provider", &self.provider)
            .field("from_email", &self.from_email)
            .field("from_number", &self.from_number)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &self.smtp_password.as_ref().map(|_| "[redacted]"))
            .field("ses_region", &self.ses_region)
            .field("twilio_account_sid", &self.twilio_account_sid)
            .field(
                "twilio_auth_token",
                &self.twilio_auth_token.as_ref().map(|_| "[redacted]"),
            )
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

/// Resolved, decrypted settings for one provider call.
#[derive(Debug)]
pub struct ProviderSettings {
    pub channel: Channel,
    pub provider: ProviderKind,
    pub enabled: bool,
    pub from_email: Option<String>,
    pub from_number: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<SecretString>,
    pub ses_region: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<SecretString>,
    pub api_base_url: Option<String>,
    pub timeout: Duration,
    pub verify_signatures: bool,
}

impl ProviderSettings {
    /// Empty settings for a provider; every credential unset.
    pub fn unconfigured(provider: ProviderKind) -> Self {
        Self {
            channel: provider.channel(),
            provider,
            enabled: true,
            from_email: None,
            from_number: None,
            smtp_host: None,
            smtp_port: None,
            smtp_username: None,
            smtp_password: None,
            ses_region: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            api_base_url: None,
            timeout: Duration::from_secs(30),
            verify_signatures: false,
        }
    }

    /// Default sender for the channel.
    pub fn default_from(&self) -> Option<&str> {
        match self.channel {
            Channel::Email => self.from_email.as_deref(),
            Channel::Sms => self.from_number.as_deref(),
            Channel::PortalMessage => None,
        }
    }
}

impl Clone for ProviderSettings {
    fn clone(&self) -> Self {
        let copy_secret =
            |s: &Option<SecretString>| s.as_ref().map(|v| SecretString::from(v.expose_secret().to_owned()));
        Self {
            channel: self.channel,
            provider: self.provider,
            enabled: self.enabled,
            from_email: self.from_email.clone(),
            from_number: self.from_number.clone(),
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            smtp_username: self.smtp_username.clone(),
            smtp_password: copy_secret(&self.smtp_password),
            ses_region: self.ses_region.clone(),
            twilio_account_sid: self.twilio_account_sid.clone(),
            twilio_auth_token: copy_secret(&self.twilio_auth_token),
            api_base_url: self.api_base_url.clone(),
            timeout: self.timeout,
            verify_signatures: self.verify_signatures,
        }
    }
}
