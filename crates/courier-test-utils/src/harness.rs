// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness wiring a full `Courier` for integration testing.
//!
//! Each harness owns its own SQLite database (in memory, or in a temp
//! directory removed on drop), a [`ManualClock`] and mock providers for the
//! provider kinds asked for. Twilio is left real by default so status
//! callbacks go through the actual parser, with signature checks off.

use std::collections::HashMap;
use std::sync::Arc;

use courier_config::model::StorageConfig;
use courier_core::{
    Channel, ChannelSettings, CommunicationDraft, CommunicationStore, CourierError, EntityKind,
    ProviderAdapter, ProviderKind, SubjectEntity,
};
use courier_dispatch::{Courier, ProviderRegistry, RetryPolicy, SettingsResolver};
use courier_storage::SqliteStorage;

use crate::clock::ManualClock;
use crate::mock_provider::MockProvider;

/// Default sender for email drafts built by the harness.
pub const DEFAULT_FROM_EMAIL: &str = "crm@example.com";
pub const DEFAULT_FROM_NUMBER: &str = "+15550001111";

/// Builder for configuring a [`TestHarness`].
pub struct TestHarnessBuilder {
    mocked: Vec<ProviderKind>,
    policy: RetryPolicy,
    batch_size: usize,
    on_disk: bool,
    email: ChannelSettings,
    sms: ChannelSettings,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            mocked: vec![ProviderKind::Smtp],
            policy: RetryPolicy::default(),
            batch_size: 100,
            on_disk: false,
            email: ChannelSettings {
                from_email: Some(DEFAULT_FROM_EMAIL.to_string()),
                ..Default::default()
            },
            sms: ChannelSettings {
                from_number: Some(DEFAULT_FROM_NUMBER.to_string()),
                twilio_account_sid: Some("ACtest".to_string()),
                twilio_auth_token: Some("test-token".to_string()),
                ..Default::default()
            },
        }
    }

    /// Replace the built-in adapter for `kind` with a [`MockProvider`].
    pub fn with_mock(mut self, kind: ProviderKind) -> Self {
        if !self.mocked.contains(&kind) {
            self.mocked.push(kind);
        }
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Use a SQLite file in a temp directory instead of an in-memory database.
    pub fn on_disk(mut self) -> Self {
        self.on_disk = true;
        self
    }

    /// Environment-level settings for a channel, replacing the defaults.
    pub fn with_env(mut self, channel: Channel, settings: ChannelSettings) -> Self {
        match channel {
            Channel::Email => self.email = settings,
            Channel::Sms => self.sms = settings,
            Channel::PortalMessage => {}
        }
        self
    }

    pub async fn build(self) -> Result<TestHarness, CourierError> {
        let (storage, temp_dir) = if self.on_disk {
            let temp_dir =
                tempfile::TempDir::new().map_err(|e| CourierError::Storage { source: e.into() })?;
            let config = StorageConfig {
                database_path: temp_dir.path().join("test.db").to_string_lossy().to_string(),
                wal_mode: true,
            };
            (SqliteStorage::open(&config).await?, Some(temp_dir))
        } else {
            (SqliteStorage::open_in_memory().await?, None)
        };
        let store: Arc<dyn CommunicationStore> = Arc::new(storage);
        let clock = ManualClock::default();

        let mut registry = ProviderRegistry::new();
        let mut mocks = HashMap::new();
        for kind in self.mocked {
            let mock = MockProvider::new(kind);
            let adapter = mock.clone();
            registry = registry.with_adapter(kind, move |_| {
                Arc::new(adapter.clone()) as Arc<dyn ProviderAdapter>
            });
            mocks.insert(kind, mock);
        }

        let settings = SettingsResolver::new()
            .with_env(Channel::Email, self.email)
            .with_env(Channel::Sms, self.sms)
            .with_signature_verification(false);

        let courier = Courier::builder(store.clone())
            .clock(Arc::new(clock.clone()))
            .registry(registry)
            .settings(settings)
            .retry_policy(self.policy)
            .batch_size(self.batch_size)
            .build();

        Ok(TestHarness {
            courier,
            store,
            clock,
            mocks,
            _temp_dir: temp_dir,
        })
    }
}

/// An isolated `Courier` with handles for driving and inspecting it.
pub struct TestHarness {
    pub courier: Courier,
    /// The store behind `courier`, for direct assertions.
    pub store: Arc<dyn CommunicationStore>,
    pub clock: ManualClock,
    mocks: HashMap<ProviderKind, MockProvider>,
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default settings and a mocked SMTP provider.
    pub async fn new() -> Result<Self, CourierError> {
        Self::builder().build().await
    }

    /// The mock standing in for SMTP.
    pub fn smtp(&self) -> &MockProvider {
        self.mock(ProviderKind::Smtp)
    }

    /// The mock registered for `kind`.
    ///
    /// # Panics
    ///
    /// When `kind` was not mocked via [`TestHarnessBuilder::with_mock`].
    pub fn mock(&self, kind: ProviderKind) -> &MockProvider {
        self.mocks
            .get(&kind)
            .unwrap_or_else(|| panic!("{kind} is not mocked in this harness"))
    }
}

/// Email draft for Lead #7 with subject "Hi".
pub fn email_draft(to: &str) -> CommunicationDraft {
    CommunicationDraft::new(
        Channel::Email,
        SubjectEntity::new(EntityKind::Lead, 7),
        to,
        "text",
    )
    .with_subject("Hi")
}

/// SMS draft for Lead #7.
pub fn sms_draft(to: &str) -> CommunicationDraft {
    CommunicationDraft::new(
        Channel::Sms,
        SubjectEntity::new(EntityKind::Lead, 7),
        to,
        "text",
    )
}
