// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline tests.
//!
//! `TestHarness` assembles a [`MessagingSession`] over the in-memory store,
//! scripted functions, in-memory object storage and an optional capture
//! device. The mocks stay reachable for assertions.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parley_config::model::ParleyConfig;
use parley_core::types::{ChannelInstance, ConnectivityStatus, Conversation};
use parley_core::{
    AudioCapture, ChangeFeed, ConversationId, InstanceId, OrganizationId, ParleyError, UserId,
};
use parley_messaging::{Adapters, MessagingSession};

use crate::memory_store::MemoryStore;
use crate::mock_capture::MockCapture;
use crate::mock_functions::{MockFunctions, ProbeScript};
use crate::mock_storage::MockObjectStorage;

/// Organization used by every harness.
pub const TEST_ORG: &str = "org-1";
/// Operator the harness session acts as.
pub const TEST_USER: &str = "user-1";

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// A channel instance of [`TEST_ORG`].
pub fn instance(id: &str, label: &str) -> ChannelInstance {
    ChannelInstance {
        id: InstanceId::from(id),
        organization_id: OrganizationId::from(TEST_ORG),
        label: label.to_string(),
        address: "5511900000000".to_string(),
        declared_connected: true,
        verified: ConnectivityStatus::Unknown,
    }
}

/// A conversation of [`TEST_ORG`] whose last activity is `activity_secs`
/// after a fixed epoch.
pub fn conversation(id: &str, address: &str, instance: &str, activity_secs: i64) -> Conversation {
    Conversation {
        id: ConversationId::from(id),
        organization_id: OrganizationId::from(TEST_ORG),
        counterparty_address: address.to_string(),
        counterparty_name: None,
        channel_instance_id: InstanceId::from(instance),
        customer_id: None,
        assigned_user_id: None,
        last_activity_at: epoch() + chrono::Duration::seconds(activity_secs),
        unread_count: 0,
        is_group: false,
    }
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    instances: Vec<(ChannelInstance, ProbeScript)>,
    conversations: Vec<Conversation>,
    cooldown: Duration,
    probe_timeout: Duration,
    capture_formats: Option<Vec<String>>,
    with_feed: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            instances: Vec::new(),
            conversations: Vec::new(),
            cooldown: Duration::ZERO,
            probe_timeout: Duration::from_millis(500),
            capture_formats: None,
            with_feed: true,
        }
    }

    /// Adds a channel instance whose probe follows `probe`.
    pub fn with_instance(mut self, id: &str, label: &str, probe: ProbeScript) -> Self {
        self.instances.push((instance(id, label), probe));
        self
    }

    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversations.push(conversation);
        self
    }

    /// Session-wide send cooldown; zero by default.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Attaches a capture device that can encode `formats`.
    pub fn with_capture(mut self, formats: &[&str]) -> Self {
        self.capture_formats = Some(formats.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Runs the session without a change feed (polling only).
    pub fn without_feed(mut self) -> Self {
        self.with_feed = false;
        self
    }

    pub fn build(self) -> Result<TestHarness, ParleyError> {
        let store = Arc::new(MemoryStore::new());
        let functions = Arc::new(MockFunctions::new());
        let storage = Arc::new(MockObjectStorage::new());
        let capture = self.capture_formats.map(|formats| {
            let refs: Vec<&str> = formats.iter().map(String::as_str).collect();
            Arc::new(MockCapture::new(&refs))
        });

        for (instance, probe) in self.instances {
            functions.script_probe(instance.id.as_str(), probe);
            store.add_instance(instance);
        }
        for conversation in self.conversations {
            store.add_conversation(conversation);
        }

        let mut config = ParleyConfig::default();
        config.session.organization_id = TEST_ORG.to_string();
        config.session.user_id = Some(TEST_USER.to_string());
        config.messaging.send_cooldown_ms = self.cooldown.as_millis() as u64;
        config.messaging.probe_timeout_ms = self.probe_timeout.as_millis() as u64;
        config.messaging.poll_interval_secs = 1;

        let adapters = Adapters {
            store: store.clone(),
            functions: functions.clone(),
            storage: storage.clone(),
            feed: self
                .with_feed
                .then(|| store.clone() as Arc<dyn ChangeFeed>),
            capture: capture.clone().map(|c| c as Arc<dyn AudioCapture>),
        };
        let session = MessagingSession::new(&config, adapters)?;

        Ok(TestHarness {
            session,
            store,
            functions,
            storage,
            capture,
            config,
        })
    }
}

/// A complete messaging session over mock adapters.
pub struct TestHarness {
    pub session: MessagingSession,
    pub store: Arc<MemoryStore>,
    pub functions: Arc<MockFunctions>,
    pub storage: Arc<MockObjectStorage>,
    pub capture: Option<Arc<MockCapture>>,
    pub config: ParleyConfig,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn org(&self) -> OrganizationId {
        OrganizationId::from(TEST_ORG)
    }

    pub fn user(&self) -> UserId {
        UserId::from(TEST_USER)
    }
}
