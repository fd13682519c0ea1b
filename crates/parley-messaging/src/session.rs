// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One operator's messaging session.
//!
//! [`MessagingSession`] owns the per-session state (the cooldown cell, the
//! active thread and its sibling set) and wires the registry, resolver, sync
//! and dispatcher together. All queries are scoped to the session's
//! organization.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use parley_config::model::ParleyConfig;
use parley_core::types::{ChannelInstance, Conversation, Message};
use parley_core::{
    AudioCapture, ChangeFeed, DataStore, FunctionEndpoint, InstanceId, ObjectStorage,
    OrganizationId, ParleyError, UserId,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admission::AdmissionController;
use crate::capture::{AudioRecorder, CapturedAudio};
use crate::dispatch::{validate_text, SendDispatcher};
use crate::inbox::{Inbox, InboxView};
use crate::media::{MediaPolicy, OutboundMedia};
use crate::registry::{ChannelRegistry, ConnectivityBoard};
use crate::resolver::{ConversationResolver, SiblingSet, SwitcherEntry};
use crate::sync::MessageSync;

/// Backend collaborators a session runs against.
#[derive(Clone)]
pub struct Adapters {
    pub store: Arc<dyn DataStore>,
    pub functions: Arc<dyn FunctionEndpoint>,
    pub storage: Arc<dyn ObjectStorage>,
    pub feed: Option<Arc<dyn ChangeFeed>>,
    pub capture: Option<Arc<dyn AudioCapture>>,
}

/// The conversation on screen together with its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveThread {
    pub siblings: SiblingSet,
    pub conversation: Conversation,
    /// Instances of the sibling set with their verified connectivity.
    pub instances: Vec<ChannelInstance>,
}

pub struct MessagingSession {
    org: OrganizationId,
    user: Option<UserId>,
    poll_interval: Duration,
    feed: Option<Arc<dyn ChangeFeed>>,
    capture: Option<Arc<dyn AudioCapture>>,
    registry: Arc<ChannelRegistry>,
    resolver: ConversationResolver,
    sync: Arc<MessageSync>,
    dispatcher: SendDispatcher,
    inbox: Inbox,
    policy: MediaPolicy,
    active: Mutex<Option<ActiveThread>>,
    cancel: CancellationToken,
}

impl MessagingSession {
    pub fn new(config: &ParleyConfig, adapters: Adapters) -> Result<Self, ParleyError> {
        let org = config.session.organization_id.trim();
        if org.is_empty() {
            return Err(ParleyError::Config(
                "session.organization_id is required".into(),
            ));
        }
        let org = OrganizationId::from(org);
        let user = config.session.user_id.as_deref().map(UserId::from);

        let registry = Arc::new(ChannelRegistry::new(
            adapters.store.clone(),
            adapters.functions.clone(),
            config.messaging.probe_timeout(),
        ));
        let resolver = ConversationResolver::new(
            adapters.store.clone(),
            registry.clone(),
            config.messaging.default_country_code.clone(),
        );
        let sync = Arc::new(MessageSync::new(adapters.store.clone(), org.clone()));
        let policy = MediaPolicy::from(&config.media);
        let dispatcher = SendDispatcher::new(
            org.clone(),
            adapters.store.clone(),
            adapters.functions.clone(),
            adapters.storage.clone(),
            Arc::new(AdmissionController::new(config.messaging.send_cooldown())),
            sync.clone(),
            policy.clone(),
        );

        debug!(org = %org, "messaging session created");
        Ok(Self {
            org,
            user,
            poll_interval: config.messaging.poll_interval(),
            feed: adapters.feed,
            capture: adapters.capture,
            registry,
            resolver,
            sync,
            dispatcher,
            inbox: Inbox::new(adapters.store),
            policy,
            active: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    fn active_slot(&self) -> MutexGuard<'_, Option<ActiveThread>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn organization(&self) -> &OrganizationId {
        &self.org
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn board(&self) -> &ConnectivityBoard {
        self.registry.board()
    }

    pub fn sync(&self) -> &Arc<MessageSync> {
        &self.sync
    }

    pub fn policy(&self) -> &MediaPolicy {
        &self.policy
    }

    /// Instances of the organization, optionally probed concurrently.
    pub async fn instances(&self, verify: bool) -> Result<Vec<ChannelInstance>, ParleyError> {
        let mut instances = self.registry.list_instances(&self.org).await?;
        if verify {
            self.registry.verify_all(&mut instances).await;
        }
        Ok(instances)
    }

    pub async fn inbox(&self, filter: Option<&str>) -> Result<InboxView, ParleyError> {
        self.inbox.list(&self.org, filter).await
    }

    /// Opens the counterparty's thread: resolves siblings, probes their
    /// instances concurrently and activates the requested or most recent one.
    pub async fn open(
        &self,
        counterparty: &str,
        requested: Option<&InstanceId>,
    ) -> Result<ActiveThread, ParleyError> {
        let siblings = self.resolver.resolve_siblings(&self.org, counterparty).await?;
        let Some(conversation) = siblings.select_active(requested).cloned() else {
            return Err(ParleyError::NotFound {
                entity: "conversation",
                id: siblings.address().to_string(),
            });
        };

        let mut instances: Vec<ChannelInstance> = self
            .registry
            .list_instances(&self.org)
            .await?
            .into_iter()
            .filter(|i| siblings.instance_ids().any(|id| id == &i.id))
            .collect();
        self.registry.verify_all(&mut instances).await;

        let thread = ActiveThread {
            siblings,
            conversation,
            instances,
        };
        self.sync.activate(&thread.conversation);
        *self.active_slot() = Some(thread.clone());
        info!(
            conversation = %thread.conversation.id,
            siblings = thread.siblings.len(),
            "thread opened"
        );
        Ok(thread)
    }

    /// Starts (or resumes) the conversation with `counterparty` on `instance`
    /// and opens it.
    pub async fn start(
        &self,
        counterparty: &str,
        instance: &InstanceId,
    ) -> Result<ActiveThread, ParleyError> {
        let conversation = self
            .resolver
            .start_conversation(&self.org, counterparty, instance, self.user.as_ref())
            .await?;
        self.open(&conversation.counterparty_address, Some(instance))
            .await
    }

    /// Switches the visible thread to the sibling on `instance`.
    pub fn switch_instance(&self, instance: &InstanceId) -> Result<Conversation, ParleyError> {
        let conversation = {
            let mut slot = self.active_slot();
            let thread = slot.as_mut().ok_or_else(no_active_thread)?;
            let target = thread.siblings.target(instance)?.clone();
            thread.conversation = target.clone();
            target
        };
        self.sync.activate(&conversation);
        Ok(conversation)
    }

    pub fn active(&self) -> Option<ActiveThread> {
        self.active_slot().clone()
    }

    /// Switcher rows for the active thread; empty with a single sibling.
    pub fn switcher(&self) -> Vec<SwitcherEntry> {
        let slot = self.active_slot();
        match slot.as_ref() {
            Some(thread) => thread
                .siblings
                .switcher(&thread.instances, &self.board().snapshot()),
            None => Vec::new(),
        }
    }

    fn active_conversation(&self) -> Result<Conversation, ParleyError> {
        self.active_slot()
            .as_ref()
            .map(|t| t.conversation.clone())
            .ok_or_else(no_active_thread)
    }

    fn record_activity(&self, conversation: &Conversation) {
        let mut slot = self.active_slot();
        if let Some(thread) = slot.as_mut() {
            let mut bumped = conversation.clone();
            bumped.last_activity_at = Utc::now();
            if thread.conversation.id == bumped.id {
                thread.conversation = bumped.clone();
            }
            thread.siblings.refresh_member(bumped);
        }
    }

    /// Sends text on the active conversation's instance. Empty text and a
    /// running cooldown are rejected before the instance is probed.
    pub async fn send_text(&self, text: &str) -> Result<Message, ParleyError> {
        let conversation = self.active_conversation()?;
        validate_text(text)?;
        self.dispatcher.precheck()?;
        self.registry
            .ensure_sendable(&self.org, &conversation.channel_instance_id)
            .await?;
        let message = self
            .dispatcher
            .send_text(&conversation, text, self.user.as_ref())
            .await?;
        self.record_activity(&conversation);
        Ok(message)
    }

    pub async fn send_media(&self, media: OutboundMedia) -> Result<Message, ParleyError> {
        self.policy.validate(&media)?;
        let conversation = self.active_conversation()?;
        self.dispatcher.precheck()?;
        self.registry
            .ensure_sendable(&self.org, &conversation.channel_instance_id)
            .await?;
        let message = self
            .dispatcher
            .send_media(&conversation, media, self.user.as_ref())
            .await?;
        self.record_activity(&conversation);
        Ok(message)
    }

    pub async fn send_audio(&self, audio: CapturedAudio) -> Result<Message, ParleyError> {
        self.send_media(audio.into_media()).await
    }

    pub fn recorder(&self) -> Result<AudioRecorder, ParleyError> {
        let device = self
            .capture
            .clone()
            .ok_or_else(|| ParleyError::Capture("no audio capture device available".into()))?;
        Ok(AudioRecorder::new(device, self.policy.clone()))
    }

    /// Starts the background sync loop. Without a change feed, or when
    /// subscribing fails, it polls only.
    pub async fn spawn_sync(&self) -> JoinHandle<()> {
        let feed = match &self.feed {
            Some(feed) => match feed.subscribe(&self.org).await {
                Ok(rx) => Some(rx),
                Err(e) => {
                    warn!(error = %e, "change feed unavailable, polling only");
                    None
                }
            },
            None => None,
        };
        tokio::spawn(
            self.sync
                .clone()
                .run(self.poll_interval, feed, self.cancel.child_token()),
        )
    }

    /// Stops background work started by this session.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.sync.deactivate();
    }
}

fn no_active_thread() -> ParleyError {
    ParleyError::NotFound {
        entity: "active conversation",
        id: "-".into(),
    }
}
