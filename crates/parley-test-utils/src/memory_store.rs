// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory data store and change feed for deterministic tests.
//!
//! `MemoryStore` implements both [`DataStore`] and [`ChangeFeed`]. Inserted
//! messages are announced to every subscriber, the store can be switched
//! unavailable, and a single `list_messages` call can be held open to stage
//! overlapping fetches.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::types::{
    AdapterType, ChangeEvent, ChangeKind, ChangeTable, ChannelInstance, Conversation,
    ConversationId, DeliveryStatus, HealthStatus, InstanceId, Message, MessageId,
    OrganizationId,
};
use parley_core::{ChangeFeed, DataStore, ParleyError, PluginAdapter};
use tokio::sync::{mpsc, watch, Notify};

#[derive(Default)]
struct State {
    instances: Vec<ChannelInstance>,
    conversations: Vec<Conversation>,
    messages: Vec<(OrganizationId, Message)>,
}

/// Holds one `list_messages` call until released.
pub struct FetchGate {
    entered: Notify,
    released: watch::Sender<bool>,
}

impl FetchGate {
    fn new() -> Self {
        let (released, _rx) = watch::channel(false);
        Self {
            entered: Notify::new(),
            released,
        }
    }

    pub fn release(&self) {
        self.released.send_replace(true);
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    mark_read_fails: AtomicBool,
    mark_read_calls: AtomicUsize,
    list_message_calls: AtomicUsize,
    subscribers: Mutex<Vec<(OrganizationId, mpsc::Sender<ChangeEvent>)>>,
    armed_gate: Mutex<Option<Arc<FetchGate>>>,
    last_gate: Mutex<Option<Arc<FetchGate>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            unavailable: AtomicBool::new(false),
            mark_read_fails: AtomicBool::new(false),
            mark_read_calls: AtomicUsize::new(0),
            list_message_calls: AtomicUsize::new(0),
            subscribers: Mutex::new(Vec::new()),
            armed_gate: Mutex::new(None),
            last_gate: Mutex::new(None),
        }
    }

    pub fn add_instance(&self, instance: ChannelInstance) {
        lock(&self.state).instances.push(instance);
    }

    pub fn add_conversation(&self, conversation: Conversation) {
        lock(&self.state).conversations.push(conversation);
    }

    /// Stores a message directly and announces it like an ingested message.
    pub fn add_message(&self, org: &OrganizationId, message: Message) {
        let id = message.id.to_string();
        lock(&self.state).messages.push((org.clone(), message));
        self.publish(ChangeEvent {
            organization_id: org.clone(),
            table: ChangeTable::Messages,
            kind: ChangeKind::Insert,
            record_id: Some(id),
        });
    }

    /// Applies a provider receipt to a stored message, the way ingestion
    /// would. Returns `false` if the message is unknown or the move regresses.
    pub fn apply_receipt(&self, id: &MessageId, status: DeliveryStatus) -> bool {
        let org = {
            let mut state = lock(&self.state);
            let Some((org, message)) = state.messages.iter_mut().find(|(_, m)| &m.id == id)
            else {
                return false;
            };
            if !message.advance(status) {
                return false;
            }
            org.clone()
        };
        self.publish(ChangeEvent {
            organization_id: org,
            table: ChangeTable::Messages,
            kind: ChangeKind::Update,
            record_id: Some(id.to_string()),
        });
        true
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        lock(&self.state).conversations.clone()
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<Conversation> {
        lock(&self.state)
            .conversations
            .iter()
            .find(|c| &c.id == id)
            .cloned()
    }

    /// Every stored message of one conversation, insertion order.
    pub fn messages(&self, conversation: &ConversationId) -> Vec<Message> {
        lock(&self.state)
            .messages
            .iter()
            .filter(|(_, m)| &m.conversation_id == conversation)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn message_count(&self) -> usize {
        lock(&self.state).messages.len()
    }

    /// Makes every call fail with `DataUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes only `mark_conversation_read` fail; calls are still counted.
    pub fn fail_mark_read(&self, fail: bool) {
        self.mark_read_fails.store(fail, Ordering::SeqCst);
    }

    pub fn mark_read_calls(&self) -> usize {
        self.mark_read_calls.load(Ordering::SeqCst)
    }

    pub fn list_message_calls(&self) -> usize {
        self.list_message_calls.load(Ordering::SeqCst)
    }

    /// Announces a change to every open subscription.
    pub fn publish(&self, event: ChangeEvent) {
        lock(&self.subscribers).retain(|(org, tx)| {
            if tx.is_closed() {
                return false;
            }
            if org != &event.organization_id {
                return true;
            }
            tx.try_send(event.clone()).is_ok()
        });
    }

    /// Drops every subscription, closing the receivers.
    pub fn close_feeds(&self) {
        lock(&self.subscribers).clear();
    }

    /// The next `list_messages` call blocks until the returned gate is released.
    pub fn hold_list_messages(&self) -> Arc<FetchGate> {
        let gate = Arc::new(FetchGate::new());
        *lock(&self.armed_gate) = Some(gate.clone());
        *lock(&self.last_gate) = Some(gate.clone());
        gate
    }

    /// Waits until the held `list_messages` call has started.
    pub async fn wait_for_held_fetch(&self) {
        let gate = lock(&self.last_gate).clone();
        if let Some(gate) = gate {
            gate.entered.notified().await;
        }
    }

    fn check(&self) -> Result<(), ParleyError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ParleyError::DataUnavailable {
                message: "memory store switched unavailable".into(),
                source: None,
            });
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::DataStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Ok(HealthStatus::Unhealthy("switched unavailable".into()));
        }
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn list_instances(
        &self,
        org: &OrganizationId,
    ) -> Result<Vec<ChannelInstance>, ParleyError> {
        self.check()?;
        Ok(lock(&self.state)
            .instances
            .iter()
            .filter(|i| &i.organization_id == org)
            .cloned()
            .collect())
    }

    async fn get_instance(
        &self,
        org: &OrganizationId,
        id: &InstanceId,
    ) -> Result<Option<ChannelInstance>, ParleyError> {
        self.check()?;
        Ok(lock(&self.state)
            .instances
            .iter()
            .find(|i| &i.organization_id == org && &i.id == id)
            .cloned())
    }

    async fn list_conversations(
        &self,
        org: &OrganizationId,
    ) -> Result<Vec<Conversation>, ParleyError> {
        self.check()?;
        Ok(lock(&self.state)
            .conversations
            .iter()
            .filter(|c| &c.organization_id == org)
            .cloned()
            .collect())
    }

    async fn find_conversations_by_address(
        &self,
        org: &OrganizationId,
        address: &str,
    ) -> Result<Vec<Conversation>, ParleyError> {
        self.check()?;
        Ok(lock(&self.state)
            .conversations
            .iter()
            .filter(|c| &c.organization_id == org && c.counterparty_address == address)
            .cloned()
            .collect())
    }

    async fn get_conversation(
        &self,
        org: &OrganizationId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ParleyError> {
        self.check()?;
        Ok(lock(&self.state)
            .conversations
            .iter()
            .find(|c| &c.organization_id == org && &c.id == id)
            .cloned())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), ParleyError> {
        self.check()?;
        let mut state = lock(&self.state);
        let duplicate = state.conversations.iter().any(|c| {
            c.organization_id == conversation.organization_id
                && c.counterparty_address == conversation.counterparty_address
                && c.channel_instance_id == conversation.channel_instance_id
        });
        if duplicate {
            return Err(ParleyError::DataUnavailable {
                message: "duplicate conversation for address and instance".into(),
                source: None,
            });
        }
        state.conversations.push(conversation.clone());
        Ok(())
    }

    async fn touch_conversation(
        &self,
        org: &OrganizationId,
        id: &ConversationId,
        at: DateTime<Utc>,
    ) -> Result<(), ParleyError> {
        self.check()?;
        if let Some(c) = lock(&self.state)
            .conversations
            .iter_mut()
            .find(|c| &c.organization_id == org && &c.id == id)
        {
            c.last_activity_at = at;
        }
        Ok(())
    }

    async fn mark_conversation_read(
        &self,
        org: &OrganizationId,
        id: &ConversationId,
    ) -> Result<(), ParleyError> {
        self.check()?;
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        if self.mark_read_fails.load(Ordering::SeqCst) {
            return Err(ParleyError::DataUnavailable {
                message: "mark read refused".into(),
                source: None,
            });
        }
        if let Some(c) = lock(&self.state)
            .conversations
            .iter_mut()
            .find(|c| &c.organization_id == org && &c.id == id)
        {
            c.unread_count = 0;
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        org: &OrganizationId,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ParleyError> {
        self.check()?;
        self.list_message_calls.fetch_add(1, Ordering::SeqCst);

        let gate = lock(&self.armed_gate).take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            let mut released = gate.released.subscribe();
            let _ = released.wait_for(|open| *open).await;
        }

        let mut messages: Vec<Message> = lock(&self.state)
            .messages
            .iter()
            .filter(|(o, m)| o == org && &m.conversation_id == conversation)
            .map(|(_, m)| m.clone())
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn insert_message(
        &self,
        org: &OrganizationId,
        message: &Message,
    ) -> Result<(), ParleyError> {
        self.check()?;
        self.add_message(org, message.clone());
        Ok(())
    }

    async fn update_message(
        &self,
        org: &OrganizationId,
        message: &Message,
    ) -> Result<(), ParleyError> {
        self.check()?;
        let mut state = lock(&self.state);
        let slot = state
            .messages
            .iter_mut()
            .find(|(o, m)| o == org && m.id == message.id)
            .ok_or_else(|| ParleyError::NotFound {
                entity: "message",
                id: message.id.to_string(),
            })?;
        if !slot.1.status.accepts_write_of(message.status) {
            return Ok(());
        }
        slot.1 = message.clone();
        drop(state);
        self.publish(ChangeEvent {
            organization_id: org.clone(),
            table: ChangeTable::Messages,
            kind: ChangeKind::Update,
            record_id: Some(message.id.to_string()),
        });
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(
        &self,
        org: &OrganizationId,
    ) -> Result<mpsc::Receiver<ChangeEvent>, ParleyError> {
        self.check()?;
        let (tx, rx) = mpsc::channel(64);
        lock(&self.subscribers).push((org.clone(), tx));
        Ok(rx)
    }
}
