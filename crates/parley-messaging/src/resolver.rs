// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Counterparty address to conversation resolution.
//!
//! One counterparty may talk to the organization through several instances.
//! Each (address, instance) pair is its own conversation; these siblings are
//! listed together and never merged.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parley_core::types::{ChannelInstance, Conversation};
use parley_core::{
    ConversationId, DataStore, InstanceId, OrganizationId, ParleyError, UserId,
};
use tracing::{debug, info};

use crate::phone::normalize_address;
use crate::registry::{ChannelRegistry, ProbeState};

/// Conversations for one counterparty, most recently active first.
///
/// Equal activity timestamps fall back to channel instance id ascending so
/// the order is total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingSet {
    address: String,
    conversations: Vec<Conversation>,
}

/// One row of the channel switcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitcherEntry {
    pub conversation_id: ConversationId,
    pub instance_id: InstanceId,
    pub label: String,
    pub state: ProbeState,
}

impl SiblingSet {
    pub fn new(address: impl Into<String>, mut conversations: Vec<Conversation>) -> Self {
        conversations.sort_by(|a, b| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then_with(|| a.channel_instance_id.cmp(&b.channel_instance_id))
        });
        Self {
            address: address.into(),
            conversations,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn into_vec(self) -> Vec<Conversation> {
        self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = &InstanceId> {
        self.conversations.iter().map(|c| &c.channel_instance_id)
    }

    /// The sibling on `requested` if there is one, else the most recently active.
    pub fn select_active(&self, requested: Option<&InstanceId>) -> Option<&Conversation> {
        requested
            .and_then(|id| {
                self.conversations
                    .iter()
                    .find(|c| &c.channel_instance_id == id)
            })
            .or_else(|| self.conversations.first())
    }

    /// The sibling on `instance`, refusing instances outside this set.
    pub fn target(&self, instance: &InstanceId) -> Result<&Conversation, ParleyError> {
        self.conversations
            .iter()
            .find(|c| &c.channel_instance_id == instance)
            .ok_or_else(|| ParleyError::NotFound {
                entity: "conversation on instance",
                id: format!("{}@{instance}", self.address),
            })
    }

    /// Switcher rows, empty unless there is more than one sibling.
    pub fn switcher(
        &self,
        instances: &[ChannelInstance],
        states: &BTreeMap<InstanceId, ProbeState>,
    ) -> Vec<SwitcherEntry> {
        if self.conversations.len() < 2 {
            return Vec::new();
        }
        self.conversations
            .iter()
            .map(|c| {
                let id = &c.channel_instance_id;
                SwitcherEntry {
                    conversation_id: c.id.clone(),
                    instance_id: id.clone(),
                    label: instances
                        .iter()
                        .find(|i| &i.id == id)
                        .map(|i| i.label.clone())
                        .unwrap_or_else(|| id.to_string()),
                    state: states
                        .get(id)
                        .copied()
                        .unwrap_or(ProbeState::Checking),
                }
            })
            .collect()
    }

    /// Replaces one sibling after a local update (e.g. a send bumped its activity).
    pub(crate) fn refresh_member(&mut self, updated: Conversation) {
        if let Some(slot) = self.conversations.iter_mut().find(|c| c.id == updated.id) {
            *slot = updated;
        } else {
            self.conversations.push(updated);
        }
        let conversations = std::mem::take(&mut self.conversations);
        *self = SiblingSet::new(std::mem::take(&mut self.address), conversations);
    }
}

pub struct ConversationResolver {
    store: Arc<dyn DataStore>,
    registry: Arc<ChannelRegistry>,
    country_code: String,
}

impl ConversationResolver {
    pub fn new(
        store: Arc<dyn DataStore>,
        registry: Arc<ChannelRegistry>,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            country_code: country_code.into(),
        }
    }

    pub fn normalize(&self, raw: &str) -> Result<String, ParleyError> {
        normalize_address(raw, &self.country_code)
    }

    /// Every conversation with the counterparty across the organization's instances.
    pub async fn resolve_siblings(
        &self,
        org: &OrganizationId,
        counterparty: &str,
    ) -> Result<SiblingSet, ParleyError> {
        let address = self.normalize(counterparty)?;
        let found = self.store.find_conversations_by_address(org, &address).await?;
        debug!(org = %org, address = %address, siblings = found.len(), "siblings resolved");
        Ok(SiblingSet::new(address, found))
    }

    /// Reuses the conversation on the same instance, otherwise creates a new
    /// sibling assigned to the initiating user. A disconnected instance refuses.
    pub async fn start_conversation(
        &self,
        org: &OrganizationId,
        counterparty: &str,
        instance_id: &InstanceId,
        initiating_user: Option<&UserId>,
    ) -> Result<Conversation, ParleyError> {
        let address = self.normalize(counterparty)?;
        self.registry.ensure_sendable(org, instance_id).await?;

        let existing = self.store.find_conversations_by_address(org, &address).await?;
        if let Some(conversation) = existing
            .into_iter()
            .find(|c| &c.channel_instance_id == instance_id)
        {
            debug!(conversation = %conversation.id, "reusing conversation on same instance");
            return Ok(conversation);
        }

        let conversation = Conversation {
            id: ConversationId(uuid::Uuid::new_v4().to_string()),
            organization_id: org.clone(),
            counterparty_address: address,
            counterparty_name: None,
            channel_instance_id: instance_id.clone(),
            customer_id: None,
            assigned_user_id: initiating_user.cloned(),
            last_activity_at: Utc::now(),
            unread_count: 0,
            is_group: false,
        };
        self.store.insert_conversation(&conversation).await?;
        info!(
            conversation = %conversation.id,
            instance = %instance_id,
            address = %conversation.counterparty_address,
            "conversation created"
        );
        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use parley_core::ConnectivityStatus;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    fn conv(id: &str, instance: &str, activity: i64) -> Conversation {
        Conversation {
            id: ConversationId::from(id),
            organization_id: OrganizationId::from("org-1"),
            counterparty_address: "5511999998888".into(),
            counterparty_name: Some("Ana".into()),
            channel_instance_id: InstanceId::from(instance),
            customer_id: None,
            assigned_user_id: None,
            last_activity_at: at(activity),
            unread_count: 0,
            is_group: false,
        }
    }

    fn inst(id: &str, label: &str) -> ChannelInstance {
        ChannelInstance {
            id: InstanceId::from(id),
            organization_id: OrganizationId::from("org-1"),
            label: label.into(),
            address: String::new(),
            declared_connected: true,
            verified: ConnectivityStatus::Unknown,
        }
    }

    #[test]
    fn siblings_order_by_recency_then_instance() {
        let set = SiblingSet::new(
            "5511999998888",
            vec![conv("c1", "b", 10), conv("c2", "c", 20), conv("c3", "a", 10)],
        );
        let order: Vec<&str> = set.conversations().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["c2", "c3", "c1"]);
    }

    #[test]
    fn select_active_prefers_requested_instance() {
        let set = SiblingSet::new("x", vec![conv("c1", "a", 10), conv("c2", "b", 20)]);
        assert_eq!(
            set.select_active(Some(&InstanceId::from("a"))).unwrap().id,
            ConversationId::from("c1")
        );
        assert_eq!(
            set.select_active(Some(&InstanceId::from("zzz"))).unwrap().id,
            ConversationId::from("c2")
        );
        assert_eq!(set.select_active(None).unwrap().id, ConversationId::from("c2"));
    }

    #[test]
    fn switcher_hidden_for_single_sibling() {
        let set = SiblingSet::new("x", vec![conv("c1", "a", 10)]);
        assert!(set.switcher(&[inst("a", "Sales")], &BTreeMap::new()).is_empty());
    }

    #[test]
    fn switcher_lists_every_sibling_with_state() {
        let set = SiblingSet::new("x", vec![conv("c1", "a", 10), conv("c2", "b", 20)]);
        let mut states = BTreeMap::new();
        states.insert(
            InstanceId::from("a"),
            ProbeState::Verified(ConnectivityStatus::Disconnected),
        );
        let rows = set.switcher(&[inst("a", "Sales"), inst("b", "Support")], &states);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "Support");
        assert_eq!(rows[0].state, ProbeState::Checking);
        assert_eq!(
            rows[1].state,
            ProbeState::Verified(ConnectivityStatus::Disconnected)
        );
    }

    #[test]
    fn target_refuses_foreign_instance() {
        let set = SiblingSet::new("x", vec![conv("c1", "a", 10)]);
        assert!(set.target(&InstanceId::from("a")).is_ok());
        assert!(matches!(
            set.target(&InstanceId::from("b")),
            Err(ParleyError::NotFound { .. })
        ));
    }

    #[test]
    fn refresh_member_reorders() {
        let mut set = SiblingSet::new("x", vec![conv("c1", "a", 10), conv("c2", "b", 20)]);
        set.refresh_member(conv("c1", "a", 30));
        assert_eq!(set.conversations()[0].id, ConversationId::from("c1"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.address(), "x");
    }
}
