// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote data store and change-notification traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChangeEvent, ChannelInstance, Conversation, ConversationId, InstanceId, Message,
    OrganizationId,
};

/// CRUD access to the tables the messaging pipeline depends on.
///
/// Every query is scoped by organization. Failures to reach the store are
/// reported as [`ParleyError::DataUnavailable`].
#[async_trait]
pub trait DataStore: PluginAdapter {
    /// All non-deleted channel instances of the organization.
    async fn list_instances(
        &self,
        org: &OrganizationId,
    ) -> Result<Vec<ChannelInstance>, ParleyError>;

    async fn get_instance(
        &self,
        org: &OrganizationId,
        id: &InstanceId,
    ) -> Result<Option<ChannelInstance>, ParleyError>;

    /// All conversations of the organization, any order.
    async fn list_conversations(
        &self,
        org: &OrganizationId,
    ) -> Result<Vec<Conversation>, ParleyError>;

    /// Conversations with the given canonical counterparty address, any instance.
    async fn find_conversations_by_address(
        &self,
        org: &OrganizationId,
        address: &str,
    ) -> Result<Vec<Conversation>, ParleyError>;

    async fn get_conversation(
        &self,
        org: &OrganizationId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ParleyError>;

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), ParleyError>;

    /// Bumps the last-activity timestamp of one conversation.
    async fn touch_conversation(
        &self,
        org: &OrganizationId,
        id: &ConversationId,
        at: DateTime<Utc>,
    ) -> Result<(), ParleyError>;

    /// Resets the unread counter of one conversation.
    async fn mark_conversation_read(
        &self,
        org: &OrganizationId,
        id: &ConversationId,
    ) -> Result<(), ParleyError>;

    /// Messages of a conversation ordered by creation time ascending.
    async fn list_messages(
        &self,
        org: &OrganizationId,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ParleyError>;

    async fn insert_message(
        &self,
        org: &OrganizationId,
        message: &Message,
    ) -> Result<(), ParleyError>;

    /// Persists status, failure detail and media path of an existing message.
    ///
    /// The write only applies while the stored status accepts it (see
    /// [`DeliveryStatus::accepts_write_of`]); a row already moved further by
    /// a receipt is left as it is and the call still succeeds.
    async fn update_message(
        &self,
        org: &OrganizationId,
        message: &Message,
    ) -> Result<(), ParleyError>;
}

/// Push path: row-level change notifications for one organization.
#[async_trait]
pub trait ChangeFeed: PluginAdapter {
    /// Opens a subscription. The receiver closes when the feed drops.
    async fn subscribe(
        &self,
        org: &OrganizationId,
    ) -> Result<mpsc::Receiver<ChangeEvent>, ParleyError>;
}
