// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation list with free-text filtering.

use std::sync::Arc;

use parley_core::types::Conversation;
use parley_core::{DataStore, OrganizationId, ParleyError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxView {
    pub conversations: Vec<Conversation>,
    pub total_unread: u64,
}

pub struct Inbox {
    store: Arc<dyn DataStore>,
}

/// Whether `conversation` matches a free-text `query`.
///
/// Names match case-insensitively; when the query contains digits, those
/// digits are also matched against the address so `(11) 99999-8888` finds
/// `5511999998888`.
pub fn matches_filter(conversation: &Conversation, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    if conversation
        .counterparty_name
        .as_deref()
        .is_some_and(|name| name.to_lowercase().contains(&needle))
    {
        return true;
    }
    if conversation.counterparty_address.contains(query) {
        return true;
    }
    let digits: String = query.chars().filter(char::is_ascii_digit).collect();
    !digits.is_empty() && conversation.counterparty_address.contains(&digits)
}

impl Inbox {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Conversations of the organization, most recent first, optionally filtered.
    pub async fn list(
        &self,
        org: &OrganizationId,
        filter: Option<&str>,
    ) -> Result<InboxView, ParleyError> {
        let mut conversations = self.store.list_conversations(org).await?;
        if let Some(query) = filter {
            conversations.retain(|c| matches_filter(c, query));
        }
        conversations.sort_by(|a, b| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        let total_unread = conversations.iter().map(|c| u64::from(c.unread_count)).sum();
        debug!(org = %org, count = conversations.len(), total_unread, "inbox listed");
        Ok(InboxView {
            conversations,
            total_unread,
        })
    }
}
