// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed table rows and their conversion to domain types.

use chrono::{DateTime, Utc};
use parley_core::types::{
    ChannelInstance, ConnectivityStatus, Conversation, ConversationId, DeliveryStatus,
    InstanceId, Message, MessageDirection, MessageId, MessageKind, OrganizationId, UserId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceRow {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_connected: bool,
}

impl From<InstanceRow> for ChannelInstance {
    fn from(row: InstanceRow) -> Self {
        ChannelInstance {
            id: InstanceId(row.id),
            organization_id: OrganizationId(row.organization_id),
            label: row.name,
            address: row.phone_number.unwrap_or_default(),
            declared_connected: row.is_connected,
            verified: ConnectivityStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub organization_id: String,
    pub contact_phone: String,
    pub contact_name: Option<String>,
    pub instance_id: String,
    pub customer_id: Option<String>,
    pub assigned_to: Option<String>,
    pub last_message_at: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub is_group: bool,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: ConversationId(row.id),
            organization_id: OrganizationId(row.organization_id),
            counterparty_address: row.contact_phone,
            counterparty_name: row.contact_name,
            channel_instance_id: InstanceId(row.instance_id),
            customer_id: row.customer_id,
            assigned_user_id: row.assigned_to.map(UserId),
            last_activity_at: row.last_message_at,
            unread_count: row.unread_count,
            is_group: row.is_group,
        }
    }
}

impl From<&Conversation> for ConversationRow {
    fn from(c: &Conversation) -> Self {
        ConversationRow {
            id: c.id.0.clone(),
            organization_id: c.organization_id.0.clone(),
            contact_phone: c.counterparty_address.clone(),
            contact_name: c.counterparty_name.clone(),
            instance_id: c.channel_instance_id.0.clone(),
            customer_id: c.customer_id.clone(),
            assigned_to: c.assigned_user_id.as_ref().map(|u| u.0.clone()),
            last_message_at: c.last_activity_at,
            unread_count: c.unread_count,
            is_group: c.is_group,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub organization_id: String,
    pub conversation_id: String,
    pub direction: MessageDirection,
    pub message_type: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub sent_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn from_message(org: &OrganizationId, m: &Message) -> Self {
        MessageRow {
            id: m.id.0.clone(),
            organization_id: org.0.clone(),
            conversation_id: m.conversation_id.0.clone(),
            direction: m.direction,
            message_type: m.kind,
            content: m.text.clone(),
            media_url: m.media_path.clone(),
            status: m.status,
            error_message: m.failure_detail.clone(),
            sent_by: m.sender_user_id.as_ref().map(|u| u.0.clone()),
            created_at: m.created_at,
        }
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: MessageId(row.id),
            conversation_id: ConversationId(row.conversation_id),
            direction: row.direction,
            kind: row.message_type,
            text: row.content,
            media_path: row.media_url,
            status: row.status,
            failure_detail: row.error_message,
            sender_user_id: row.sent_by.map(UserId),
            created_at: row.created_at,
        }
    }
}

/// Columns a message update may touch.
#[derive(Debug, Serialize)]
pub struct MessagePatch<'a> {
    pub status: DeliveryStatus,
    pub error_message: Option<&'a str>,
    pub media_url: Option<&'a str>,
}

impl<'a> From<&'a Message> for MessagePatch<'a> {
    fn from(m: &'a Message) -> Self {
        MessagePatch {
            status: m.status,
            error_message: m.failure_detail.as_deref(),
            media_url: m.media_path.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_row_decodes_backend_json() {
        let json = serde_json::json!({
            "id": "m1",
            "organization_id": "org-1",
            "conversation_id": "c1",
            "direction": "outbound",
            "message_type": "audio",
            "content": null,
            "media_url": "org-1/c1/voice.ogg",
            "status": "delivered",
            "error_message": null,
            "sent_by": "u1",
            "created_at": "2026-03-01T12:00:00Z"
        });
        let row: MessageRow = serde_json::from_value(json).unwrap();
        let msg = Message::from(row);
        assert_eq!(msg.kind, MessageKind::Audio);
        assert_eq!(msg.status, DeliveryStatus::Delivered);
        assert_eq!(msg.media_path.as_deref(), Some("org-1/c1/voice.ogg"));
        assert_eq!(msg.sender_user_id, Some(UserId::from("u1")));
    }

    #[test]
    fn instance_row_starts_unverified() {
        let row: InstanceRow = serde_json::from_value(serde_json::json!({
            "id": "i1",
            "organization_id": "org-1",
            "name": "Sales",
            "phone_number": "5511999990000",
            "is_connected": true
        }))
        .unwrap();
        let inst = ChannelInstance::from(row);
        assert!(inst.declared_connected);
        assert_eq!(inst.verified, ConnectivityStatus::Unknown);
    }
}
