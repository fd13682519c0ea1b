// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the adapters and the messaging pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Tenant scope for every query and function call.
    OrganizationId
);
string_id!(
    /// Identifier of a channel instance (one messaging account bound to one number).
    InstanceId
);
string_id!(
    /// Identifier of a conversation.
    ConversationId
);
string_id!(
    /// Identifier of a message.
    MessageId
);
string_id!(
    /// Identifier of an internal operator.
    UserId
);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of backend adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    DataStore,
    ChangeFeed,
    Functions,
    ObjectStorage,
}

// --- Channel instances ---

/// Connectivity verdict for a channel instance.
///
/// `Unknown` is distinct from `Disconnected`: a probe that errors or times out
/// yields `Unknown`, and `Unknown` never blocks a send.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectivityStatus {
    Connected,
    Disconnected,
    #[default]
    Unknown,
}

impl ConnectivityStatus {
    /// Only an explicit negative verdict blocks sending.
    pub fn allows_send(self) -> bool {
        self != ConnectivityStatus::Disconnected
    }
}

/// One messaging-account credential bound to one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInstance {
    pub id: InstanceId,
    pub organization_id: OrganizationId,
    pub label: String,
    /// Declared phone number of the account.
    pub address: String,
    /// Connectivity as last persisted by the admin screens.
    pub declared_connected: bool,
    /// Runtime verdict; never persisted.
    #[serde(skip)]
    pub verified: ConnectivityStatus,
}

// --- Conversations ---

/// The thread between the organization and one counterparty on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub organization_id: OrganizationId,
    /// Canonical counterparty address (digits only, country code included).
    pub counterparty_address: String,
    pub counterparty_name: Option<String>,
    pub channel_instance_id: InstanceId,
    pub customer_id: Option<String>,
    pub assigned_user_id: Option<UserId>,
    pub last_activity_at: DateTime<Utc>,
    pub unread_count: u32,
    pub is_group: bool,
}

// --- Messages ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Video,
    Document,
    Sticker,
}

impl MessageKind {
    pub fn is_media(self) -> bool {
        self != MessageKind::Text
    }
}

/// Delivery status of a message.
///
/// Transitions only move forward: `sending -> sent -> delivered -> read`, or
/// to `failed` from any non-terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Sending,
        DeliveryStatus::Sent,
        DeliveryStatus::Delivered,
        DeliveryStatus::Read,
        DeliveryStatus::Failed,
    ];

    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Sending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Delivered => 2,
            DeliveryStatus::Read => 3,
            DeliveryStatus::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Read | DeliveryStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_advance_to(self, next: DeliveryStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == DeliveryStatus::Failed || next.rank() > self.rank()
    }

    /// Whether a stored row in `self` may be overwritten with `next`.
    /// Rewriting the same status is allowed so other columns can change.
    pub fn accepts_write_of(self, next: DeliveryStatus) -> bool {
        self == next || self.can_advance_to(next)
    }

    /// Stored statuses that a write of `self` may overwrite.
    pub fn overwritable_by(self) -> impl Iterator<Item = DeliveryStatus> {
        Self::ALL
            .into_iter()
            .filter(move |stored| stored.accepts_write_of(self))
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub direction: MessageDirection,
    pub kind: MessageKind,
    /// Text body for `text`, optional caption for media kinds.
    pub text: Option<String>,
    /// Durable storage path of the media object; never raw bytes.
    pub media_path: Option<String>,
    pub status: DeliveryStatus,
    pub failure_detail: Option<String>,
    pub sender_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Optimistic outbound message in `sending` state.
    pub fn outbound(
        conversation_id: ConversationId,
        kind: MessageKind,
        text: Option<String>,
        sender: Option<UserId>,
    ) -> Self {
        Self {
            id: MessageId(uuid::Uuid::new_v4().to_string()),
            conversation_id,
            direction: MessageDirection::Outbound,
            kind,
            text,
            media_path: None,
            status: DeliveryStatus::Sending,
            failure_detail: None,
            sender_user_id: sender,
            created_at: Utc::now(),
        }
    }

    /// Moves the status forward. Returns `false` and leaves the message
    /// untouched if the transition would regress.
    pub fn advance(&mut self, next: DeliveryStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// Marks the message failed. The detail is never left empty.
    pub fn fail(&mut self, detail: impl Into<String>) -> bool {
        if !self.advance(DeliveryStatus::Failed) {
            return false;
        }
        let detail = detail.into();
        self.failure_detail = Some(if detail.trim().is_empty() {
            "unknown failure".to_string()
        } else {
            detail
        });
        true
    }

    /// Checks the payload and status invariants of a stored message.
    pub fn is_well_formed(&self) -> bool {
        let payload_ok = match self.kind {
            MessageKind::Text => {
                self.media_path.is_none()
                    && self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
            }
            // Optimistic media rows get their path once the upload lands.
            _ => {
                self.media_path.is_some()
                    || matches!(self.status, DeliveryStatus::Sending | DeliveryStatus::Failed)
            }
        };
        let failure_ok = self.status != DeliveryStatus::Failed
            || self
                .failure_detail
                .as_deref()
                .is_some_and(|d| !d.trim().is_empty());
        payload_ok && failure_ok
    }
}

// --- Media ---

/// Media kinds the pipeline can send.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MediaKind {
    Image,
    Document,
    Audio,
}

impl From<MediaKind> for MessageKind {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => MessageKind::Image,
            MediaKind::Document => MessageKind::Document,
            MediaKind::Audio => MessageKind::Audio,
        }
    }
}

/// Request for a short-lived write target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTargetRequest {
    pub organization_id: OrganizationId,
    pub conversation_id: ConversationId,
    pub mime_type: String,
    pub kind: MediaKind,
}

/// A pre-authorized destination for a direct byte upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// URL that accepts the bytes directly.
    pub write_url: String,
    /// Durable path the provider send will reference.
    pub storage_path: String,
}

// --- Provider calls ---

/// Explicit answer of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAnswer {
    Connected,
    Disconnected,
    /// The provider answered but could not tell.
    Indeterminate,
}

/// What an outbound send carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendPayload {
    Text(String),
    Media {
        kind: MediaKind,
        storage_path: String,
        mime_type: String,
        caption: Option<String>,
    },
}

/// A provider-send call, always scoped to organization, conversation and instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub organization_id: OrganizationId,
    pub conversation_id: ConversationId,
    pub channel_instance_id: InstanceId,
    pub message_id: MessageId,
    pub recipient: String,
    pub sender_user_id: Option<UserId>,
    pub payload: SendPayload,
}

/// Logical outcome of a provider send (transport failures are errors instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResult {
    Accepted { provider_message_id: Option<String> },
    Rejected { message: String },
}

// --- Change notifications ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeTable {
    ChannelInstances,
    Conversations,
    Messages,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change announced by the push path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub organization_id: OrganizationId,
    pub table: ChangeTable,
    pub kind: ChangeKind,
    pub record_id: Option<String>,
}

impl ChangeEvent {
    /// Events that should invalidate the visible thread.
    pub fn touches_messages(&self) -> bool {
        self.table == ChangeTable::Messages
    }
}
