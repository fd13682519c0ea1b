// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Parley messaging pipeline.
//!
//! - [`registry`]: channel instances and concurrent connectivity probes
//! - [`resolver`]: counterparty address to sibling conversations
//! - [`sync`]: pull/push thread synchronization for the active conversation
//! - [`admission`]: session-wide send cooldown
//! - [`media`]: validation and the two-phase upload
//! - [`capture`]: cancellable voice-note recording
//! - [`dispatch`]: the single provider-send path and its reconciliation
//! - [`session`]: the operator session wiring them together

pub mod admission;
pub mod capture;
pub mod dispatch;
pub mod inbox;
pub mod media;
pub mod metrics;
pub mod phone;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod sync;

pub use admission::{Admission, AdmissionController};
pub use capture::{AudioRecorder, CaptureSession, CapturedAudio};
pub use dispatch::SendDispatcher;
pub use inbox::{Inbox, InboxView};
pub use media::{MediaPolicy, MediaTransfer, OutboundMedia, TransferStage, UploadedMedia};
pub use phone::normalize_address;
pub use registry::{ChannelRegistry, ConnectivityBoard, ProbeState};
pub use resolver::{ConversationResolver, SiblingSet, SwitcherEntry};
pub use session::{ActiveThread, Adapters, MessagingSession};
pub use sync::{MessageSync, SyncNotice, ThreadSnapshot};
