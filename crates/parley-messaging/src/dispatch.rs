// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The only place provider sends are issued.
//!
//! Every send: admission, optimistic `sending` message, (media) two-phase
//! upload, provider call, reconciliation. An accepted send moves the message
//! to `sent`, bumps the conversation's activity and invalidates the thread.
//! Any failure leaves the message `failed` with a non-empty detail and is
//! returned to the caller. If the outcome itself cannot be written back, the
//! caller gets [`ParleyError::DataUnavailable`] naming the outcome instead.
//! Nothing is retried.

use std::sync::Arc;

use chrono::Utc;
use parley_core::types::{
    Conversation, Message, MessageKind, ProviderResult, SendPayload, SendRequest,
};
use parley_core::{
    DataStore, DeliveryStatus, FunctionEndpoint, ObjectStorage, OrganizationId, ParleyError,
    UserId,
};
use tracing::{error, info, warn};

use crate::admission::AdmissionController;
use crate::media::{MediaPolicy, MediaTransfer, OutboundMedia, UploadedMedia};
use crate::metrics;
use crate::sync::MessageSync;

pub struct SendDispatcher {
    org: OrganizationId,
    store: Arc<dyn DataStore>,
    functions: Arc<dyn FunctionEndpoint>,
    storage: Arc<dyn ObjectStorage>,
    admission: Arc<AdmissionController>,
    sync: Arc<MessageSync>,
    policy: MediaPolicy,
}

impl SendDispatcher {
    pub fn new(
        org: OrganizationId,
        store: Arc<dyn DataStore>,
        functions: Arc<dyn FunctionEndpoint>,
        storage: Arc<dyn ObjectStorage>,
        admission: Arc<AdmissionController>,
        sync: Arc<MessageSync>,
        policy: MediaPolicy,
    ) -> Self {
        Self {
            org,
            store,
            functions,
            storage,
            admission,
            sync,
            policy,
        }
    }

    pub fn policy(&self) -> &MediaPolicy {
        &self.policy
    }

    /// Fails fast on the cooldown without reserving a slot, so callers can
    /// reject before any network round trip.
    pub fn precheck(&self) -> Result<(), ParleyError> {
        self.admission.check()
    }

    fn ensure_scope(&self, conversation: &Conversation) -> Result<(), ParleyError> {
        if conversation.organization_id != self.org {
            return Err(ParleyError::NotFound {
                entity: "conversation",
                id: conversation.id.to_string(),
            });
        }
        Ok(())
    }

    /// Sends a text message on the conversation's own instance.
    pub async fn send_text(
        &self,
        conversation: &Conversation,
        text: &str,
        sender: Option<&UserId>,
    ) -> Result<Message, ParleyError> {
        self.ensure_scope(conversation)?;
        let text = validate_text(text)?;
        self.admission.admit()?;

        let message = Message::outbound(
            conversation.id.clone(),
            MessageKind::Text,
            Some(text.to_string()),
            sender.cloned(),
        );
        self.store.insert_message(&self.org, &message).await?;
        self.sync.invalidate();

        let payload = SendPayload::Text(text.to_string());
        self.dispatch(conversation, message, payload).await
    }

    /// Validates, admits, uploads and sends one media item.
    ///
    /// Validation happens before admission so an oversized file neither
    /// consumes the cooldown slot nor reaches the network.
    pub async fn send_media(
        &self,
        conversation: &Conversation,
        media: OutboundMedia,
        sender: Option<&UserId>,
    ) -> Result<Message, ParleyError> {
        self.ensure_scope(conversation)?;
        self.policy.validate(&media)?;
        self.admission.admit()?;

        let mut message = Message::outbound(
            conversation.id.clone(),
            media.kind.into(),
            media.caption.clone(),
            sender.cloned(),
        );
        self.store.insert_message(&self.org, &message).await?;
        self.sync.invalidate();

        let mut transfer = MediaTransfer::new(self.functions.as_ref(), self.storage.as_ref());
        let uploaded = match transfer.upload(&self.org, &conversation.id, &media).await {
            Ok(uploaded) => uploaded,
            Err(failure) => {
                self.record_failure(&mut message, failure.detail(), failure.error.reason())
                    .await?;
                return Err(failure.error);
            }
        };
        drop(media);

        transfer.begin_dispatch(&uploaded)?;
        let result = self
            .dispatch_uploaded(conversation, message, &uploaded)
            .await;
        transfer.finish(result.is_ok());
        result
    }

    async fn dispatch_uploaded(
        &self,
        conversation: &Conversation,
        mut message: Message,
        uploaded: &UploadedMedia,
    ) -> Result<Message, ParleyError> {
        message.media_path = Some(uploaded.storage_path().to_string());
        let payload = SendPayload::Media {
            kind: uploaded.kind(),
            storage_path: uploaded.storage_path().to_string(),
            mime_type: uploaded.mime_type().to_string(),
            caption: message.text.clone(),
        };
        self.dispatch(conversation, message, payload).await
    }

    async fn dispatch(
        &self,
        conversation: &Conversation,
        mut message: Message,
        payload: SendPayload,
    ) -> Result<Message, ParleyError> {
        let request = SendRequest {
            organization_id: self.org.clone(),
            conversation_id: conversation.id.clone(),
            channel_instance_id: conversation.channel_instance_id.clone(),
            message_id: message.id.clone(),
            recipient: conversation.counterparty_address.clone(),
            sender_user_id: message.sender_user_id.clone(),
            payload,
        };

        match self.functions.dispatch_send(&request).await {
            Ok(ProviderResult::Accepted {
                provider_message_id,
            }) => {
                message.advance(DeliveryStatus::Sent);
                metrics::record_send(message.kind);
                info!(
                    message = %message.id,
                    conversation = %conversation.id,
                    instance = %conversation.channel_instance_id,
                    kind = %message.kind,
                    provider_id = provider_message_id.as_deref().unwrap_or("-"),
                    "message sent"
                );
                self.sync.invalidate();
                self.persist(&message).await?;
                if let Err(e) = self
                    .store
                    .touch_conversation(&self.org, &conversation.id, Utc::now())
                    .await
                {
                    warn!(conversation = %conversation.id, error = %e, "failed to bump conversation activity");
                }
                Ok(message)
            }
            Ok(ProviderResult::Rejected { message: detail }) => {
                self.record_failure(&mut message, detail.clone(), "provider_rejected")
                    .await?;
                Err(ParleyError::ProviderRejected { message: detail })
            }
            Err(e) => {
                self.record_failure(&mut message, format!("sending: {e}"), e.reason())
                    .await?;
                Err(e)
            }
        }
    }

    async fn record_failure(
        &self,
        message: &mut Message,
        detail: String,
        reason: &'static str,
    ) -> Result<(), ParleyError> {
        message.fail(detail);
        error!(
            message = %message.id,
            kind = %message.kind,
            reason,
            detail = message.failure_detail.as_deref().unwrap_or_default(),
            "send failed"
        );
        metrics::record_send_failure(reason);
        self.sync.invalidate();
        self.persist(message).await
    }

    /// Writes the reconciled status back. A failed write is surfaced with the
    /// outcome it was meant to record.
    async fn persist(&self, message: &Message) -> Result<(), ParleyError> {
        self.store
            .update_message(&self.org, message)
            .await
            .map_err(|e| {
                let outcome = match message.failure_detail.as_deref() {
                    Some(detail) => format!("{} ({detail})", message.status),
                    None => message.status.to_string(),
                };
                error!(message = %message.id, outcome = %outcome, error = %e, "message status not saved");
                metrics::record_send_failure("status_not_saved");
                ParleyError::data_unavailable(
                    format!("message is {outcome} but its status could not be saved"),
                    e,
                )
            })
    }
}

/// Trimmed text body, or an error when nothing is left to send.
pub fn validate_text(text: &str) -> Result<&str, ParleyError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParleyError::InvalidMessage {
            message: "Cannot send an empty message.".into(),
        });
    }
    Ok(text)
}
