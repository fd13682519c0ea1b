// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media validation and the two-phase upload.
//!
//! A media send is: local validation, write-target request, direct byte
//! upload, then a provider send that references the stored path. Validation
//! runs before anything touches the network. [`UploadedMedia`] can only be
//! obtained from a completed upload, so a dispatch cannot reference an
//! object that was never transferred.

use std::fmt;

use parley_config::model::MediaConfig;
use parley_core::types::{MediaKind, UploadTargetRequest};
use parley_core::{ConversationId, FunctionEndpoint, ObjectStorage, OrganizationId, ParleyError};
use tracing::{debug, info};

const MIB: u64 = 1024 * 1024;

/// Media bytes staged for sending.
#[derive(Clone, PartialEq, Eq)]
pub struct OutboundMedia {
    pub kind: MediaKind,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
    pub caption: Option<String>,
}

impl fmt::Debug for OutboundMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundMedia")
            .field("kind", &self.kind)
            .field("size", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .field("caption", &self.caption)
            .finish()
    }
}

impl OutboundMedia {
    pub fn new(kind: MediaKind, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            kind,
            bytes,
            mime_type: mime_type.into(),
            file_name: None,
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        let caption = caption.into();
        self.caption = (!caption.trim().is_empty()).then_some(caption);
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Size limits, the document allow-list and the audio preference list.
#[derive(Debug, Clone)]
pub struct MediaPolicy {
    max_image_bytes: u64,
    max_document_bytes: u64,
    document_mime_types: Vec<String>,
    audio_formats: Vec<String>,
}

impl From<&MediaConfig> for MediaPolicy {
    fn from(config: &MediaConfig) -> Self {
        Self {
            max_image_bytes: config.max_image_bytes,
            max_document_bytes: config.max_document_bytes,
            document_mime_types: config.document_mime_types.clone(),
            audio_formats: config.audio_formats.clone(),
        }
    }
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self::from(&MediaConfig::default())
    }
}

/// `image/jpeg; charset=x` -> `image/jpeg`, lowercased.
fn essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase()
}

fn format_limit(bytes: u64) -> String {
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{:.1}MB", bytes as f64 / MIB as f64)
    }
}

fn rejected(message: String) -> ParleyError {
    ParleyError::MediaRejected { message }
}

impl MediaPolicy {
    pub fn audio_formats(&self) -> &[String] {
        &self.audio_formats
    }

    /// Checks size, type and allow-list. No network call is made.
    pub fn validate(&self, media: &OutboundMedia) -> Result<(), ParleyError> {
        if media.bytes.is_empty() {
            return Err(rejected("The file is empty.".into()));
        }
        let mime = essence(&media.mime_type);
        match media.kind {
            MediaKind::Image => {
                if !mime.starts_with("image/") {
                    return Err(rejected(format!("`{}` is not an image.", media.mime_type)));
                }
                if media.size() > self.max_image_bytes {
                    return Err(rejected(format!(
                        "Image is too large ({}), max {}.",
                        format_limit(media.size()),
                        format_limit(self.max_image_bytes)
                    )));
                }
            }
            MediaKind::Document => {
                if !self
                    .document_mime_types
                    .iter()
                    .any(|allowed| essence(allowed) == mime)
                {
                    return Err(rejected(format!(
                        "Documents of type `{}` are not accepted. Send PDF, Word, Excel, plain text or CSV.",
                        media.mime_type
                    )));
                }
                if media.size() > self.max_document_bytes {
                    return Err(rejected(format!(
                        "Document is too large ({}), max {}.",
                        format_limit(media.size()),
                        format_limit(self.max_document_bytes)
                    )));
                }
            }
            MediaKind::Audio => {
                if !self
                    .audio_formats
                    .iter()
                    .any(|f| essence(f) == mime)
                {
                    return Err(rejected(format!(
                        "Audio format `{}` is not supported.",
                        media.mime_type
                    )));
                }
            }
        }
        Ok(())
    }

    /// First preferred audio format the capture device can produce.
    pub fn pick_audio_format(&self, supported: &[String]) -> Result<String, ParleyError> {
        self.audio_formats
            .iter()
            .find(|preferred| {
                supported
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(preferred.as_str()))
            })
            .cloned()
            .ok_or_else(|| {
                rejected(
                    "This device cannot record audio in any format the provider accepts.".into(),
                )
            })
    }
}

/// Progress of one media send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Idle,
    RequestingTarget,
    Uploading,
    Dispatching,
    Sent,
    Failed,
}

impl TransferStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStage::Sent | TransferStage::Failed)
    }

    fn can_advance_to(self, next: TransferStage) -> bool {
        use TransferStage::*;
        matches!(
            (self, next),
            (Idle, RequestingTarget)
                | (RequestingTarget, Uploading)
                | (Uploading, Dispatching)
                | (Dispatching, Sent)
        ) || (!self.is_terminal() && next == Failed)
    }

    /// Step name shown in failure notices.
    pub fn step_name(self) -> &'static str {
        match self {
            TransferStage::Idle => "preparing",
            TransferStage::RequestingTarget => "requesting an upload target",
            TransferStage::Uploading => "transferring the file",
            TransferStage::Dispatching => "sending",
            TransferStage::Sent => "sent",
            TransferStage::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step_name())
    }
}

/// Proof that bytes reached storage. Only [`MediaTransfer::upload`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    kind: MediaKind,
    storage_path: String,
    mime_type: String,
}

impl UploadedMedia {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// One media send attempt walking `Idle -> RequestingTarget -> Uploading ->
/// Dispatching -> Sent | Failed`. Never retries.
pub struct MediaTransfer<'a> {
    functions: &'a dyn FunctionEndpoint,
    storage: &'a dyn ObjectStorage,
    stage: TransferStage,
}

impl<'a> MediaTransfer<'a> {
    pub fn new(functions: &'a dyn FunctionEndpoint, storage: &'a dyn ObjectStorage) -> Self {
        Self {
            functions,
            storage,
            stage: TransferStage::Idle,
        }
    }

    pub fn stage(&self) -> TransferStage {
        self.stage
    }

    fn advance(&mut self, next: TransferStage) -> Result<(), ParleyError> {
        if !self.stage.can_advance_to(next) {
            return Err(ParleyError::Internal(format!(
                "media transfer cannot move from {:?} to {next:?}",
                self.stage
            )));
        }
        debug!(from = ?self.stage, to = ?next, "media transfer stage");
        self.stage = next;
        Ok(())
    }

    /// Requests a write target and transfers the bytes. On error the attempt
    /// is `Failed` and the returned [`TransferFailure`] names the step.
    pub async fn upload(
        &mut self,
        org: &OrganizationId,
        conversation: &ConversationId,
        media: &OutboundMedia,
    ) -> Result<UploadedMedia, TransferFailure> {
        self.advance(TransferStage::RequestingTarget)
            .map_err(|e| TransferFailure::at(self.stage, e))?;
        let request = UploadTargetRequest {
            organization_id: org.clone(),
            conversation_id: conversation.clone(),
            mime_type: media.mime_type.clone(),
            kind: media.kind,
        };
        let target = match self.functions.request_upload_target(&request).await {
            Ok(target) => target,
            Err(e) => return Err(self.fail(e)),
        };

        self.advance(TransferStage::Uploading)
            .map_err(|e| TransferFailure::at(self.stage, e))?;
        if let Err(e) = self
            .storage
            .upload(&target, &media.bytes, &media.mime_type)
            .await
        {
            return Err(self.fail(e));
        }
        info!(path = %target.storage_path, size = media.bytes.len(), kind = %media.kind, "media uploaded");

        Ok(UploadedMedia {
            kind: media.kind,
            storage_path: target.storage_path,
            mime_type: media.mime_type.clone(),
        })
    }

    /// Marks the hand-off to the provider send. Requires the upload's receipt.
    pub fn begin_dispatch(&mut self, _uploaded: &UploadedMedia) -> Result<(), ParleyError> {
        self.advance(TransferStage::Dispatching)
    }

    /// Records the outcome of the provider send.
    pub fn finish(&mut self, sent: bool) {
        let next = if sent {
            TransferStage::Sent
        } else {
            TransferStage::Failed
        };
        let _ = self.advance(next);
    }

    fn fail(&mut self, error: ParleyError) -> TransferFailure {
        let failure = TransferFailure::at(self.stage, error);
        self.stage = TransferStage::Failed;
        failure
    }
}

/// A failed transfer step with the stage it failed in.
#[derive(Debug)]
pub struct TransferFailure {
    pub stage: TransferStage,
    pub error: ParleyError,
}

impl TransferFailure {
    fn at(stage: TransferStage, error: ParleyError) -> Self {
        Self { stage, error }
    }

    /// Failure detail stored on the message: step name plus the raw cause.
    pub fn detail(&self) -> String {
        format!("{}: {}", self.stage.step_name(), self.error)
    }
}
