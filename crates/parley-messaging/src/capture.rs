// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Voice-note recording.
//!
//! A [`CaptureSession`] either finishes into [`CapturedAudio`] or is
//! cancelled. Cancellation consumes the session and stops the device
//! synchronously; dropping an unfinished session cancels it too. Only
//! finished audio can be handed to the send path.

use std::sync::Arc;

use parley_core::types::MediaKind;
use parley_core::{AudioCapture, ParleyError};
use tracing::{debug, info};

use crate::media::{MediaPolicy, OutboundMedia};

/// Encoded audio from a finished recording.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedAudio {
    bytes: Vec<u8>,
    mime_type: String,
}

impl std::fmt::Debug for CapturedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedAudio")
            .field("size", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl CapturedAudio {
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_media(self) -> OutboundMedia {
        OutboundMedia::new(MediaKind::Audio, self.bytes, self.mime_type)
    }
}

/// Starts recordings in the first preferred format the device supports.
pub struct AudioRecorder {
    device: Arc<dyn AudioCapture>,
    policy: MediaPolicy,
}

impl AudioRecorder {
    pub fn new(device: Arc<dyn AudioCapture>, policy: MediaPolicy) -> Self {
        Self { device, policy }
    }

    /// The format a recording would use on this device right now.
    pub fn negotiate_format(&self) -> Result<String, ParleyError> {
        self.policy.pick_audio_format(&self.device.supported_formats())
    }

    pub async fn start(&self) -> Result<CaptureSession, ParleyError> {
        let mime_type = self.negotiate_format()?;
        self.device.start(&mime_type).await?;
        info!(mime_type = %mime_type, "recording started");
        Ok(CaptureSession {
            device: self.device.clone(),
            mime_type,
            open: true,
        })
    }
}

/// A recording in progress.
pub struct CaptureSession {
    device: Arc<dyn AudioCapture>,
    mime_type: String,
    open: bool,
}

impl CaptureSession {
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Stops the device and returns the encoded recording.
    pub async fn finish(mut self) -> Result<CapturedAudio, ParleyError> {
        let bytes = self.device.stop().await?;
        self.open = false;
        if bytes.is_empty() {
            return Err(ParleyError::Capture("recording produced no audio".into()));
        }
        debug!(size = bytes.len(), "recording finished");
        Ok(CapturedAudio {
            bytes,
            mime_type: std::mem::take(&mut self.mime_type),
        })
    }

    /// Stops the device and discards everything recorded.
    pub fn cancel(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.device.cancel();
            info!("recording cancelled, audio discarded");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}
