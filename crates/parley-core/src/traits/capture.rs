// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audio capture device trait.

use async_trait::async_trait;

use crate::error::ParleyError;

/// A microphone plus encoder.
///
/// Supported container/codec combinations are probed at runtime through
/// [`supported_formats`](AudioCapture::supported_formats), never assumed.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// MIME types the encoder can produce on this device right now.
    fn supported_formats(&self) -> Vec<String>;

    /// Opens the microphone and starts encoding in `mime_type`.
    async fn start(&self, mime_type: &str) -> Result<(), ParleyError>;

    /// Stops the recording and returns the encoded bytes.
    async fn stop(&self) -> Result<Vec<u8>, ParleyError>;

    /// Stops the device and drops buffered bytes. Must not suspend.
    fn cancel(&self);
}
