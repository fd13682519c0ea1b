// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Object storage trait for direct byte uploads.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::UploadTarget;

#[async_trait]
pub trait ObjectStorage: PluginAdapter {
    /// Transfers `bytes` to a pre-authorized write target.
    ///
    /// Any non-success response is [`ParleyError::UploadFailed`]; nothing retries.
    async fn upload(
        &self,
        target: &UploadTarget,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<(), ParleyError>;
}
