// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Direct byte upload to a signed write URL.

use async_trait::async_trait;
use parley_core::types::{AdapterType, HealthStatus, UploadTarget};
use parley_core::{ObjectStorage, ParleyError, PluginAdapter};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::client::{error_message, BackendClient};

pub struct HttpObjectStorage {
    client: BackendClient,
}

impl HttpObjectStorage {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginAdapter for HttpObjectStorage {
    fn name(&self) -> &str {
        "http-object-storage"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ObjectStorage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        // Write URLs are minted per upload; there is nothing to probe ahead of time.
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(
        &self,
        target: &UploadTarget,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<(), ParleyError> {
        debug!(path = %target.storage_path, size = bytes.len(), mime_type, "uploading media");
        let response = self
            .client
            .http()
            .put(&target.write_url)
            .header(CONTENT_TYPE, mime_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ParleyError::transport("media upload request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            warn!(status = %status, error = %message, "media upload rejected");
            return Err(ParleyError::UploadFailed {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}
