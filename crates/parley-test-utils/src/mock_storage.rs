// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Object storage that keeps uploads in memory.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use parley_core::types::{AdapterType, HealthStatus, UploadTarget};
use parley_core::{ObjectStorage, ParleyError, PluginAdapter};

/// One object written through [`MockObjectStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub write_url: String,
    pub storage_path: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub struct MockObjectStorage {
    uploads: Mutex<Vec<StoredObject>>,
    failure: Mutex<Option<(u16, String)>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Makes every upload answer with `status`.
    pub fn fail_with(&self, status: u16, message: &str) {
        *lock(&self.failure) = Some((status, message.to_string()));
    }

    pub fn uploads(&self) -> Vec<StoredObject> {
        lock(&self.uploads).clone()
    }
}

impl Default for MockObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockObjectStorage {
    fn name(&self) -> &str {
        "mock-storage"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ObjectStorage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn upload(
        &self,
        target: &UploadTarget,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<(), ParleyError> {
        if let Some((status, message)) = lock(&self.failure).clone() {
            return Err(ParleyError::UploadFailed { status, message });
        }
        lock(&self.uploads).push(StoredObject {
            write_url: target.write_url.clone(),
            storage_path: target.storage_path.clone(),
            mime_type: mime_type.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}
