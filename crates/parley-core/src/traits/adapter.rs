// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that all backend adapters must implement.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all Parley backend adapters.
///
/// Every adapter (data store, change feed, functions, object storage) provides
/// identity and a health check used by `parley doctor`.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the kind of adapter.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, ParleyError>;
}
