// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote function endpoint trait.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    InstanceId, OrganizationId, ProbeAnswer, ProviderResult, SendRequest, UploadTarget,
    UploadTargetRequest,
};

/// Request/response functions hosted next to the data store.
///
/// Only metadata and storage paths go through these calls; media bytes go to
/// [`ObjectStorage`](crate::traits::ObjectStorage) directly.
#[async_trait]
pub trait FunctionEndpoint: PluginAdapter {
    /// Asks the provider whether the instance's account is connected.
    async fn probe_instance(
        &self,
        org: &OrganizationId,
        instance: &InstanceId,
    ) -> Result<ProbeAnswer, ParleyError>;

    /// Mints a short-lived write target. Refusals are
    /// [`ParleyError::TargetUnavailable`].
    async fn request_upload_target(
        &self,
        request: &UploadTargetRequest,
    ) -> Result<UploadTarget, ParleyError>;

    /// Issues the provider send. A logical refusal is `Ok(ProviderResult::Rejected)`.
    async fn dispatch_send(&self, request: &SendRequest) -> Result<ProviderResult, ParleyError>;
}
