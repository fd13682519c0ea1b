// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted backend functions that record every call.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use parley_core::types::{
    AdapterType, HealthStatus, InstanceId, OrganizationId, ProbeAnswer, ProviderResult,
    SendRequest, UploadTarget, UploadTargetRequest,
};
use parley_core::{FunctionEndpoint, ParleyError, PluginAdapter};

/// How a liveness probe for one instance behaves.
#[derive(Debug, Clone)]
pub enum ProbeScript {
    Answer(ProbeAnswer),
    /// The call errors.
    Fail,
    /// The call never completes.
    Hang,
}

/// How upload-target requests behave.
#[derive(Debug, Clone)]
pub enum TargetScript {
    Grant,
    Refuse(String),
}

/// How one provider send behaves. Sends consume scripts in order and fall
/// back to `Accept` once the queue is empty.
#[derive(Debug, Clone)]
pub enum DispatchScript {
    Accept,
    Reject(String),
    /// Transport-level failure.
    Fail(String),
}

/// One recorded function call.
#[derive(Debug, Clone)]
pub enum FunctionCall {
    Probe(InstanceId),
    UploadTarget(UploadTargetRequest),
    Dispatch(SendRequest),
}

/// Runs inside `dispatch_send` before the scripted answer, to stage backend
/// side effects that land while the provider call is in flight.
pub type DispatchHook = Box<dyn Fn(&SendRequest) + Send + Sync>;

pub struct MockFunctions {
    probes: Mutex<HashMap<InstanceId, ProbeScript>>,
    target: Mutex<TargetScript>,
    dispatches: Mutex<VecDeque<DispatchScript>>,
    calls: Mutex<Vec<FunctionCall>>,
    on_dispatch: Mutex<Option<DispatchHook>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockFunctions {
    /// Every probe answers `Connected`, targets are granted and sends accepted.
    pub fn new() -> Self {
        Self {
            probes: Mutex::new(HashMap::new()),
            target: Mutex::new(TargetScript::Grant),
            dispatches: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            on_dispatch: Mutex::new(None),
        }
    }

    pub fn script_probe(&self, instance: &str, script: ProbeScript) {
        lock(&self.probes).insert(InstanceId::from(instance), script);
    }

    pub fn script_upload_target(&self, script: TargetScript) {
        *lock(&self.target) = script;
    }

    pub fn script_dispatch(&self, script: DispatchScript) {
        lock(&self.dispatches).push_back(script);
    }

    pub fn on_dispatch(&self, hook: impl Fn(&SendRequest) + Send + Sync + 'static) {
        *lock(&self.on_dispatch) = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<FunctionCall> {
        lock(&self.calls).clone()
    }

    pub fn dispatched(&self) -> Vec<SendRequest> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                FunctionCall::Dispatch(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn upload_target_requests(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, FunctionCall::UploadTarget(_)))
            .count()
    }

    fn record(&self, call: FunctionCall) -> usize {
        let mut calls = lock(&self.calls);
        calls.push(call);
        calls.len()
    }
}

impl Default for MockFunctions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockFunctions {
    fn name(&self) -> &str {
        "mock-functions"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Functions
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl FunctionEndpoint for MockFunctions {
    async fn probe_instance(
        &self,
        _org: &OrganizationId,
        instance: &InstanceId,
    ) -> Result<ProbeAnswer, ParleyError> {
        self.record(FunctionCall::Probe(instance.clone()));
        let script = lock(&self.probes)
            .get(instance)
            .cloned()
            .unwrap_or(ProbeScript::Answer(ProbeAnswer::Connected));
        match script {
            ProbeScript::Answer(answer) => Ok(answer),
            ProbeScript::Fail => Err(ParleyError::Transport {
                message: format!("probe for {instance} failed"),
                source: None,
            }),
            ProbeScript::Hang => std::future::pending().await,
        }
    }

    async fn request_upload_target(
        &self,
        request: &UploadTargetRequest,
    ) -> Result<UploadTarget, ParleyError> {
        let n = self.record(FunctionCall::UploadTarget(request.clone()));
        let script = lock(&self.target).clone();
        match script {
            TargetScript::Grant => Ok(UploadTarget {
                write_url: format!("memory://uploads/{n}"),
                storage_path: format!(
                    "{}/{}/{}-{n}",
                    request.organization_id, request.conversation_id, request.kind
                ),
            }),
            TargetScript::Refuse(message) => Err(ParleyError::TargetUnavailable { message }),
        }
    }

    async fn dispatch_send(&self, request: &SendRequest) -> Result<ProviderResult, ParleyError> {
        let n = self.record(FunctionCall::Dispatch(request.clone()));
        if let Some(hook) = lock(&self.on_dispatch).as_ref() {
            hook(request);
        }
        let script = lock(&self.dispatches)
            .pop_front()
            .unwrap_or(DispatchScript::Accept);
        match script {
            DispatchScript::Accept => Ok(ProviderResult::Accepted {
                provider_message_id: Some(format!("wamid.{n}")),
            }),
            DispatchScript::Reject(message) => Ok(ProviderResult::Rejected { message }),
            DispatchScript::Fail(message) => Err(ParleyError::Transport {
                message,
                source: None,
            }),
        }
    }
}
