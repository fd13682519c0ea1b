// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel instances and their runtime connectivity.
//!
//! The persisted `declared_connected` flag is informational only. Whether a
//! send is safe is decided by a fresh probe each time, and a probe that fails
//! or runs past its deadline is `Unknown`, never `Disconnected`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use parley_core::types::{ChannelInstance, ProbeAnswer};
use parley_core::{
    ConnectivityStatus, DataStore, FunctionEndpoint, InstanceId, OrganizationId, ParleyError,
};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::metrics;

/// Per-instance verification progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Checking,
    Verified(ConnectivityStatus),
}

/// Observable map of probe states, one entry per instance.
///
/// Each probe publishes its own result as soon as it resolves.
#[derive(Debug, Clone)]
pub struct ConnectivityBoard {
    tx: Arc<watch::Sender<BTreeMap<InstanceId, ProbeState>>>,
}

impl ConnectivityBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BTreeMap::new());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<BTreeMap<InstanceId, ProbeState>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> BTreeMap<InstanceId, ProbeState> {
        self.tx.borrow().clone()
    }

    pub fn state_of(&self, id: &InstanceId) -> Option<ProbeState> {
        self.tx.borrow().get(id).copied()
    }

    fn mark_checking<'a>(&self, ids: impl IntoIterator<Item = &'a InstanceId>) {
        self.tx.send_modify(|map| {
            for id in ids {
                map.insert(id.clone(), ProbeState::Checking);
            }
        });
    }

    fn record(&self, id: &InstanceId, status: ConnectivityStatus) {
        self.tx.send_modify(|map| {
            map.insert(id.clone(), ProbeState::Verified(status));
        });
    }
}

impl Default for ConnectivityBoard {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ChannelRegistry {
    store: Arc<dyn DataStore>,
    functions: Arc<dyn FunctionEndpoint>,
    probe_timeout: Duration,
    board: ConnectivityBoard,
}

impl ChannelRegistry {
    pub fn new(
        store: Arc<dyn DataStore>,
        functions: Arc<dyn FunctionEndpoint>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            store,
            functions,
            probe_timeout,
            board: ConnectivityBoard::new(),
        }
    }

    pub fn board(&self) -> &ConnectivityBoard {
        &self.board
    }

    /// All non-deleted instances of the organization.
    pub async fn list_instances(
        &self,
        org: &OrganizationId,
    ) -> Result<Vec<ChannelInstance>, ParleyError> {
        let instances = self.store.list_instances(org).await?;
        debug!(org = %org, count = instances.len(), "instances listed");
        Ok(instances)
    }

    pub async fn get_instance(
        &self,
        org: &OrganizationId,
        id: &InstanceId,
    ) -> Result<ChannelInstance, ParleyError> {
        self.store
            .get_instance(org, id)
            .await?
            .ok_or_else(|| ParleyError::NotFound {
                entity: "channel instance",
                id: id.to_string(),
            })
    }

    /// Probes one instance with a bounded wait.
    pub async fn verify_connectivity(&self, instance: &ChannelInstance) -> ConnectivityStatus {
        let probe = self
            .functions
            .probe_instance(&instance.organization_id, &instance.id);
        let status = match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(ProbeAnswer::Connected)) => ConnectivityStatus::Connected,
            Ok(Ok(ProbeAnswer::Disconnected)) => ConnectivityStatus::Disconnected,
            Ok(Ok(ProbeAnswer::Indeterminate)) => ConnectivityStatus::Unknown,
            Ok(Err(e)) => {
                warn!(instance = %instance.id, error = %e, "probe failed, status unknown");
                ConnectivityStatus::Unknown
            }
            Err(_) => {
                warn!(
                    instance = %instance.id,
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "probe timed out, status unknown"
                );
                ConnectivityStatus::Unknown
            }
        };
        metrics::record_probe(status);
        debug!(instance = %instance.id, status = %status, "instance verified");
        status
    }

    /// Probes every instance concurrently. Each one shows `Checking` on the
    /// board until its own probe resolves; results come back in input order.
    pub async fn verify_all(&self, instances: &mut [ChannelInstance]) {
        self.board.mark_checking(instances.iter().map(|i| &i.id));

        let mut pending: FuturesUnordered<_> = instances
            .iter()
            .enumerate()
            .map(|(idx, instance)| async move { (idx, self.verify_connectivity(instance).await) })
            .collect();

        let mut results = Vec::with_capacity(instances.len());
        while let Some((idx, status)) = pending.next().await {
            self.board.record(&instances[idx].id, status);
            results.push((idx, status));
        }
        drop(pending);

        for (idx, status) in results {
            instances[idx].verified = status;
        }
    }

    /// Fresh verdict for the instance a send is about to use. Only an explicit
    /// `Disconnected` refuses.
    pub async fn ensure_sendable(
        &self,
        org: &OrganizationId,
        id: &InstanceId,
    ) -> Result<ChannelInstance, ParleyError> {
        let mut instance = self.get_instance(org, id).await?;
        self.board.mark_checking([&instance.id]);
        let status = self.verify_connectivity(&instance).await;
        self.board.record(&instance.id, status);
        instance.verified = status;
        if !status.allows_send() {
            warn!(instance = %instance.id, label = %instance.label, "instance disconnected, send refused");
            return Err(ParleyError::ChannelUnavailable {
                instance_id: instance.id.to_string(),
                label: instance.label,
            });
        }
        Ok(instance)
    }
}
