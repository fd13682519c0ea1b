// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wires the hosted-backend adapters into a messaging session.

use std::sync::Arc;

use parley_config::ParleyConfig;
use parley_core::{ChangeFeed, ParleyError};
use parley_messaging::{Adapters, MessagingSession};
use parley_remote::{BackendClient, HttpFunctions, HttpObjectStorage, RealtimeFeed, RestDataStore};
use tracing::{debug, warn};

/// Builds the backend adapters for `config`.
///
/// A realtime feed that cannot be configured is not fatal: the session
/// falls back to polling.
pub fn backend_adapters(config: &ParleyConfig) -> Result<Adapters, ParleyError> {
    let client = BackendClient::new(&config.backend)?;

    let feed: Option<Arc<dyn ChangeFeed>> = match RealtimeFeed::new(&config.backend) {
        Ok(feed) => Some(Arc::new(feed)),
        Err(e) => {
            warn!(error = %e, "realtime feed unavailable, polling only");
            None
        }
    };

    debug!(base_url = client.base_url(), "backend adapters ready");
    Ok(Adapters {
        store: Arc::new(RestDataStore::new(client.clone())),
        functions: Arc::new(HttpFunctions::new(client.clone())),
        storage: Arc::new(HttpObjectStorage::new(client)),
        feed,
        // The terminal has no microphone; voice notes are sent from files.
        capture: None,
    })
}

pub fn open_session(config: &ParleyConfig) -> Result<MessagingSession, ParleyError> {
    MessagingSession::new(config, backend_adapters(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_requires_organization() {
        let mut config = ParleyConfig::default();
        config.backend.api_key = Some("anon-key".into());
        assert!(matches!(
            open_session(&config),
            Err(ParleyError::Config(_))
        ));
    }

    #[test]
    fn session_opens_with_organization_and_key() {
        let mut config = ParleyConfig::default();
        config.backend.api_key = Some("anon-key".into());
        config.session.organization_id = "org-1".into();
        let session = open_session(&config).unwrap();
        assert_eq!(session.organization().as_str(), "org-1");
    }
}
