// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley messaging pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Operator session identity.
    #[serde(default)]
    pub session: SessionConfig,

    /// Hosted backend endpoints and credentials.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Send cooldown, polling and probe settings.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Media size limits and format lists.
    #[serde(default)]
    pub media: MediaConfig,
}

/// Operator session identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Organization every query is scoped to.
    #[serde(default)]
    pub organization_id: String,

    /// Internal user sending messages (multi-operator attribution).
    #[serde(default)]
    pub user_id: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            organization_id: String::new(),
            user_id: None,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Hosted backend endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the hosted service, e.g. `https://project.example.co`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent on every request. `None` requires `PARLEY_BACKEND_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// WebSocket URL of the change stream. Derived from `base_url` when unset.
    #[serde(default)]
    pub realtime_url: Option<String>,

    /// Transport timeout for data, upload and dispatch requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            realtime_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The change-stream URL, falling back to `wss://<base>/realtime/v1/websocket`.
    pub fn realtime_endpoint(&self) -> String {
        if let Some(url) = &self.realtime_url {
            return url.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}/realtime/v1/websocket")
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:54321".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Send cooldown, polling and probe settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessagingConfig {
    /// Minimum spacing between two accepted outbound sends, session-wide.
    #[serde(default = "default_send_cooldown_ms")]
    pub send_cooldown_ms: u64,

    /// Interval of the pull path for the active conversation.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Bounded wait for a liveness probe before it degrades to `unknown`.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Country calling code enforced on counterparty addresses.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            send_cooldown_ms: default_send_cooldown_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            default_country_code: default_country_code(),
        }
    }
}

impl MessagingConfig {
    pub fn send_cooldown(&self) -> Duration {
        Duration::from_millis(self.send_cooldown_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn default_send_cooldown_ms() -> u64 {
    5000
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_probe_timeout_ms() -> u64 {
    8000
}

fn default_country_code() -> String {
    "55".to_string()
}

/// Media limits and formats.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,

    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,

    /// Accepted document MIME types.
    #[serde(default = "default_document_mime_types")]
    pub document_mime_types: Vec<String>,

    /// Audio formats in descending preference. The first one the capture
    /// device supports is used for recording and upload.
    #[serde(default = "default_audio_formats")]
    pub audio_formats: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: default_max_image_bytes(),
            max_document_bytes: default_max_document_bytes(),
            document_mime_types: default_document_mime_types(),
            audio_formats: default_audio_formats(),
        }
    }
}

fn default_max_image_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_max_document_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_document_mime_types() -> Vec<String> {
    [
        "application/pdf",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "text/plain",
        "text/csv",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_audio_formats() -> Vec<String> {
    ["audio/ogg;codecs=opus", "audio/webm;codecs=opus", "audio/mp4", "audio/mpeg"]
        .into_iter()
        .map(String::from)
        .collect()
}
