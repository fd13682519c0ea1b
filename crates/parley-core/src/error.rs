// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley messaging pipeline.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Parley adapters and pipeline stages.
///
/// Every variant maps to one user-visible notice via [`ParleyError::notice`].
/// Nothing in the pipeline retries on any of these; the user re-acts.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The backing data store could not be queried.
    #[error("data unavailable: {message}")]
    DataUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The selected channel instance was verified disconnected.
    #[error("channel instance {instance_id} ({label}) is disconnected")]
    ChannelUnavailable { instance_id: String, label: String },

    /// The backend refused to mint an upload target.
    #[error("upload target unavailable: {message}")]
    TargetUnavailable { message: String },

    /// The byte transfer to the write target returned a non-success status.
    #[error("upload failed with status {status}: {message}")]
    UploadFailed { status: u16, message: String },

    /// The send cooldown has not elapsed yet.
    #[error("send rejected by cooldown, retry after {retry_after:?}")]
    AdmissionRejected {
        retry_after: Duration,
        cooldown: Duration,
    },

    /// The provider answered the send with a logical failure.
    #[error("provider rejected the send: {message}")]
    ProviderRejected { message: String },

    /// A media payload failed local validation before any network call.
    #[error("media rejected: {message}")]
    MediaRejected { message: String },

    /// Outgoing message content failed local validation (e.g. empty text).
    #[error("invalid message: {message}")]
    InvalidMessage { message: String },

    /// A counterparty address could not be normalized to a dialable number.
    #[error("invalid counterparty address `{address}`")]
    InvalidAddress { address: String },

    /// A record the operation depends on does not exist in this organization.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The function endpoint or object storage could not be reached.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The audio capture device failed.
    #[error("capture error: {0}")]
    Capture(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Shorthand for a [`ParleyError::DataUnavailable`] wrapping a lower-level error.
    pub fn data_unavailable<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::DataUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Shorthand for a [`ParleyError::Transport`] wrapping a lower-level error.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Short machine-readable reason, used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::ChannelUnavailable { .. } => "channel_unavailable",
            Self::TargetUnavailable { .. } => "target_unavailable",
            Self::UploadFailed { .. } => "upload_failed",
            Self::AdmissionRejected { .. } => "admission_rejected",
            Self::ProviderRejected { .. } => "provider_rejected",
            Self::MediaRejected { .. } => "media_rejected",
            Self::InvalidMessage { .. } => "invalid_message",
            Self::InvalidAddress { .. } => "invalid_address",
            Self::NotFound { .. } => "not_found",
            Self::Transport { .. } => "transport",
            Self::Capture(_) => "capture",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    /// The notice shown to the operator when this error reaches the UI boundary.
    pub fn notice(&self) -> String {
        match self {
            Self::AdmissionRejected {
                retry_after,
                cooldown,
            } => format!(
                "Messages are limited to one every {}s. Wait {}s before sending again.",
                ceil_secs(*cooldown),
                ceil_secs(*retry_after),
            ),
            Self::ChannelUnavailable { label, .. } => format!(
                "The number {label} is disconnected. Reconnect it on the instances screen, then try again."
            ),
            Self::TargetUnavailable { message } => {
                format!("Upload failed while requesting an upload target: {message}")
            }
            Self::UploadFailed { status, message } => {
                format!("Upload failed while transferring the file (HTTP {status}): {message}")
            }
            Self::ProviderRejected { message } => {
                format!("The message was not delivered: {message}")
            }
            Self::MediaRejected { message } | Self::InvalidMessage { message } => message.clone(),
            Self::InvalidAddress { address } => {
                format!("`{address}` is not a valid phone number. Include the area code.")
            }
            Self::DataUnavailable { message, .. } => {
                format!("Could not load messaging data: {message}")
            }
            other => other.to_string(),
        }
    }
}

/// Rounds a duration up to whole seconds for display.
fn ceil_secs(d: Duration) -> u64 {
    let millis = d.as_millis() as u64;
    millis.div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_notice_names_the_wait() {
        let err = ParleyError::AdmissionRejected {
            retry_after: Duration::from_millis(3000),
            cooldown: Duration::from_millis(5000),
        };
        let notice = err.notice();
        assert!(notice.contains("every 5s"), "got: {notice}");
        assert!(notice.contains("Wait 3s"), "got: {notice}");
    }

    #[test]
    fn partial_seconds_round_up() {
        let err = ParleyError::AdmissionRejected {
            retry_after: Duration::from_millis(1),
            cooldown: Duration::from_millis(5000),
        };
        assert!(err.notice().contains("Wait 1s"));
    }

    #[test]
    fn upload_notice_carries_step_and_status() {
        let err = ParleyError::UploadFailed {
            status: 413,
            message: "payload too large".into(),
        };
        let notice = err.notice();
        assert!(notice.contains("transferring"));
        assert!(notice.contains("413"));
    }

    #[test]
    fn channel_notice_asks_to_reconnect() {
        let err = ParleyError::ChannelUnavailable {
            instance_id: "inst-1".into(),
            label: "Sales".into(),
        };
        assert!(err.notice().contains("Reconnect"));
        assert_eq!(err.reason(), "channel_unavailable");
    }
}
