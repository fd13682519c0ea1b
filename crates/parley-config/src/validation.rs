// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let base = config.backend.base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        errors.push(ConfigError::Validation {
            message: format!("backend.base_url `{base}` must start with http:// or https://"),
        });
    }

    if config.backend.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "backend.request_timeout_secs must be greater than 0".to_string(),
        });
    }

    if let Some(url) = &config.backend.realtime_url
        && !(url.starts_with("ws://") || url.starts_with("wss://"))
    {
        errors.push(ConfigError::Validation {
            message: format!("backend.realtime_url `{url}` must start with ws:// or wss://"),
        });
    }

    if config.messaging.send_cooldown_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "messaging.send_cooldown_ms must be greater than 0".to_string(),
        });
    }

    if config.messaging.poll_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "messaging.poll_interval_secs must be greater than 0".to_string(),
        });
    }

    if config.messaging.probe_timeout_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "messaging.probe_timeout_ms must be greater than 0".to_string(),
        });
    }

    let cc = &config.messaging.default_country_code;
    if cc.is_empty() || cc.len() > 3 || !cc.chars().all(|c| c.is_ascii_digit()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "messaging.default_country_code must be 1-3 digits, got `{cc}`"
            ),
        });
    }

    if config.media.max_image_bytes == 0 || config.media.max_document_bytes == 0 {
        errors.push(ConfigError::Validation {
            message: "media size limits must be greater than 0".to_string(),
        });
    }

    if config.media.document_mime_types.is_empty() {
        errors.push(ConfigError::Validation {
            message: "media.document_mime_types must not be empty".to_string(),
        });
    }

    if config.media.audio_formats.is_empty() {
        errors.push(ConfigError::Validation {
            message: "media.audio_formats must list at least one format".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
