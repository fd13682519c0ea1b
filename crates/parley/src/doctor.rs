// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley doctor` command implementation.
//!
//! Runs diagnostic checks against the configuration and the hosted backend
//! to identify missing settings, unreachable services and disconnected
//! channel instances.

use std::time::{Duration, Instant};

use parley_config::ParleyConfig;
use parley_core::types::{ConnectivityStatus, HealthStatus};
use parley_core::{ParleyError, PluginAdapter};
use parley_messaging::MessagingSession;

use crate::connect;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed successfully.
    Pass,
    /// Check passed with a warning.
    Warn,
    /// Check failed.
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `parley doctor` command.
pub async fn run_doctor(config: &ParleyConfig, use_color: bool) -> Result<(), ParleyError> {
    let mut results = vec![check_session(config)];

    match connect::backend_adapters(config) {
        Ok(adapters) => {
            results.push(check_adapter("data store", adapters.store.as_ref()).await);
            results.push(check_adapter("functions", adapters.functions.as_ref()).await);
            results.push(check_adapter("object storage", adapters.storage.as_ref()).await);
            results.push(check_realtime(config, adapters.feed.is_some()));
            if let Ok(session) = MessagingSession::new(config, adapters) {
                results.push(check_instances(&session).await);
            }
        }
        Err(e) => results.push(CheckResult::new(
            "backend",
            CheckStatus::Fail,
            e.to_string(),
            Instant::now(),
        )),
    }

    print_results(&results, use_color);
    Ok(())
}

/// Check the session identity and credentials are configured.
fn check_session(config: &ParleyConfig) -> CheckResult {
    let start = Instant::now();
    let mut missing = Vec::new();
    if config.session.organization_id.trim().is_empty() {
        missing.push("session.organization_id");
    }
    if config
        .backend
        .api_key
        .as_deref()
        .is_none_or(|k| k.is_empty())
    {
        missing.push("backend.api_key");
    }
    if missing.is_empty() {
        CheckResult::new(
            "config",
            CheckStatus::Pass,
            format!("organization {}", config.session.organization_id),
            start,
        )
    } else {
        CheckResult::new(
            "config",
            CheckStatus::Fail,
            format!("missing {}", missing.join(", ")),
            start,
        )
    }
}

async fn check_adapter(name: &str, adapter: &dyn PluginAdapter) -> CheckResult {
    let start = Instant::now();
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => CheckResult::new(name, CheckStatus::Pass, "reachable", start),
        Ok(HealthStatus::Degraded(msg)) => CheckResult::new(name, CheckStatus::Warn, msg, start),
        Ok(HealthStatus::Unhealthy(msg)) => CheckResult::new(name, CheckStatus::Fail, msg, start),
        Err(e) => CheckResult::new(name, CheckStatus::Fail, e.to_string(), start),
    }
}

fn check_realtime(config: &ParleyConfig, available: bool) -> CheckResult {
    let start = Instant::now();
    if available {
        CheckResult::new(
            "realtime",
            CheckStatus::Pass,
            config.backend.realtime_endpoint(),
            start,
        )
    } else {
        CheckResult::new(
            "realtime",
            CheckStatus::Warn,
            "change feed unavailable, threads refresh by polling only",
            start,
        )
    }
}

/// Probe every instance and report how many are connected.
async fn check_instances(session: &MessagingSession) -> CheckResult {
    let start = Instant::now();
    let instances = match session.instances(true).await {
        Ok(instances) => instances,
        Err(e) => return CheckResult::new("instances", CheckStatus::Fail, e.notice(), start),
    };
    if instances.is_empty() {
        return CheckResult::new("instances", CheckStatus::Warn, "none configured", start);
    }
    let count = |status| instances.iter().filter(|i| i.verified == status).count();
    let connected = count(ConnectivityStatus::Connected);
    let disconnected = count(ConnectivityStatus::Disconnected);
    let unknown = count(ConnectivityStatus::Unknown);
    let message = format!("{connected} connected, {disconnected} disconnected, {unknown} unknown");

    let status = if disconnected > 0 || unknown > 0 {
        CheckStatus::Warn
    } else {
        CheckStatus::Pass
    };
    CheckResult::new("instances", status, message, start)
}

fn print_results(results: &[CheckResult], use_color: bool) {
    println!();
    println!("  parley doctor");
    println!("  {}", "-".repeat(50));

    let mut issues = 0;
    for result in results {
        let duration_ms = result.duration.as_millis();
        let line = match (&result.status, use_color) {
            (CheckStatus::Pass, true) => {
                use colored::Colorize;
                format!(
                    "    {} {:<16} {} ({duration_ms}ms)",
                    "✓".green(),
                    result.name,
                    result.message
                )
            }
            (CheckStatus::Warn, true) => {
                use colored::Colorize;
                format!(
                    "    {} {:<16} {} ({duration_ms}ms)",
                    "!".yellow(),
                    result.name,
                    result.message.yellow()
                )
            }
            (CheckStatus::Fail, true) => {
                use colored::Colorize;
                format!(
                    "    {} {:<16} {} ({duration_ms}ms)",
                    "✗".red(),
                    result.name,
                    result.message.red()
                )
            }
            (status, false) => {
                let tag = match status {
                    CheckStatus::Pass => "[OK]  ",
                    CheckStatus::Warn => "[WARN]",
                    CheckStatus::Fail => "[FAIL]",
                };
                format!(
                    "    {tag} {:<16} {} ({duration_ms}ms)",
                    result.name, result.message
                )
            }
        };
        if result.status != CheckStatus::Pass {
            issues += 1;
        }
        println!("{line}");
    }

    println!();
    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_session_reports_missing_keys() {
        let result = check_session(&ParleyConfig::default());
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.message.contains("session.organization_id"));
        assert!(result.message.contains("backend.api_key"));
    }

    #[test]
    fn check_session_passes_when_configured() {
        let mut config = ParleyConfig::default();
        config.session.organization_id = "org-1".into();
        config.backend.api_key = Some("anon-key".into());
        assert_eq!(check_session(&config).status, CheckStatus::Pass);
    }

    #[test]
    fn realtime_check_warns_without_feed() {
        let result = check_realtime(&ParleyConfig::default(), false);
        assert_eq!(result.status, CheckStatus::Warn);
    }
}
