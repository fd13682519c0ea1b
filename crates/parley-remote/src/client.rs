// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP client for the hosted backend.
//!
//! [`BackendClient`] owns the connection pool and authentication headers and
//! builds table and function URLs. It is cheap to clone.

use parley_config::model::BackendConfig;
use parley_core::ParleyError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Response, Url};
use serde::Deserialize;

/// Error body shape used by both the REST layer and the functions.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(alias = "message", alias = "msg")]
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Creates a client from backend configuration.
    ///
    /// Requires `backend.api_key` to be set.
    pub fn new(config: &BackendConfig) -> Result<Self, ParleyError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ParleyError::Config("backend.api_key is required".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key)
                .map_err(|e| ParleyError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ParleyError::Config(format!("invalid API key header value: {e}")))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ParleyError::transport("failed to build HTTP client", e))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The underlying reqwest client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a REST table with equality/ordering filters.
    pub fn table_url(&self, table: &str, filters: &[(&str, String)]) -> Result<Url, ParleyError> {
        let base = format!("{}/rest/v1/{table}", self.base_url);
        Url::parse_with_params(&base, filters)
            .map_err(|e| ParleyError::Config(format!("invalid backend URL `{base}`: {e}")))
    }

    /// URL of a remote function.
    pub fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{name}", self.base_url)
    }
}

/// Reads the error message out of a failed response, falling back to the raw body.
pub(crate) async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => parsed.error,
        Err(_) if body.trim().is_empty() => format!("HTTP {status}"),
        Err(_) => body,
    }
}

/// `eq.` filter value in the REST query dialect.
pub(crate) fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: Option<&str>) -> BackendConfig {
        BackendConfig {
            base_url: "https://project.example.co/".into(),
            api_key: key.map(String::from),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn api_key_is_required() {
        let err = BackendClient::new(&config(None)).unwrap_err();
        assert!(matches!(err, ParleyError::Config(_)));
        assert!(BackendClient::new(&config(Some(""))).is_err());
    }

    #[test]
    fn table_url_encodes_filters() {
        let client = BackendClient::new(&config(Some("k"))).unwrap();
        let url = client
            .table_url(
                "conversations",
                &[("organization_id", eq("org 1")), ("order", "last_activity_at.desc".into())],
            )
            .unwrap();
        assert_eq!(url.path(), "/rest/v1/conversations");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("organization_id".into(), "eq.org 1".into()));
        assert_eq!(pairs[1], ("order".into(), "last_activity_at.desc".into()));
    }

    #[test]
    fn function_url_strips_trailing_slash() {
        let client = BackendClient::new(&config(Some("k"))).unwrap();
        assert_eq!(
            client.function_url("send-message"),
            "https://project.example.co/functions/v1/send-message"
        );
    }
}
