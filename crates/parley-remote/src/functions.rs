// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP implementation of [`FunctionEndpoint`].
//!
//! Three remote functions are used:
//! - `instance-status`: liveness probe for one channel instance
//! - `media-upload-target`: mints a signed write URL and a durable path
//! - `send-message`: the single provider-send entry point
//!
//! Response bodies are decoded into typed structs here; a body that does not
//! match is a transport failure, never a silently defaulted value.

use async_trait::async_trait;
use parley_core::types::{
    AdapterType, HealthStatus, InstanceId, OrganizationId, ProbeAnswer, ProviderResult,
    SendPayload, SendRequest, UploadTarget, UploadTargetRequest,
};
use parley_core::{FunctionEndpoint, ParleyError, PluginAdapter};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{error_message, BackendClient};

const PROBE_FUNCTION: &str = "instance-status";
const UPLOAD_TARGET_FUNCTION: &str = "media-upload-target";
const SEND_FUNCTION: &str = "send-message";

#[derive(Debug, Serialize)]
struct ProbeBody<'a> {
    organization_id: &'a str,
    instance_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProbeResponse {
    state: String,
}

impl ProbeResponse {
    fn answer(&self) -> ProbeAnswer {
        match self.state.to_ascii_lowercase().as_str() {
            "connected" | "open" => ProbeAnswer::Connected,
            "disconnected" | "close" | "closed" => ProbeAnswer::Disconnected,
            _ => ProbeAnswer::Indeterminate,
        }
    }
}

#[derive(Debug, Serialize)]
struct UploadTargetBody<'a> {
    organization_id: &'a str,
    conversation_id: &'a str,
    mime_type: &'a str,
    media_type: String,
}

#[derive(Debug, Deserialize)]
struct UploadTargetResponse {
    upload_url: String,
    path: String,
}

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    organization_id: &'a str,
    conversation_id: &'a str,
    instance_id: &'a str,
    message_id: &'a str,
    to: &'a str,
    sent_by: Option<&'a str>,
    message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
}

impl<'a> From<&'a SendRequest> for SendBody<'a> {
    fn from(req: &'a SendRequest) -> Self {
        let (message_type, content, media_path, mime_type) = match &req.payload {
            SendPayload::Text(text) => ("text".to_string(), Some(text.as_str()), None, None),
            SendPayload::Media {
                kind,
                storage_path,
                mime_type,
                caption,
            } => (
                kind.to_string(),
                caption.as_deref(),
                Some(storage_path.as_str()),
                Some(mime_type.as_str()),
            ),
        };
        SendBody {
            organization_id: req.organization_id.as_str(),
            conversation_id: req.conversation_id.as_str(),
            instance_id: req.channel_instance_id.as_str(),
            message_id: req.message_id.as_str(),
            to: &req.recipient,
            sent_by: req.sender_user_id.as_ref().map(|u| u.as_str()),
            message_type,
            content,
            media_path,
            mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    success: bool,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<SendResponse> for ProviderResult {
    fn from(resp: SendResponse) -> Self {
        if resp.success {
            ProviderResult::Accepted {
                provider_message_id: resp.message_id,
            }
        } else {
            ProviderResult::Rejected {
                message: resp
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "provider reported failure without detail".into()),
            }
        }
    }
}

/// Remote functions reached over HTTP.
pub struct HttpFunctions {
    client: BackendClient,
}

impl HttpFunctions {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    async fn invoke<B: Serialize + ?Sized>(
        &self,
        name: &str,
        body: &B,
    ) -> Result<reqwest::Response, ParleyError> {
        let response = self
            .client
            .http()
            .post(self.client.function_url(name))
            .json(body)
            .send()
            .await
            .map_err(|e| ParleyError::transport(format!("{name} request failed"), e))?;
        debug!(function = name, status = %response.status(), "function responded");
        Ok(response)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    name: &str,
    response: reqwest::Response,
) -> Result<T, ParleyError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ParleyError::transport(format!("unexpected {name} response body"), e))
}

#[async_trait]
impl PluginAdapter for HttpFunctions {
    fn name(&self) -> &str {
        "http-functions"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Functions
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        // Any HTTP answer means the function gateway is up.
        match self
            .client
            .http()
            .request(reqwest::Method::OPTIONS, self.client.function_url(PROBE_FUNCTION))
            .send()
            .await
        {
            Ok(r) if r.status().is_server_error() => Ok(HealthStatus::Degraded(format!(
                "function gateway returned {}",
                r.status()
            ))),
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "function gateway unreachable: {e}"
            ))),
        }
    }
}

#[async_trait]
impl FunctionEndpoint for HttpFunctions {
    async fn probe_instance(
        &self,
        org: &OrganizationId,
        instance: &InstanceId,
    ) -> Result<ProbeAnswer, ParleyError> {
        let body = ProbeBody {
            organization_id: org.as_str(),
            instance_id: instance.as_str(),
        };
        let response = self.invoke(PROBE_FUNCTION, &body).await?;
        if !response.status().is_success() {
            let status = response.status();
            let message = error_message(response).await;
            return Err(ParleyError::Transport {
                message: format!("{PROBE_FUNCTION} returned {status}: {message}"),
                source: None,
            });
        }
        let parsed: ProbeResponse = decode(PROBE_FUNCTION, response).await?;
        Ok(parsed.answer())
    }

    async fn request_upload_target(
        &self,
        request: &UploadTargetRequest,
    ) -> Result<UploadTarget, ParleyError> {
        let body = UploadTargetBody {
            organization_id: request.organization_id.as_str(),
            conversation_id: request.conversation_id.as_str(),
            mime_type: &request.mime_type,
            media_type: request.kind.to_string(),
        };
        let response = self.invoke(UPLOAD_TARGET_FUNCTION, &body).await?;
        if !response.status().is_success() {
            let status = response.status();
            let message = error_message(response).await;
            warn!(status = %status, error = %message, "upload target refused");
            return Err(ParleyError::TargetUnavailable {
                message: format!("HTTP {}: {message}", status.as_u16()),
            });
        }
        let parsed: UploadTargetResponse = decode(UPLOAD_TARGET_FUNCTION, response).await?;
        if parsed.upload_url.is_empty() || parsed.path.is_empty() {
            return Err(ParleyError::TargetUnavailable {
                message: "backend returned an empty upload target".into(),
            });
        }
        Ok(UploadTarget {
            write_url: parsed.upload_url,
            storage_path: parsed.path,
        })
    }

    async fn dispatch_send(&self, request: &SendRequest) -> Result<ProviderResult, ParleyError> {
        let response = self
            .invoke(SEND_FUNCTION, &SendBody::from(request))
            .await?;
        let status = response.status();

        if status.is_server_error() {
            let message = error_message(response).await;
            return Err(ParleyError::Transport {
                message: format!("{SEND_FUNCTION} returned {status}: {message}"),
                source: None,
            });
        }
        if status.is_client_error() {
            // The function answered with a refusal body; surface it as the provider's word.
            return Ok(ProviderResult::Rejected {
                message: error_message(response).await,
            });
        }

        let parsed: SendResponse = decode(SEND_FUNCTION, response).await?;
        Ok(parsed.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::model::BackendConfig;
    use parley_core::types::{ConversationId, MediaKind, MessageId};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn functions(server: &MockServer) -> HttpFunctions {
        let config = BackendConfig {
            base_url: server.uri(),
            api_key: Some("anon".into()),
            ..BackendConfig::default()
        };
        HttpFunctions::new(BackendClient::new(&config).unwrap())
    }

    fn send_request(payload: SendPayload) -> SendRequest {
        SendRequest {
            organization_id: OrganizationId::from("org-1"),
            conversation_id: ConversationId::from("c1"),
            channel_instance_id: InstanceId::from("i1"),
            message_id: MessageId::from("m1"),
            recipient: "5511999998888".into(),
            sender_user_id: None,
            payload,
        }
    }

    #[tokio::test]
    async fn probe_maps_explicit_states() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/instance-status"))
            .and(body_partial_json(serde_json::json!({"instance_id": "i1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "connected"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/instance-status"))
            .and(body_partial_json(serde_json::json!({"instance_id": "i2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "connecting"})))
            .mount(&server)
            .await;

        let f = functions(&server);
        let org = OrganizationId::from("org-1");
        assert_eq!(
            f.probe_instance(&org, &InstanceId::from("i1")).await.unwrap(),
            ProbeAnswer::Connected
        );
        assert_eq!(
            f.probe_instance(&org, &InstanceId::from("i2")).await.unwrap(),
            ProbeAnswer::Indeterminate
        );
    }

    #[tokio::test]
    async fn probe_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/instance-status"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let result = functions(&server)
            .probe_instance(&OrganizationId::from("org-1"), &InstanceId::from("i1"))
            .await;
        assert!(matches!(result, Err(ParleyError::Transport { .. })));
    }

    #[tokio::test]
    async fn upload_target_refusal_is_target_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/media-upload-target"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(serde_json::json!({"error": "bucket quota exceeded"})),
            )
            .mount(&server)
            .await;

        let request = UploadTargetRequest {
            organization_id: OrganizationId::from("org-1"),
            conversation_id: ConversationId::from("c1"),
            mime_type: "image/jpeg".into(),
            kind: MediaKind::Image,
        };
        match functions(&server).request_upload_target(&request).await {
            Err(ParleyError::TargetUnavailable { message }) => {
                assert!(message.contains("403"), "got: {message}");
                assert!(message.contains("bucket quota exceeded"), "got: {message}");
            }
            other => panic!("expected TargetUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_target_decodes_signed_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/media-upload-target"))
            .and(body_partial_json(serde_json::json!({"media_type": "document"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "upload_url": "https://storage.example.co/upload/sign/abc",
                "path": "org-1/c1/report.pdf"
            })))
            .mount(&server)
            .await;

        let request = UploadTargetRequest {
            organization_id: OrganizationId::from("org-1"),
            conversation_id: ConversationId::from("c1"),
            mime_type: "application/pdf".into(),
            kind: MediaKind::Document,
        };
        let target = functions(&server)
            .request_upload_target(&request)
            .await
            .unwrap();
        assert_eq!(target.storage_path, "org-1/c1/report.pdf");
        assert!(target.write_url.ends_with("/abc"));
    }

    #[tokio::test]
    async fn send_success_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/send-message"))
            .and(body_partial_json(serde_json::json!({
                "instance_id": "i1",
                "message_type": "text",
                "content": "hello"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "message_id": "wamid.123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = functions(&server)
            .dispatch_send(&send_request(SendPayload::Text("hello".into())))
            .await
            .unwrap();
        assert_eq!(
            result,
            ProviderResult::Accepted {
                provider_message_id: Some("wamid.123".into())
            }
        );
    }

    #[tokio::test]
    async fn send_logical_failure_is_rejected_with_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/send-message"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "number not on WhatsApp"
            })))
            .mount(&server)
            .await;

        let result = functions(&server)
            .dispatch_send(&send_request(SendPayload::Text("hello".into())))
            .await
            .unwrap();
        assert_eq!(
            result,
            ProviderResult::Rejected {
                message: "number not on WhatsApp".into()
            }
        );
    }

    #[tokio::test]
    async fn media_send_references_storage_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/send-message"))
            .and(body_partial_json(serde_json::json!({
                "message_type": "audio",
                "media_path": "org-1/c1/voice.ogg",
                "mime_type": "audio/ogg;codecs=opus"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let payload = SendPayload::Media {
            kind: MediaKind::Audio,
            storage_path: "org-1/c1/voice.ogg".into(),
            mime_type: "audio/ogg;codecs=opus".into(),
            caption: None,
        };
        let result = functions(&server)
            .dispatch_send(&send_request(payload))
            .await
            .unwrap();
        assert!(matches!(result, ProviderResult::Accepted { .. }));
    }

    #[tokio::test]
    async fn send_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/send-message"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = functions(&server)
            .dispatch_send(&send_request(SendPayload::Text("hello".into())))
            .await;
        match result {
            Err(ParleyError::Transport { message, .. }) => assert!(message.contains("boom")),
            other => panic!("expected Transport, got {other:?}"),
        }
    }
}
