// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST implementation of [`DataStore`].
//!
//! Every request carries an `organization_id=eq.<org>` filter. Transport
//! failures, non-success statuses and undecodable bodies all surface as
//! [`ParleyError::DataUnavailable`]; nothing is retried here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::types::{
    AdapterType, ChannelInstance, Conversation, ConversationId, HealthStatus, InstanceId,
    Message, OrganizationId,
};
use parley_core::{DataStore, ParleyError, PluginAdapter};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::client::{eq, error_message, BackendClient};
use crate::rows::{ConversationRow, InstanceRow, MessagePatch, MessageRow};

const INSTANCES: &str = "channel_instances";
const CONVERSATIONS: &str = "conversations";
const MESSAGES: &str = "messages";

pub struct RestDataStore {
    client: BackendClient,
}

impl RestDataStore {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    async fn select<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, ParleyError> {
        let path = url.path().to_string();
        let response = self
            .client
            .http()
            .get(url)
            .send()
            .await
            .map_err(|e| ParleyError::data_unavailable(format!("GET {path} failed"), e))?;
        let response = ensure_success(response, &path).await?;
        let rows = response
            .json::<Vec<T>>()
            .await
            .map_err(|e| ParleyError::data_unavailable(format!("undecodable rows from {path}"), e))?;
        debug!(path = %path, rows = rows.len(), "rows fetched");
        Ok(rows)
    }

    async fn insert<B: Serialize + ?Sized>(&self, table: &str, body: &B) -> Result<(), ParleyError> {
        let url = self.client.table_url(table, &[])?;
        let response = self
            .client
            .http()
            .post(url)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await
            .map_err(|e| ParleyError::data_unavailable(format!("insert into {table} failed"), e))?;
        ensure_success(response, table).await?;
        Ok(())
    }

    async fn patch<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<(), ParleyError> {
        let path = url.path().to_string();
        let response = self
            .client
            .http()
            .patch(url)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await
            .map_err(|e| ParleyError::data_unavailable(format!("PATCH {path} failed"), e))?;
        ensure_success(response, &path).await?;
        Ok(())
    }

    fn conversation_url(
        &self,
        org: &OrganizationId,
        id: &ConversationId,
    ) -> Result<Url, ParleyError> {
        self.client.table_url(
            CONVERSATIONS,
            &[("organization_id", eq(org)), ("id", eq(id))],
        )
    }
}

async fn ensure_success(response: Response, what: &str) -> Result<Response, ParleyError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let message = error_message(response).await;
    Err(ParleyError::DataUnavailable {
        message: format!("{what} returned {status}: {message}"),
        source: None,
    })
}

#[async_trait]
impl PluginAdapter for RestDataStore {
    fn name(&self) -> &str {
        "rest-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::DataStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let url = self.client.table_url(INSTANCES, &[("limit", "1".into())])?;
        match self.client.http().get(url).send().await {
            Ok(r) if r.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(r) => Ok(HealthStatus::Unhealthy(format!(
                "data store returned {}",
                r.status()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("data store unreachable: {e}"))),
        }
    }
}

#[async_trait]
impl DataStore for RestDataStore {
    async fn list_instances(
        &self,
        org: &OrganizationId,
    ) -> Result<Vec<ChannelInstance>, ParleyError> {
        let url = self.client.table_url(
            INSTANCES,
            &[
                ("organization_id", eq(org)),
                ("deleted_at", "is.null".into()),
                ("order", "name.asc".into()),
            ],
        )?;
        let rows: Vec<InstanceRow> = self.select(url).await?;
        Ok(rows.into_iter().map(ChannelInstance::from).collect())
    }

    async fn get_instance(
        &self,
        org: &OrganizationId,
        id: &InstanceId,
    ) -> Result<Option<ChannelInstance>, ParleyError> {
        let url = self.client.table_url(
            INSTANCES,
            &[
                ("organization_id", eq(org)),
                ("id", eq(id)),
                ("deleted_at", "is.null".into()),
            ],
        )?;
        let rows: Vec<InstanceRow> = self.select(url).await?;
        Ok(rows.into_iter().next().map(ChannelInstance::from))
    }

    async fn list_conversations(
        &self,
        org: &OrganizationId,
    ) -> Result<Vec<Conversation>, ParleyError> {
        let url = self.client.table_url(
            CONVERSATIONS,
            &[
                ("organization_id", eq(org)),
                ("order", "last_message_at.desc".into()),
            ],
        )?;
        let rows: Vec<ConversationRow> = self.select(url).await?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    async fn find_conversations_by_address(
        &self,
        org: &OrganizationId,
        address: &str,
    ) -> Result<Vec<Conversation>, ParleyError> {
        let url = self.client.table_url(
            CONVERSATIONS,
            &[
                ("organization_id", eq(org)),
                ("contact_phone", eq(address)),
            ],
        )?;
        let rows: Vec<ConversationRow> = self.select(url).await?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    async fn get_conversation(
        &self,
        org: &OrganizationId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ParleyError> {
        let rows: Vec<ConversationRow> = self.select(self.conversation_url(org, id)?).await?;
        Ok(rows.into_iter().next().map(Conversation::from))
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), ParleyError> {
        self.insert(CONVERSATIONS, &ConversationRow::from(conversation))
            .await
    }

    async fn touch_conversation(
        &self,
        org: &OrganizationId,
        id: &ConversationId,
        at: DateTime<Utc>,
    ) -> Result<(), ParleyError> {
        self.patch(
            self.conversation_url(org, id)?,
            &serde_json::json!({ "last_message_at": at }),
        )
        .await
    }

    async fn mark_conversation_read(
        &self,
        org: &OrganizationId,
        id: &ConversationId,
    ) -> Result<(), ParleyError> {
        self.patch(
            self.conversation_url(org, id)?,
            &serde_json::json!({ "unread_count": 0 }),
        )
        .await
    }

    async fn list_messages(
        &self,
        org: &OrganizationId,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ParleyError> {
        let url = self.client.table_url(
            MESSAGES,
            &[
                ("organization_id", eq(org)),
                ("conversation_id", eq(conversation)),
                ("order", "created_at.asc,id.asc".into()),
            ],
        )?;
        let rows: Vec<MessageRow> = self.select(url).await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn insert_message(
        &self,
        org: &OrganizationId,
        message: &Message,
    ) -> Result<(), ParleyError> {
        self.insert(MESSAGES, &MessageRow::from_message(org, message))
            .await
    }

    async fn update_message(
        &self,
        org: &OrganizationId,
        message: &Message,
    ) -> Result<(), ParleyError> {
        // A receipt that already moved the row forward wins over this write.
        let stored: Vec<String> = message
            .status
            .overwritable_by()
            .map(|s| s.to_string())
            .collect();
        let url = self.client.table_url(
            MESSAGES,
            &[
                ("organization_id", eq(org)),
                ("id", eq(&message.id)),
                ("status", format!("in.({})", stored.join(","))),
            ],
        )?;
        self.patch(url, &MessagePatch::from(message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::model::BackendConfig;
    use parley_core::types::{DeliveryStatus, MessageKind};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> RestDataStore {
        let config = BackendConfig {
            base_url: server.uri(),
            api_key: Some("anon".into()),
            ..BackendConfig::default()
        };
        RestDataStore::new(BackendClient::new(&config).unwrap())
    }

    fn org() -> OrganizationId {
        OrganizationId::from("org-1")
    }

    #[tokio::test]
    async fn list_instances_scopes_by_organization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/channel_instances"))
            .and(query_param("organization_id", "eq.org-1"))
            .and(query_param("deleted_at", "is.null"))
            .and(header("apikey", "anon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "i1", "organization_id": "org-1", "name": "Sales",
                 "phone_number": "5511900000001", "is_connected": true},
                {"id": "i2", "organization_id": "org-1", "name": "Support",
                 "phone_number": "5511900000002", "is_connected": false}
            ])))
            .mount(&server)
            .await;

        let instances = store(&server).list_instances(&org()).await.unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].label, "Sales");
        assert!(!instances[1].declared_connected);
    }

    #[tokio::test]
    async fn unreachable_store_is_data_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/channel_instances"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(serde_json::json!({"message": "down"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = store(&server).list_instances(&org()).await.unwrap_err();
        match err {
            ParleyError::DataUnavailable { message, .. } => {
                assert!(message.contains("503"), "got: {message}");
                assert!(message.contains("down"), "got: {message}");
            }
            other => panic!("expected DataUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_messages_orders_by_creation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .and(query_param("conversation_id", "eq.c1"))
            .and(query_param("order", "created_at.asc,id.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "m1", "organization_id": "org-1", "conversation_id": "c1",
                 "direction": "inbound", "message_type": "text", "content": "oi",
                 "media_url": null, "status": "read", "error_message": null,
                 "sent_by": null, "created_at": "2026-03-01T12:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let messages = store(&server)
            .list_messages(&org(), &ConversationId::from("c1"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text.as_deref(), Some("oi"));
    }

    #[tokio::test]
    async fn update_message_patches_status_columns() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/messages"))
            .and(query_param("id", "eq.m9"))
            .and(query_param("status", "in.(sending,sent,delivered,failed)"))
            .and(body_partial_json(serde_json::json!({
                "status": "failed",
                "error_message": "number not on WhatsApp"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut msg = Message::outbound(
            ConversationId::from("c1"),
            MessageKind::Text,
            Some("hello".into()),
            None,
        );
        msg.id = parley_core::MessageId::from("m9");
        msg.fail("number not on WhatsApp");
        assert_eq!(msg.status, DeliveryStatus::Failed);

        store(&server).update_message(&org(), &msg).await.unwrap();
    }

    #[tokio::test]
    async fn sent_update_only_matches_unreceipted_rows() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/messages"))
            .and(query_param("id", "eq.m7"))
            .and(query_param("status", "in.(sending,sent)"))
            .and(body_partial_json(serde_json::json!({"status": "sent"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut msg = Message::outbound(
            ConversationId::from("c1"),
            MessageKind::Text,
            Some("hello".into()),
            None,
        );
        msg.id = parley_core::MessageId::from("m7");
        msg.advance(DeliveryStatus::Sent);

        store(&server).update_message(&org(), &msg).await.unwrap();
    }

    #[tokio::test]
    async fn mark_read_resets_unread_counter() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/conversations"))
            .and(query_param("id", "eq.c1"))
            .and(query_param("organization_id", "eq.org-1"))
            .and(body_partial_json(serde_json::json!({"unread_count": 0})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .mark_conversation_read(&org(), &ConversationId::from("c1"))
            .await
            .unwrap();
    }
}
