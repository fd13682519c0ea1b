// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push path: row-change notifications over the backend's WebSocket channel.
//!
//! The socket speaks the Phoenix channel protocol. One channel is joined per
//! organization with a `postgres_changes` filter for each watched table, and a
//! heartbeat keeps the socket open. Frames are decoded into [`ChangeEvent`]s
//! and forwarded on an mpsc channel; the socket task ends when the receiver is
//! dropped or the server closes the connection.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parley_config::model::BackendConfig;
use parley_core::types::{
    AdapterType, ChangeEvent, ChangeKind, ChangeTable, HealthStatus, OrganizationId,
};
use parley_core::{ChangeFeed, ParleyError, PluginAdapter};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 256;
const WATCHED_TABLES: [ChangeTable; 3] = [
    ChangeTable::ChannelInstances,
    ChangeTable::Conversations,
    ChangeTable::Messages,
];

#[derive(Debug, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    table: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

pub struct RealtimeFeed {
    endpoint: String,
    api_key: String,
}

impl RealtimeFeed {
    pub fn new(config: &BackendConfig) -> Result<Self, ParleyError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ParleyError::Config("backend.api_key is required".into()))?;
        Ok(Self {
            endpoint: config.realtime_endpoint(),
            api_key,
        })
    }

    fn socket_url(&self) -> String {
        format!("{}?apikey={}&vsn=1.0.0", self.endpoint, self.api_key)
    }
}

/// Channel topic joined for one organization.
pub fn topic_for(org: &OrganizationId) -> String {
    format!("realtime:parley-{org}")
}

/// The `phx_join` frame subscribing to every watched table of `org`.
pub fn join_frame(org: &OrganizationId) -> String {
    let changes: Vec<Value> = WATCHED_TABLES
        .iter()
        .map(|table| {
            json!({
                "event": "*",
                "schema": "public",
                "table": table.to_string(),
                "filter": format!("organization_id=eq.{org}"),
            })
        })
        .collect();
    json!({
        "topic": topic_for(org),
        "event": "phx_join",
        "payload": { "config": { "postgres_changes": changes } },
        "ref": "1",
    })
    .to_string()
}

fn heartbeat_frame(seq: u64) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": seq.to_string(),
    })
    .to_string()
}

/// Decodes one text frame. Returns `None` for control frames, other topics,
/// unknown tables and rows of another organization.
pub fn decode_frame(org: &OrganizationId, text: &str) -> Option<ChangeEvent> {
    let frame: Frame = serde_json::from_str(text).ok()?;
    if frame.event != "postgres_changes" || frame.topic != topic_for(org) {
        return None;
    }
    let payload: ChangePayload = serde_json::from_value(frame.payload).ok()?;
    let data = payload.data;
    let table = ChangeTable::from_str(&data.table).ok()?;
    let kind = ChangeKind::from_str(&data.kind.to_ascii_uppercase()).ok()?;

    let row = data
        .record
        .filter(|r| !r.is_null() && r.as_object().is_some_and(|o| !o.is_empty()))
        .or(data.old_record);
    if let Some(row_org) = row
        .as_ref()
        .and_then(|r| r.get("organization_id"))
        .and_then(Value::as_str)
        && row_org != org.as_str()
    {
        return None;
    }
    let record_id = row.as_ref().and_then(|r| r.get("id")).and_then(|id| match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    Some(ChangeEvent {
        organization_id: org.clone(),
        table,
        kind,
        record_id,
    })
}

#[async_trait]
impl PluginAdapter for RealtimeFeed {
    fn name(&self) -> &str {
        "realtime-feed"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ChangeFeed
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        match connect_async(self.socket_url()).await {
            Ok((mut stream, _)) => {
                let _ = stream.close(None).await;
                Ok(HealthStatus::Healthy)
            }
            Err(e) => Ok(HealthStatus::Degraded(format!(
                "change stream unreachable, polling only: {e}"
            ))),
        }
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(
        &self,
        org: &OrganizationId,
    ) -> Result<mpsc::Receiver<ChangeEvent>, ParleyError> {
        let (stream, _response) = connect_async(self.socket_url())
            .await
            .map_err(|e| ParleyError::transport("failed to connect change stream", e))?;
        let (mut sink, mut source) = stream.split();

        sink.send(WsMessage::Text(join_frame(org).into()))
            .await
            .map_err(|e| ParleyError::transport("failed to join change channel", e))?;
        info!(org = %org, "joined change stream");

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let org = org.clone();
        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            let mut seq: u64 = 1;
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = heartbeat.tick() => {
                        seq += 1;
                        if let Err(e) = sink.send(WsMessage::Text(heartbeat_frame(seq).into())).await {
                            warn!(error = %e, "change stream heartbeat failed");
                            break;
                        }
                    }
                    next = source.next() => {
                        let text = match next {
                            Some(Ok(WsMessage::Text(text))) => text.to_string(),
                            Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                                Ok(text) => text,
                                Err(_) => continue,
                            },
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                warn!(error = %e, "change stream read failed");
                                break;
                            }
                        };
                        if let Some(event) = decode_frame(&org, &text) {
                            debug!(table = %event.table, kind = %event.kind, "change received");
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            let _ = sink.close().await;
            info!(org = %org, "change stream closed");
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> OrganizationId {
        OrganizationId::from("org-1")
    }

    fn change(table: &str, kind: &str, record: Value) -> String {
        json!({
            "topic": "realtime:parley-org-1",
            "event": "postgres_changes",
            "payload": { "data": { "table": table, "type": kind, "record": record } },
            "ref": null,
        })
        .to_string()
    }

    #[test]
    fn join_subscribes_every_table_scoped_to_org() {
        let frame: Value = serde_json::from_str(&join_frame(&org())).unwrap();
        assert_eq!(frame["event"], "phx_join");
        let changes = frame["payload"]["config"]["postgres_changes"]
            .as_array()
            .unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes
            .iter()
            .all(|c| c["filter"] == "organization_id=eq.org-1"));
        assert!(changes.iter().any(|c| c["table"] == "messages"));
    }

    #[test]
    fn decodes_message_insert() {
        let text = change(
            "messages",
            "INSERT",
            json!({"id": "m1", "organization_id": "org-1"}),
        );
        let event = decode_frame(&org(), &text).unwrap();
        assert_eq!(event.table, ChangeTable::Messages);
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.record_id.as_deref(), Some("m1"));
        assert!(event.touches_messages());
    }

    #[test]
    fn delete_uses_old_record() {
        let text = json!({
            "topic": "realtime:parley-org-1",
            "event": "postgres_changes",
            "payload": { "data": {
                "table": "conversations", "type": "DELETE",
                "record": {}, "old_record": {"id": "c9"}
            }},
        })
        .to_string();
        let event = decode_frame(&org(), &text).unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.record_id.as_deref(), Some("c9"));
    }

    #[test]
    fn ignores_other_organizations_and_control_frames() {
        let foreign = change(
            "messages",
            "UPDATE",
            json!({"id": "m1", "organization_id": "org-2"}),
        );
        assert!(decode_frame(&org(), &foreign).is_none());

        let reply = json!({
            "topic": "realtime:parley-org-1",
            "event": "phx_reply",
            "payload": {"status": "ok"},
            "ref": "1",
        })
        .to_string();
        assert!(decode_frame(&org(), &reply).is_none());
        assert!(decode_frame(&org(), "not json").is_none());
    }

    #[test]
    fn ignores_unwatched_tables() {
        let text = change("customers", "INSERT", json!({"id": "x"}));
        assert!(decode_frame(&org(), &text).is_none());
    }
}
