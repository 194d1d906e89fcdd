//! Websocket client for the hosted realtime service.
//!
//! Each [`ChannelSpec`] gets its own connection and background task.  The task
//! joins the channel with its change bindings, keeps it alive with
//! heartbeats, forwards matching row changes to the sink and reconnects with
//! exponential backoff when the socket drops.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use paporeto_shared::types::ChangeKind;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{ChangeSink, ChannelHandle, ChannelSpec, RowChange};
use crate::error::BackendError;

const HEARTBEAT_SECS: u64 = 25;
const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 30;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct RealtimeEndpoint {
    pub url: String,
    pub access_token: String,
}

/// Handle to a channel task.  Dropping it aborts the task; unsubscribing
/// lets the task leave the channel before it exits.
pub struct RealtimeChannel {
    name: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ChannelHandle for RealtimeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn unsubscribe(mut self: Box<Self>) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}

/// Start the background task for `spec` on the current tokio runtime.
pub fn spawn_channel(
    endpoint: RealtimeEndpoint,
    spec: ChannelSpec,
    sink: ChangeSink,
) -> Result<RealtimeChannel, BackendError> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| BackendError::Realtime("no async runtime available".into()))?;
    let (tx, rx) = oneshot::channel();
    let name = spec.name.clone();
    let task = runtime.spawn(run_channel(endpoint, spec, sink, rx));
    Ok(RealtimeChannel {
        name,
        shutdown: Some(tx),
        task,
    })
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

async fn run_channel(
    endpoint: RealtimeEndpoint,
    spec: ChannelSpec,
    sink: ChangeSink,
    mut shutdown: oneshot::Receiver<()>,
) {
    let topic = format!("realtime:{}", spec.name);
    let mut backoff_secs = INITIAL_BACKOFF_SECS;

    loop {
        match tokio_tungstenite::connect_async(endpoint.url.as_str()).await {
            Ok((socket, _response)) => {
                backoff_secs = INITIAL_BACKOFF_SECS;
                info!(channel = %spec.name, "realtime connected");
                match run_session(socket, &topic, &endpoint, &spec, &sink, &mut shutdown).await {
                    SessionEnd::Shutdown => {
                        info!(channel = %spec.name, "realtime channel closed");
                        return;
                    }
                    SessionEnd::Disconnected => {
                        warn!(channel = %spec.name, retry_in = backoff_secs, "realtime disconnected");
                    }
                }
            }
            Err(e) => {
                warn!(channel = %spec.name, error = %e, retry_in = backoff_secs, "realtime connect failed");
            }
        }

        tokio::select! {
            _ = &mut shutdown => return,
            _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
        }
        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
    }
}

async fn run_session(
    socket: Socket,
    topic: &str,
    endpoint: &RealtimeEndpoint,
    spec: &ChannelSpec,
    sink: &ChangeSink,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let (mut write, mut read) = socket.split();
    let mut next_ref: u64 = 1;

    let join = join_frame(topic, spec, &endpoint.access_token, next_ref);
    if let Err(e) = write.send(WsMessage::Text(join.to_string())).await {
        warn!(channel = %spec.name, error = %e, "realtime join failed");
        return SessionEnd::Disconnected;
    }

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                next_ref += 1;
                let leave = json!({ "topic": topic, "event": "phx_leave", "payload": {}, "ref": next_ref.to_string() });
                let _ = write.send(WsMessage::Text(leave.to_string())).await;
                let _ = write.close().await;
                return SessionEnd::Shutdown;
            }
            _ = heartbeat.tick() => {
                next_ref += 1;
                let beat = json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": next_ref.to_string() });
                if write.send(WsMessage::Text(beat.to_string())).await.is_err() {
                    return SessionEnd::Disconnected;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(change) = parse_frame(&text, topic, spec) {
                        sink(change);
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = write.send(WsMessage::Pong(data)).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => return SessionEnd::Disconnected,
                Some(Err(e)) => {
                    warn!(channel = %spec.name, error = %e, "realtime read error");
                    return SessionEnd::Disconnected;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

pub(crate) fn join_frame(topic: &str, spec: &ChannelSpec, access_token: &str, join_ref: u64) -> Value {
    let changes: Vec<Value> = spec
        .bindings
        .iter()
        .map(|binding| {
            let mut entry = json!({
                "event": binding.event.as_str(),
                "schema": "public",
                "table": binding.table,
            });
            if let Some(filter) = binding.filter_expr() {
                entry["filter"] = Value::String(filter);
            }
            entry
        })
        .collect();

    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": changes,
            },
            "access_token": access_token,
        },
        "ref": join_ref.to_string(),
        "join_ref": join_ref.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: ChangeKind,
    table: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

/// Extract a row change addressed to `topic`.  Control frames are logged and
/// dropped.
pub(crate) fn parse_frame(text: &str, topic: &str, spec: &ChannelSpec) -> Option<RowChange> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "unparseable realtime frame");
            return None;
        }
    };
    if frame.topic != topic {
        return None;
    }

    match frame.event.as_str() {
        "postgres_changes" => {
            let data: ChangeData = serde_json::from_value(frame.payload.get("data")?.clone()).ok()?;
            // The server applies column filters; only table and event are rechecked.
            let wanted = spec
                .bindings
                .iter()
                .any(|b| b.table == data.table && b.event.matches(data.kind));
            wanted.then(|| RowChange {
                table: data.table,
                kind: data.kind,
                new: data.record.filter(|r| !r.is_null()),
                old: data.old_record.filter(|r| !r.is_null()),
            })
        }
        "phx_reply" => {
            let status = frame.payload.get("status").and_then(Value::as_str).unwrap_or("");
            if status != "ok" {
                warn!(topic, status, response = %frame.payload["response"], "realtime join rejected");
            }
            None
        }
        "phx_error" | "phx_close" => {
            warn!(topic, event = %frame.event, "realtime channel error");
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChangeBinding, ChangeEvent};

    fn spec() -> ChannelSpec {
        ChannelSpec::new("msgs_group_g1")
            .on(ChangeBinding::new(ChangeEvent::Insert, "messages").filter_eq("group_id", "g1"))
            .on(ChangeBinding::new(ChangeEvent::Delete, "messages"))
    }

    #[test]
    fn join_frame_lists_bindings() {
        let frame = join_frame("realtime:msgs_group_g1", &spec(), "tok", 1);
        assert_eq!(frame["event"], "phx_join");
        let changes = frame["payload"]["config"]["postgres_changes"].as_array().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0]["event"], "INSERT");
        assert_eq!(changes[0]["filter"], "group_id=eq.g1");
        assert!(changes[1].get("filter").is_none());
        assert_eq!(frame["payload"]["access_token"], "tok");
    }

    #[test]
    fn change_frames_become_row_changes() {
        let text = r#"{
            "topic": "realtime:msgs_group_g1",
            "event": "postgres_changes",
            "payload": { "data": {
                "type": "DELETE", "table": "messages",
                "record": null, "old_record": { "id": "m9" }
            }},
            "ref": null
        }"#;
        let change = parse_frame(text, "realtime:msgs_group_g1", &spec()).unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert!(change.new.is_none());
        assert_eq!(change.record().unwrap()["id"], "m9");
    }

    #[test]
    fn unrelated_frames_are_ignored() {
        let update = r#"{"topic":"realtime:msgs_group_g1","event":"postgres_changes",
            "payload":{"data":{"type":"UPDATE","table":"messages","record":{"id":"m1"}}}}"#;
        assert!(parse_frame(update, "realtime:msgs_group_g1", &spec()).is_none());

        let other_topic = r#"{"topic":"realtime:typing_g1","event":"postgres_changes",
            "payload":{"data":{"type":"INSERT","table":"messages","record":{"id":"m1"}}}}"#;
        assert!(parse_frame(other_topic, "realtime:msgs_group_g1", &spec()).is_none());

        let reply = r#"{"topic":"realtime:msgs_group_g1","event":"phx_reply","payload":{"status":"ok","response":{}}}"#;
        assert!(parse_frame(reply, "realtime:msgs_group_g1", &spec()).is_none());
        assert!(parse_frame("not json", "realtime:msgs_group_g1", &spec()).is_none());
    }
}
