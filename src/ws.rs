//! ==============================================================================
//! ws.rs - websocket event surface
//! ==============================================================================
//!
//! purpose:
//!     the same operations as the http routes, for clients that keep a socket
//!     open. frames are json text:
//!
//!         -> {"event": "fetch_sensor_data", "data": {"count": 5}}
//!         <- {"event": "fetch_sensor_data_response", "data": {...}}
//!         <- {"event": "fetch_sensor_data_error", "data": {"error": "..."}}
//!
//!     audio travels base64-encoded inside `data`. a frame that is not an
//!     event at all, or names an unknown event, is answered with `error`.
//!
//! relationships:
//!     - used by: server.rs (GET /ws)
//!     - calls: dispatcher.rs
//!
//! ==============================================================================

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatcher::GatewayDispatcher;
use crate::error::{GatewayError, Result};

#[derive(Debug, Deserialize)]
struct InboundEvent {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct OutboundEvent {
    pub event: String,
    pub data: Value,
}

impl OutboundEvent {
    fn error(event: impl Into<String>, err: GatewayError) -> Self {
        Self {
            event: event.into(),
            data: serde_json::json!({ "error": err.to_string() }),
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(dispatcher): State<GatewayDispatcher>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, dispatcher))
}

async fn handle_socket(mut socket: WebSocket, dispatcher: GatewayDispatcher) {
    tracing::debug!("[WS] client connected");
    while let Some(msg) = socket.recv().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("[WS] receive failed: {}", e);
                break;
            }
        };

        let reply = match msg {
            Message::Text(text) => handle_text(&dispatcher, &text).await,
            Message::Binary(_) => OutboundEvent::error(
                "error",
                GatewayError::validation("binary frames are not supported, send base64 in a text event"),
            ),
            Message::Close(_) => break,
            // ping/pong are answered by axum
            _ => continue,
        };

        let frame = match serde_json::to_string(&reply) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("[WS] could not encode reply: {}", e);
                continue;
            }
        };
        if socket.send(Message::Text(frame)).await.is_err() {
            break;
        }
    }
    tracing::debug!("[WS] client disconnected");
}

/// run one text frame through the dispatcher
pub async fn handle_text(dispatcher: &GatewayDispatcher, text: &str) -> OutboundEvent {
    let inbound: InboundEvent = match serde_json::from_str(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            return OutboundEvent::error(
                "error",
                GatewayError::validation(format!("Invalid event frame: {}", e)),
            )
        }
    };

    let name = inbound.event.as_str();
    let data = inbound.data;
    let result = match name {
        "upload_audio" => encode(dispatcher.upload_audio_envelope(data).await),
        "request_audio" => encode(dispatcher.request_audio_envelope(data).await),
        "log_sensor_data" => encode(dispatcher.log_sensor_data(data).await),
        "fetch_sensor_data" => encode(dispatcher.fetch_sensor_data(data.get("count")).await),
        "select_language" => match data.get("lang").and_then(Value::as_str) {
            Some(code) => encode(dispatcher.select_language(code)),
            None => Err(GatewayError::validation("Invalid language")),
        },
        "current_selection" => encode(Ok(dispatcher.current_selection())),
        other => {
            return OutboundEvent::error(
                "error",
                GatewayError::validation(format!("Unknown event: {}", other)),
            )
        }
    };

    match result {
        Ok(data) => OutboundEvent { event: format!("{}_response", name), data },
        Err(err) => {
            tracing::debug!("[WS] {} failed: {}", name, err);
            OutboundEvent::error(format!("{}_error", name), err)
        }
    }
}

fn encode<T: Serialize>(result: Result<T>) -> Result<Value> {
    result.and_then(|body| {
        serde_json::to_value(body)
            .map_err(|e| GatewayError::storage(format!("Failed to encode response: {}", e)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::scratch;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::json;

    async fn send(dispatcher: &GatewayDispatcher, frame: Value) -> OutboundEvent {
        handle_text(dispatcher, &frame.to_string()).await
    }

    #[tokio::test]
    async fn sensor_events_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let gw = scratch(dir.path()).await;

        let saved = send(
            &gw,
            json!({"event": "log_sensor_data", "data": {
                "device_id": "AGRO-001", "timestamp": "2025-03-01T10:00:00",
                "light_value": 320, "moisture_value": 690
            }}),
        )
        .await;
        assert_eq!(saved, OutboundEvent { event: "log_sensor_data_response".into(), data: json!({"status": "saved"}) });

        let fetched = send(&gw, json!({"event": "fetch_sensor_data", "data": {"count": 4}})).await;
        assert_eq!(fetched.event, "fetch_sensor_data_response");
        assert_eq!(fetched.data["entries_returned"], 1);
        assert_eq!(fetched.data["message"], "max data in DB is 1");
        assert_eq!(fetched.data["data"][0]["device_id"], "AGRO-001");
    }

    #[tokio::test]
    async fn store_failures_become_error_events() {
        let dir = tempfile::tempdir().unwrap();
        let gw = scratch(dir.path()).await;

        let empty = send(&gw, json!({"event": "fetch_sensor_data"})).await;
        assert_eq!(empty.event, "fetch_sensor_data_error");
        assert_eq!(empty.data, json!({"error": "No sensor data available"}));

        let missing = send(&gw, json!({"event": "request_audio", "data": {"lang": "sw"}})).await;
        assert_eq!(missing.event, "request_audio_error");
        assert_eq!(missing.data, json!({"error": "File Swahili.wav not found"}));
    }

    #[tokio::test]
    async fn audio_travels_as_base64() {
        let dir = tempfile::tempdir().unwrap();
        let gw = scratch(dir.path()).await;
        let audio = STANDARD.encode(b"RIFF....WAVE");

        let up = send(&gw, json!({"event": "upload_audio", "data": {"audio": audio, "lang": "en"}})).await;
        assert_eq!(up.data, json!({"status": "received", "filename": "English.wav"}));

        let down = send(&gw, json!({"event": "request_audio", "data": {"lang": "en"}})).await;
        assert_eq!(down.event, "request_audio_response");
        assert_eq!(down.data["audio"], audio);
    }

    #[tokio::test]
    async fn selection_events() {
        let dir = tempfile::tempdir().unwrap();
        let gw = scratch(dir.path()).await;

        let bad = send(&gw, json!({"event": "select_language", "data": {"lang": "fr"}})).await;
        assert_eq!(bad.event, "select_language_error");
        assert_eq!(bad.data, json!({"error": "Invalid language"}));

        let ok = send(&gw, json!({"event": "select_language", "data": {"lang": "ha"}})).await;
        assert_eq!(ok.data, json!({"lang": "ha"}));

        let current = send(&gw, json!({"event": "current_selection"})).await;
        assert_eq!(current.data, json!({"cmd": "ha", "audio_url": "/api/audio2?lang=ha"}));
    }

    #[tokio::test]
    async fn garbage_and_unknown_events() {
        let dir = tempfile::tempdir().unwrap();
        let gw = scratch(dir.path()).await;

        let garbage = handle_text(&gw, "not json").await;
        assert_eq!(garbage.event, "error");

        let unknown = send(&gw, json!({"event": "reboot"})).await;
        assert_eq!(unknown.event, "error");
        assert_eq!(unknown.data, json!({"error": "Unknown event: reboot"}));
    }
}
