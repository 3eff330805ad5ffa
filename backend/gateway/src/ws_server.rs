//! Websocket bridge and health API.
//!
//! Browser clients speak the same protocol over websocket text frames.
//! A connection that opens with anything other than a login request is
//! logged in as the configured web identity; plain text counts as a chat
//! body.

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::endpoint::{Endpoint, GatewayState};
use crate::protocol::{decode_line, ChatRequest, ClientMessage, OutboundFrame};

/// Shared state of the web server.
#[derive(Clone)]
pub struct WebBridge {
    pub gateway: GatewayState,
    pub client_name: String,
    pub zone: String,
}

pub fn router(bridge: WebBridge) -> Router {
    Router::new()
        .route("/websocket", get(ws_handler))
        .route("/api/health", get(health))
        .with_state(bridge)
}

pub async fn start_web_server(addr: SocketAddr, bridge: WebBridge) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Web bridge listening on {}", addr);
    axum::serve(listener, router(bridge)).await?;
    Ok(())
}

async fn health(State(bridge): State<WebBridge>) -> impl IntoResponse {
    let gateway = &bridge.gateway;
    Json(json!({
        "status": "ok",
        "bot_name": gateway.bot_name,
        "sessions": gateway.registry.session_count().await,
        "zones": gateway.registry.zone_count().await,
        "steps": gateway.handler.step_count().await,
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(bridge): State<WebBridge>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, bridge))
}

async fn handle_connection(socket: WebSocket, bridge: WebBridge) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.to_line() {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Failed to serialize frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut endpoint = Endpoint::new(bridge.gateway.clone(), tx);
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => on_text(&mut endpoint, &bridge, &text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }
    endpoint.close().await;
    drop(endpoint);

    tokio::select! {
        _ = &mut send_task => {}
        _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => send_task.abort(),
    }
    debug!("WebSocket connection closed");
}

async fn on_text(endpoint: &mut Endpoint, bridge: &WebBridge, text: &str) {
    let decoded = decode_line(text);
    if endpoint.session().is_none() && !matches!(decoded, Ok(ClientMessage::LoginRequest { .. })) {
        endpoint.login(&bridge.client_name, &bridge.zone).await;
    }
    if text.trim_start().starts_with('{') {
        endpoint.on_line(text).await;
    } else if !text.trim().is_empty() {
        endpoint.on_chat(ChatRequest::text(text.trim())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{ChatHandler, EndpointState};
    use crate::session_registry::{Session, SessionRegistry};
    use async_trait::async_trait;
    use lisa_core::Catalog;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        bodies: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl ChatHandler for Recorder {
        async fn on_chat(&self, session: &Session, chat: ChatRequest) -> anyhow::Result<()> {
            self.bodies.lock().await.push((session.name.clone(), chat.body));
            Ok(())
        }

        async fn step_count(&self) -> usize {
            7
        }
    }

    fn bridge(recorder: Arc<Recorder>) -> WebBridge {
        WebBridge {
            gateway: GatewayState {
                registry: SessionRegistry::new(),
                handler: recorder,
                catalog: Arc::new(Catalog::new("en", &HashMap::new())),
                bot_name: "Lisa".into(),
                log_frames: false,
            },
            client_name: "Lisa-Web".into(),
            zone: "WebSocket".into(),
        }
    }

    #[tokio::test]
    async fn test_plain_text_logs_in_implicitly() {
        let recorder = Arc::new(Recorder::default());
        let bridge = bridge(recorder.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut endpoint = Endpoint::new(bridge.gateway.clone(), tx);

        on_text(&mut endpoint, &bridge, "what can you do").await;
        let ack = rx.try_recv().unwrap().to_value().unwrap();
        assert_eq!(ack["command"], "login ack");
        assert_eq!(ack["zone"], "WebSocket");
        let bodies = recorder.bodies.lock().await;
        assert_eq!(bodies[0], ("Lisa-Web".to_string(), Some("what can you do".to_string())));
    }

    #[tokio::test]
    async fn test_explicit_login_is_honoured() {
        let recorder = Arc::new(Recorder::default());
        let bridge = bridge(recorder);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut endpoint = Endpoint::new(bridge.gateway.clone(), tx);

        on_text(
            &mut endpoint,
            &bridge,
            r#"{"type":"command","command":"login req","from":"Tablet","zone":"Salon"}"#,
        )
        .await;
        let EndpointState::LoggedIn(session) = endpoint.state() else {
            panic!("expected login");
        };
        assert_eq!(session.name, "Tablet");
        assert_eq!(bridge.gateway.registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let recorder = Arc::new(Recorder::default());
        let bridge = bridge(recorder);
        bridge.gateway.registry.resolve_session("A", "Z").await.unwrap();
        let body = health(State(bridge)).await.into_response().into_body();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["sessions"], 1);
        assert_eq!(value["zones"], 1);
        assert_eq!(value["steps"], 7);
    }
}
