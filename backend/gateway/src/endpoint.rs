//! Protocol Endpoint.
//!
//! One [`Endpoint`] per physical connection:
//! `Unauthenticated → LoggedIn → Closed`. Transports plug in through
//! [`serve_connection`] (line streams) or feed lines directly (websocket
//! bridge).

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use lisa_core::Catalog;
use lisa_logging::{DialogEvent, DialogEventLogger};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

use crate::protocol::{
    decode_line, ChatRequest, ClientMessage, OutboundFrame, ProtocolError, ServerCommand, ServerMessage,
};
use crate::session_registry::{Session, SessionRegistry, TransportHandle};

/// Longest accepted inbound line, in bytes.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Receiver of logged-in traffic; implemented by the dispatch engine.
#[async_trait]
pub trait ChatHandler: Send + Sync {
    /// Called after every successful login.
    async fn on_login(&self, _session: &Session) {}

    /// Handle one chat payload. Errors surface only in diagnostic mode.
    async fn on_chat(&self, session: &Session, chat: ChatRequest) -> anyhow::Result<()>;

    /// Number of recorded dialog steps, reported by the health API.
    async fn step_count(&self) -> usize {
        0
    }
}

/// Everything a connection needs from the process.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: SessionRegistry,
    pub handler: Arc<dyn ChatHandler>,
    pub catalog: Arc<Catalog>,
    pub bot_name: String,
    /// Log every inbound and outbound frame.
    pub log_frames: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EndpointState {
    Unauthenticated,
    LoggedIn(Session),
    Closed,
}

pub struct Endpoint {
    state: EndpointState,
    transport: TransportHandle,
    gateway: GatewayState,
}

impl Endpoint {
    pub fn new(gateway: GatewayState, tx: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            state: EndpointState::Unauthenticated,
            transport: TransportHandle::new(tx),
            gateway,
        }
    }

    pub fn state(&self) -> &EndpointState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            EndpointState::LoggedIn(session) => Some(session),
            _ => None,
        }
    }

    /// Process one inbound line.
    pub async fn on_line(&mut self, line: &str) {
        if matches!(self.state, EndpointState::Closed) {
            return;
        }
        if line.trim().is_empty() {
            return;
        }
        if self.gateway.log_frames {
            let session = self.session().map(|s| s.id.to_string()).unwrap_or_default();
            DialogEventLogger::log_event(&session, DialogEvent::Inbound { frame: line.to_string() });
        }

        match decode_line(line) {
            Ok(ClientMessage::LoginRequest { from, zone }) => self.login(&from, &zone).await,
            Ok(ClientMessage::Chat(chat)) => self.on_chat(chat).await,
            Err(e) => {
                warn!(error = %e, "Rejected inbound frame");
                self.reply_error(&e);
            }
        }
    }

    /// Bind this connection to the `(from, zone)` session and send the ack.
    pub async fn login(&mut self, from: &str, zone: &str) {
        let registry = &self.gateway.registry;
        let session = match registry.resolve_session(from, zone).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, from = %from, zone = %zone, "Login refused");
                self.send(ServerMessage::error(e.to_string()));
                return;
            }
        };

        if let EndpointState::LoggedIn(previous) = &self.state {
            if previous.id != session.id {
                registry.detach_transport(previous.id, self.transport.id()).await;
            }
        }
        registry.attach_transport(session.id, self.transport.clone()).await;
        info!(session_id = %session.id, from = %from, zone = %zone, "Client logged in");

        self.state = EndpointState::LoggedIn(session.clone());
        self.send(ServerMessage::Command(ServerCommand::LoginAck {
            bot_name: self.gateway.bot_name.clone(),
        }));
        self.gateway.handler.on_login(&session).await;
    }

    /// Forward a chat payload; refused before login.
    pub async fn on_chat(&mut self, chat: ChatRequest) {
        let Some(session) = self.session().cloned() else {
            self.reply_error(&ProtocolError::NotLoggedIn);
            return;
        };
        if let Err(e) = self.gateway.handler.on_chat(&session, chat).await {
            error!(session_id = %session.id, error = %e, "Chat handling failed");
        }
    }

    /// Transport lost: detach from the session, stop accepting input.
    pub async fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, EndpointState::Closed);
        if let EndpointState::LoggedIn(session) = previous {
            self.gateway
                .registry
                .detach_transport(session.id, self.transport.id())
                .await;
            info!(session_id = %session.id, "Client disconnected");
        }
    }

    fn reply_error(&self, error: &ProtocolError) {
        self.send(ServerMessage::error(error.localized(&self.gateway.catalog)));
    }

    /// Write to this connection only.
    fn send(&self, message: ServerMessage) {
        let frame = match self.session() {
            Some(session) => OutboundFrame::addressed(message, &session.name, &session.zone),
            None => OutboundFrame::unaddressed(message),
        };
        if !self.transport.send(frame) {
            debug!(transport = %self.transport.id(), "Connection writer closed; frame dropped");
        }
    }
}

/// Drive one line-delimited connection until it closes.
pub async fn serve_connection<S>(stream: S, gateway: GatewayState)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut sink = FramedWrite::new(writer, LinesCodec::new());
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let log_frames = gateway.log_frames;

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let line = match frame.to_line() {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "Failed to serialize frame");
                    continue;
                }
            };
            if log_frames {
                DialogEventLogger::log_event(
                    frame.to.as_deref().unwrap_or_default(),
                    DialogEvent::Outbound { frame: line.clone() },
                );
            }
            if let Err(e) = sink.send(line).await {
                debug!(error = %e, "Write failed, closing writer");
                break;
            }
        }
    });

    let mut endpoint = Endpoint::new(gateway, tx);
    while let Some(next) = lines.next().await {
        match next {
            Ok(line) => endpoint.on_line(&line).await,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!(max = MAX_LINE_LENGTH, "Inbound line too long, discarded");
                endpoint.reply_error(&ProtocolError::InvalidJson("line too long".into()));
            }
            Err(LinesCodecError::Io(e)) => {
                debug!(error = %e, "Read failed");
                break;
            }
        }
    }
    endpoint.close().await;
    // The writer drains once every sender (ours and the registry's) is gone.
    drop(endpoint);
    if let Err(e) = writer_task.await {
        warn!(error = %e, "Writer task failed");
    }
}
