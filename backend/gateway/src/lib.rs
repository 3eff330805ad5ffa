//! Lisa Gateway
//!
//! Session Registry, line-protocol framing and handshake, the TCP/TLS
//! listener, and the websocket bridge.

pub mod endpoint;
pub mod protocol;
pub mod server;
pub mod session_registry;
pub mod tls;
pub mod ws_server;

pub use endpoint::{ChatHandler, Endpoint, EndpointState, GatewayState, serve_connection};
pub use protocol::{ChatRequest, ClientMessage, OutboundFrame, ProtocolError, ServerCommand, ServerMessage};
pub use server::run_line_server;
pub use session_registry::{RegistryError, Session, SessionRegistry, TransportHandle, Zone};
pub use tls::build_acceptor;
pub use ws_server::{WebBridge, start_web_server};
