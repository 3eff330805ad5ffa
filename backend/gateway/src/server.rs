//! Line-protocol listener.

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::endpoint::{serve_connection, GatewayState};

/// Accept connections forever, one task per connection. With an acceptor,
/// the TLS handshake completes before the first line is read.
pub async fn run_line_server(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    gateway: GatewayState,
) -> Result<()> {
    info!(
        addr = %listener.local_addr()?,
        tls = acceptor.is_some(),
        "Line protocol server listening"
    );
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };
        debug!(peer = %peer, "Connection accepted");
        let gateway = gateway.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls) => serve_connection(tls, gateway).await,
                    Err(e) => warn!(peer = %peer, error = %e, "TLS handshake failed"),
                },
                None => serve_connection(stream, gateway).await,
            }
            debug!(peer = %peer, "Connection closed");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ChatHandler;
    use crate::protocol::ChatRequest;
    use crate::session_registry::{Session, SessionRegistry};
    use async_trait::async_trait;
    use lisa_core::Catalog;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    struct Nop;

    #[async_trait]
    impl ChatHandler for Nop {
        async fn on_chat(&self, _session: &Session, _chat: ChatRequest) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_plain_tcp_login() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let gateway = GatewayState {
            registry: SessionRegistry::new(),
            handler: Arc::new(Nop),
            catalog: Arc::new(Catalog::new("en", &HashMap::new())),
            bot_name: "Lisa".into(),
            log_frames: false,
        };
        let server = tokio::spawn(run_line_server(listener, None, gateway));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        write_half.write_all(b"{\"type\":\"hello\"}\n").await.unwrap();
        let reply: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["message"], "Error: unknown input type hello");

        write_half
            .write_all(b"{\"type\":\"command\",\"command\":\"login req\",\"from\":\"A\",\"zone\":\"Z\"}\n")
            .await
            .unwrap();
        let ack: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(ack["bot_name"], "Lisa");
        server.abort();
    }
}
