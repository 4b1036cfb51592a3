//! # Transport Abstraction
//!
//! The core reaches the network through one narrow seam: binary frames in,
//! binary frames out, blocking calls. This is the single hook for test
//! doubles and for choosing between transport libraries; nothing in the
//! trait exposes an async primitive, so the core stays runtime-agnostic.
//!
//! ## Suspension Points
//!
//! [`Transport::send`] and [`Transport::recv`] are the only two operations
//! in the whole client that block. Decode, cache update, and callback
//! dispatch all run to completion on the consumer thread between them.
//!
//! ## The WebSocket Implementation
//!
//! [`WsTransport`] drives `tokio-tungstenite` from an owned current-thread
//! runtime, exposing blocking calls via `block_on`. Wrapping a
//! runtime-bound resource behind its own dedicated execution keeps the
//! async machinery an implementation detail of this one type.
//!
//! Text frames are ignored; pings and pongs surface as
//! [`TransportEvent::NoFrame`] so the receive loop can treat them as
//! heartbeats; close frames and EOF surface as [`TransportEvent::Closed`].

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::connection::SUBPROTOCOL;
use crate::error::{Error, Result};
use crate::types::AuthToken;

// =============================================================================
// Transport Trait
// =============================================================================

/// What one blocking receive produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete binary frame.
    Frame(Vec<u8>),
    /// Transport-level traffic with no payload for the core (heartbeats,
    /// pings). The receive loop continues.
    NoFrame,
    /// The peer closed the connection or the stream hit EOF.
    Closed,
}

/// Blocking binary-frame transport: the interface the core consumes.
pub trait Transport: Send {
    /// Sends one binary frame.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Blocks until the next transport event.
    fn recv(&mut self) -> Result<TransportEvent>;

    /// Closes the transport. Subsequent `recv` calls report
    /// [`TransportEvent::Closed`].
    fn close(&mut self);
}

// =============================================================================
// WebSocket Transport
// =============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Real WebSocket transport over `tokio-tungstenite`, blocking facade.
pub struct WsTransport {
    runtime: Runtime,
    socket: Option<WsStream>,
}

impl WsTransport {
    /// Opens a WebSocket to `url` with the protocol's subprotocol header
    /// and, when present, a bearer token.
    ///
    /// The handshake runs under `handshake_timeout`; both a timeout and a
    /// refused connection surface before any frame is exchanged.
    pub fn connect(
        url: &str,
        token: Option<&AuthToken>,
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::ConnectionFailed(format!("runtime: {e}")))?;

        let mut request = url
            .into_client_request()
            .map_err(|e| Error::ConnectionFailed(format!("bad url: {e}")))?;
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(SUBPROTOCOL),
        );
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|e| Error::HandshakeFailed(format!("bad token header: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let socket = runtime.block_on(async {
            match tokio::time::timeout(handshake_timeout, connect_async(request)).await {
                Ok(Ok((socket, response))) => {
                    debug!(status = %response.status(), "websocket handshake complete");
                    Ok(socket)
                }
                Ok(Err(e)) => Err(Error::ConnectionFailed(e.to_string())),
                Err(_) => Err(Error::HandshakeFailed(format!(
                    "timed out after {handshake_timeout:?}"
                ))),
            }
        })?;

        Ok(Self {
            runtime,
            socket: Some(socket),
        })
    }
}

impl Transport for WsTransport {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(Error::NotConnected);
        };
        self.runtime
            .block_on(socket.send(Message::Binary(frame.to_vec())))
            .map_err(|e| Error::TransportError(e.to_string()))
    }

    fn recv(&mut self) -> Result<TransportEvent> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(TransportEvent::Closed);
        };
        let message = self.runtime.block_on(socket.next());
        match message {
            None => Ok(TransportEvent::Closed),
            Some(Ok(Message::Binary(bytes))) => Ok(TransportEvent::Frame(bytes)),
            Some(Ok(Message::Close(_))) => Ok(TransportEvent::Closed),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(TransportEvent::NoFrame),
            Some(Ok(Message::Text(text))) => {
                // Binary protocol; text frames carry nothing for the core.
                warn!(len = text.len(), "ignoring text frame");
                Ok(TransportEvent::NoFrame)
            }
            Some(Ok(Message::Frame(_))) => Ok(TransportEvent::NoFrame),
            Some(Err(e)) => Err(Error::TransportError(e.to_string())),
        }
    }

    fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = self.runtime.block_on(socket.close(None));
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted transport used across the test suite: hands out queued
    /// frames, then reports closed.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        incoming: std::collections::VecDeque<TransportEvent>,
        pub sent: Vec<Vec<u8>>,
        pub closed: bool,
    }

    impl ScriptedTransport {
        pub fn with_frames(frames: Vec<Vec<u8>>) -> Self {
            Self {
                incoming: frames.into_iter().map(TransportEvent::Frame).collect(),
                sent: Vec::new(),
                closed: false,
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, frame: &[u8]) -> Result<()> {
            self.sent.push(frame.to_vec());
            Ok(())
        }

        fn recv(&mut self) -> Result<TransportEvent> {
            Ok(self.incoming.pop_front().unwrap_or(TransportEvent::Closed))
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn test_scripted_transport_drains_then_closes() {
        let mut t = ScriptedTransport::with_frames(vec![vec![1], vec![2]]);
        assert_eq!(t.recv().unwrap(), TransportEvent::Frame(vec![1]));
        assert_eq!(t.recv().unwrap(), TransportEvent::Frame(vec![2]));
        assert_eq!(t.recv().unwrap(), TransportEvent::Closed);
    }

    #[test]
    fn test_ws_connect_refused_maps_to_connection_failed() {
        // Nothing listens on this port; the handshake must fail cleanly
        // rather than hang (the timeout bounds the slow-failure case).
        let result = WsTransport::connect(
            "ws://127.0.0.1:9/v1/database/none/subscribe?compression=None",
            None,
            Duration::from_secs(5),
        );
        assert!(matches!(
            result,
            Err(Error::ConnectionFailed(_) | Error::HandshakeFailed(_))
        ));
    }
}
