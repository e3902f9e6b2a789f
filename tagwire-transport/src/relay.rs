//! WebSocket relay transport.
//!
//! Internal module for WebSocket communication with the relay.
//!
//! - Strict 1:1 mapping: one WS text message = one JSON event
//! - Binary, ping and pong frames are skipped

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use tagwire_core::{ClientRequest, ServerEvent};

use crate::error::TransportError;

/// Internal WebSocket relay transport.
pub(crate) struct RelayTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for RelayTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayTransport").finish_non_exhaustive()
    }
}

impl RelayTransport {
    /// Open the WebSocket.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self { ws })
    }

    /// Send one request frame.
    pub async fn send_request(&mut self, request: &ClientRequest) -> Result<(), TransportError> {
        let text = request
            .to_json()
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        self.ws
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    /// Receive the next event frame.
    pub async fn recv_event(&mut self) -> Result<ServerEvent, TransportError> {
        loop {
            match self.ws.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return ServerEvent::from_json(&text)
                        .map_err(|_| TransportError::UnexpectedFrame);
                }
                Some(Ok(WsMessage::Close(_))) => return Err(TransportError::Disconnected),
                Some(Ok(_)) => continue, // Ignore Ping, Pong, Binary
                Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
                None => return Err(TransportError::Disconnected),
            }
        }
    }

    /// Close the connection, best effort.
    pub async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
