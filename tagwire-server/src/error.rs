use thiserror::Error;

use tagwire_core::ProtocolError;

/// Fatal relay errors. Per-request failures are reported to the client
/// instead and never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket setup or accept failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid relay configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ProtocolError),

    /// WebSocket handshake or framing failure on one connection.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
