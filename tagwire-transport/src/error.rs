//! Transport errors.

use thiserror::Error;

use tagwire_core::ProtocolError;

/// Errors that can occur during client operations.
///
/// Request-level refusals from the relay (unknown recipient, tampered
/// envelope) arrive as events, not errors. Only registration refusal and
/// connection problems end up here.
#[derive(Debug, Error)]
pub enum TransportError {
    // --- Connection & Setup ---
    /// Failed to establish WebSocket connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// Plain ws:// without `insecure_dev`.
    #[error("wss:// required (use insecure_dev for local testing)")]
    InsecureUrl,
    /// The relay refused the requested name.
    #[error("registration refused: {0}")]
    RegistrationRefused(String),
    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    // --- Local validation ---
    /// Rejected before anything was sent.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // --- Lifecycle & Transport ---
    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(String),
    /// Relay sent a frame that is not a known event.
    #[error("unexpected frame from relay")]
    UnexpectedFrame,
    /// Relay closed the connection or it was lost.
    #[error("relay disconnected")]
    Disconnected,
}
