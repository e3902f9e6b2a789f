//! Relay session API.
//!
//! The main public interface for joining a relay and exchanging messages.
//!
//! - `connect()` registers the participant name before returning
//! - `send_text()` validates locally before anything goes on the wire
//! - Every envelope is verified by the relay on delivery; the verdict
//!   arrives as a `new_message` event with `integrity_verified` set

use std::time::Duration;

use tagwire_core::envelope::{validate_participant, validate_plaintext};
use tagwire_core::{ClientRequest, ProtocolError, ServerEvent};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::relay::RelayTransport;

/// How long `connect()` waits for the registration confirmation.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(5);

/// A registered connection to the relay.
#[derive(Debug)]
pub struct RelaySession {
    username: String,
    relay: RelayTransport,
    closed: bool,
}

impl RelaySession {
    /// Connect to the relay and register `config.username`.
    ///
    /// # Errors
    ///
    /// `InsecureUrl` for `ws://` without `insecure_dev`,
    /// `RegistrationRefused` if the relay rejects the name, or a
    /// connection error.
    pub async fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        if !config.scheme_allowed() {
            return Err(TransportError::InsecureUrl);
        }
        validate_participant(&config.username)?;

        let mut relay = RelayTransport::connect(&config.relay_url).await?;
        let register = ClientRequest::RegisterUser {
            username: config.username.clone(),
        };
        relay.send_request(&register).await?;

        tokio::time::timeout(
            REGISTER_TIMEOUT,
            Self::await_registration(&mut relay, register.name(), &config.username),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;

        tracing::debug!(participant = %config.username, "registered with relay");

        Ok(Self {
            username: config.username,
            relay,
            closed: false,
        })
    }

    async fn await_registration(
        relay: &mut RelayTransport,
        request: &str,
        username: &str,
    ) -> Result<(), TransportError> {
        loop {
            let event = relay.recv_event().await?;
            if event.confirms_registration(username) {
                return Ok(());
            }
            if let Some(reason) = event.rejection_of(request) {
                return Err(TransportError::RegistrationRefused(reason.to_owned()));
            }
        }
    }

    /// Registered participant name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Ask the relay to encrypt and deliver `text` to `recipient`.
    ///
    /// The outcome arrives later as `send_success` or `status_update`.
    ///
    /// # Errors
    ///
    /// Local validation failures (empty, oversized or NUL-containing text,
    /// invalid recipient) are returned without contacting the relay.
    pub async fn send_text(&mut self, recipient: &str, text: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        validate_participant(recipient)?;
        validate_plaintext(text)?;

        self.relay
            .send_request(&ClientRequest::SendMessage {
                sender: self.username.clone(),
                recipient: recipient.to_owned(),
                message: text.to_owned(),
            })
            .await
    }

    /// Submit an arbitrary envelope string as if it came from this
    /// participant to `recipient`. The verdict arrives as `tamper_result`.
    pub async fn tamper(&mut self, recipient: &str, tampered: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        validate_participant(recipient)?;
        if tampered.trim().is_empty() {
            return Err(ProtocolError::EmptyCiphertext.into());
        }

        self.relay
            .send_request(&ClientRequest::TamperMessage {
                sender: self.username.clone(),
                recipient: recipient.to_owned(),
                tampered_encrypted: tampered.to_owned(),
            })
            .await
    }

    /// Next event from the relay.
    ///
    /// Cancel-safe: dropping the future loses no event.
    pub async fn recv(&mut self) -> Result<ServerEvent, TransportError> {
        self.ensure_open()?;
        let result = self.relay.recv_event().await;
        if matches!(result, Err(TransportError::Disconnected)) {
            self.closed = true;
        }
        result
    }

    /// Next event, or `Timeout` after `limit`.
    pub async fn recv_timeout(&mut self, limit: Duration) -> Result<ServerEvent, TransportError> {
        tokio::time::timeout(limit, self.recv())
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    /// Whether the connection is still usable.
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Close the connection. The relay releases the name.
    pub async fn close(mut self) {
        self.closed = true;
        self.relay.close().await;
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::Disconnected)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_ws_refused_without_insecure_dev() {
        let config = ClientConfig::new("ws://127.0.0.1:1", "Alice");
        assert!(matches!(
            RelaySession::connect(config).await,
            Err(TransportError::InsecureUrl)
        ));
    }

    #[tokio::test]
    async fn test_invalid_username_refused_locally() {
        let config = ClientConfig::new("wss://127.0.0.1:1", "");
        assert!(matches!(
            RelaySession::connect(config).await,
            Err(TransportError::Protocol(ProtocolError::InvalidParticipant))
        ));
    }
}
