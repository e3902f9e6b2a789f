//! Exchange coordinator.
//!
//! Drives each message through its [`MessageFlow`] and talks to clients only
//! through their [`ConnectionHandle`]s:
//!
//! - the sender gets `send_success` (echo + envelope string, no verdict) or a
//!   `status_update` explaining why nothing was delivered;
//! - the recipient's queue gets the envelope itself, verified by
//!   [`ExchangeCoordinator::receive`] on the receiving side;
//! - a tamper submitter gets `tamper_result` from the same verification
//!   routine the recipient side uses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tagwire_core::envelope::{validate_participant, validate_plaintext};
use tagwire_core::{
    decrypt_and_verify, encrypt, ClientRequest, Envelope, KeyPolicy, MessageFlow, MessageId,
    ProtocolError, RejectReason, ServerEvent, Verdict,
};

use crate::registry::{ConnectionHandle, ConnectionId, Outbound, SessionRegistry};

/// Orchestrates register, send, deliver and tamper flows.
#[derive(Debug)]
pub struct ExchangeCoordinator {
    registry: Arc<SessionRegistry>,
    keys: Arc<KeyPolicy>,
    next_id: AtomicU64,
}

impl ExchangeCoordinator {
    /// Build a coordinator over an injected registry and key policy.
    pub fn new(registry: Arc<SessionRegistry>, keys: Arc<KeyPolicy>) -> Self {
        Self {
            registry,
            keys,
            next_id: AtomicU64::new(1),
        }
    }

    /// The registry this coordinator routes through.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Dispatch one inbound request.
    ///
    /// Errors are scoped to this request and reported to `origin` only.
    pub fn handle(&self, origin: &ConnectionHandle, request: ClientRequest) {
        let event = request.name();
        let result = match request {
            ClientRequest::RegisterUser { username } => self.register(origin, &username),
            ClientRequest::SendMessage {
                sender,
                recipient,
                message,
            } => self
                .send_message(origin, &sender, &recipient, &message)
                .map(|_| ()),
            ClientRequest::TamperMessage {
                sender,
                recipient,
                tampered_encrypted,
            } => self
                .tamper_message(origin, &sender, &recipient, &tampered_encrypted)
                .map(|_| ()),
        };

        if let Err(e) = result {
            if e.is_validation() {
                tracing::debug!(conn = %origin.id(), event, error = %e, "request rejected");
            } else {
                tracing::warn!(conn = %origin.id(), event, error = %e, "request failed");
            }
            origin.notify(ServerEvent::rejected(event, e));
        }
    }

    /// Bind `origin` to `username`.
    pub fn register(&self, origin: &ConnectionHandle, username: &str) -> Result<(), ProtocolError> {
        self.registry.register(username, origin)
    }

    /// Release every binding held by a closed connection.
    pub fn disconnect(&self, conn: ConnectionId) {
        self.registry.unregister(conn);
    }

    fn check_sender(&self, origin: &ConnectionHandle, sender: &str) -> Result<(), ProtocolError> {
        match self.registry.registered_name(origin.id()) {
            Some(name) if name == sender => Ok(()),
            _ => Err(ProtocolError::SenderMismatch),
        }
    }

    fn next_message_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Normal send flow.
    ///
    /// Validation failures return `Err` before the codec is touched. A
    /// missing or backlogged recipient is not an `Err`: the returned flow ends
    /// in `Rejected` and the sender has been told.
    pub fn send_message(
        &self,
        origin: &ConnectionHandle,
        sender: &str,
        recipient: &str,
        message: &str,
    ) -> Result<MessageFlow, ProtocolError> {
        self.check_sender(origin, sender)?;
        validate_participant(recipient)?;
        validate_plaintext(message)?;

        let mut flow = MessageFlow::new(self.next_message_id(), sender, recipient);

        // Submitted → Encrypted
        let context = self.keys.context_for(sender, recipient)?;
        let envelope = encrypt(message, sender, recipient, &context)?;
        let encoded = envelope.encode();
        flow.on_encrypted(envelope.clone())?;
        tracing::debug!(id = %flow.id(), sender, recipient, context = %context.fingerprint(), "message encrypted");

        // Encrypted → Delivering | Rejected
        let channel = match self.registry.resolve(recipient) {
            Ok(channel) => channel,
            Err(_) => {
                flow.on_unreachable()?;
                tracing::info!(id = %flow.id(), sender, recipient, reason = %RejectReason::RecipientUnreachable, "message rejected");
                origin.notify(ServerEvent::status(format!(
                    "{recipient} is not connected; message not delivered"
                )));
                return Ok(flow);
            }
        };
        flow.on_resolved()?;
        tracing::debug!(id = %flow.id(), recipient, conn = %channel.id(), "recipient resolved");

        // Delivering → Delivered | Rejected
        match channel.deliver(Outbound::Envelope(envelope)) {
            Ok(()) => {
                flow.on_delivered()?;
                tracing::info!(id = %flow.id(), sender, recipient, "message delivered");
                origin.notify(ServerEvent::SendSuccess {
                    original_message: message.to_owned(),
                    encrypted_message: encoded,
                    decryption_status: format!(
                        "delivered to {recipient}; integrity is verified on receipt"
                    ),
                });
            }
            Err(e) => {
                let reason = match e {
                    ProtocolError::RecipientBacklogged => RejectReason::RecipientBacklogged,
                    _ => RejectReason::RecipientUnreachable,
                };
                flow.on_delivery_failed(reason)?;
                tracing::warn!(id = %flow.id(), sender, recipient, %reason, "message rejected");
                origin.notify(ServerEvent::status(format!(
                    "message to {recipient} not delivered: {e}"
                )));
            }
        }

        Ok(flow)
    }

    /// Recompute and check the tag for an envelope.
    ///
    /// The single verification routine used by both the recipient side and
    /// the tamper path.
    pub fn verify(&self, envelope: &Envelope) -> Result<Verdict, ProtocolError> {
        let context = self
            .keys
            .context_for(envelope.sender(), envelope.recipient())?;
        Ok(decrypt_and_verify(envelope, &context))
    }

    /// Recipient side: verify a delivered envelope and build what is shown.
    ///
    /// Runs unconditionally for every envelope. The ciphertext is never
    /// passed through as if it were plaintext.
    pub fn receive(&self, envelope: &Envelope) -> ServerEvent {
        let verdict = self.verify(envelope).unwrap_or_else(|e| {
            tracing::error!(sender = envelope.sender(), recipient = envelope.recipient(), error = %e, "verification could not run");
            Verdict::malformed()
        });

        if verdict.integrity_verified() {
            tracing::debug!(sender = envelope.sender(), recipient = envelope.recipient(), "integrity verified");
        } else {
            tracing::warn!(sender = envelope.sender(), recipient = envelope.recipient(), status = verdict.description(), "integrity check failed");
        }

        ServerEvent::new_message(envelope, verdict)
    }

    /// Tamper-simulation path.
    ///
    /// Decodes `tampered` as an envelope from `sender` to `recipient`, verifies
    /// it with [`verify`](Self::verify) and returns the verdict to `origin`.
    /// The recipient does not need to be connected and is never contacted.
    pub fn tamper_message(
        &self,
        origin: &ConnectionHandle,
        sender: &str,
        recipient: &str,
        tampered: &str,
    ) -> Result<Verdict, ProtocolError> {
        self.check_sender(origin, sender)?;
        validate_participant(recipient)?;
        if tampered.trim().is_empty() {
            return Err(ProtocolError::EmptyCiphertext);
        }

        let verdict = match Envelope::decode(sender, recipient, tampered) {
            Ok(envelope) => self.verify(&envelope)?,
            Err(ProtocolError::MalformedEnvelope) => Verdict::malformed(),
            Err(e) => return Err(e),
        };

        tracing::info!(
            sender,
            recipient,
            verified = verdict.integrity_verified(),
            status = verdict.description(),
            "tamper simulation"
        );
        origin.notify(ServerEvent::tamper_result(verdict.clone()));
        Ok(verdict)
    }
}
