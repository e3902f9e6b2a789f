//! Per-message exchange state machine.
//!
//! States: SUBMITTED → ENCRYPTED → DELIVERING → DELIVERED
//!                                            ↘ REJECTED(reason)
//!
//! A message that fails validation never leaves SUBMITTED; the flow is simply
//! dropped. Any out-of-order transition moves the flow to
//! REJECTED(protocol_violation). Rejected and delivered are final.

use std::fmt;

use crate::envelope::Envelope;
use crate::error::ProtocolError;

/// Relay-local message identifier, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{:06}", self.0)
    }
}

/// Why a message was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Recipient has no active binding.
    RecipientUnreachable,
    /// Recipient's delivery queue is full.
    RecipientBacklogged,
    /// The flow was driven out of order.
    ProtocolViolation,
}

impl RejectReason {
    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecipientUnreachable => "recipient_unreachable",
            Self::RecipientBacklogged => "recipient_backlogged",
            Self::ProtocolViolation => "protocol_violation",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RejectReason> for ProtocolError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::RecipientUnreachable => Self::RecipientUnreachable,
            RejectReason::RecipientBacklogged => Self::RecipientBacklogged,
            RejectReason::ProtocolViolation => Self::UnexpectedTransition,
        }
    }
}

/// Message state enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Plaintext accepted from the sender, not yet encrypted.
    Submitted,
    /// Envelope produced.
    Encrypted,
    /// Recipient resolved; handing the envelope over.
    Delivering,
    /// Envelope queued on the recipient's channel. Final.
    Delivered,
    /// Message dropped. Final.
    Rejected(RejectReason),
}

/// One in-flight message.
#[derive(Debug)]
pub struct MessageFlow {
    id: MessageId,
    sender: String,
    recipient: String,
    state: MessageState,
    envelope: Option<Envelope>,
}

impl MessageFlow {
    /// Start a flow in SUBMITTED.
    pub fn new(id: MessageId, sender: &str, recipient: &str) -> Self {
        Self {
            id,
            sender: sender.to_owned(),
            recipient: recipient.to_owned(),
            state: MessageState::Submitted,
            envelope: None,
        }
    }

    /// Message id.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Sending participant.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Receiving participant.
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Current state.
    pub fn state(&self) -> MessageState {
        self.state
    }

    /// Envelope, once encrypted.
    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_ref()
    }

    /// Whether the flow reached a final state.
    pub fn is_final(&self) -> bool {
        matches!(
            self.state,
            MessageState::Delivered | MessageState::Rejected(_)
        )
    }

    fn expect_state(&mut self, expected: MessageState) -> Result<(), ProtocolError> {
        if self.state != expected {
            self.reject(RejectReason::ProtocolViolation);
            return Err(ProtocolError::UnexpectedTransition);
        }
        Ok(())
    }

    fn reject(&mut self, reason: RejectReason) {
        // A final state is never overwritten
        if !self.is_final() {
            self.state = MessageState::Rejected(reason);
        }
    }

    /// Record the envelope.
    ///
    /// Transitions: Submitted → Encrypted
    pub fn on_encrypted(&mut self, envelope: Envelope) -> Result<(), ProtocolError> {
        self.expect_state(MessageState::Submitted)?;
        if envelope.sender() != self.sender || envelope.recipient() != self.recipient {
            self.reject(RejectReason::ProtocolViolation);
            return Err(ProtocolError::UnexpectedTransition);
        }
        self.envelope = Some(envelope);
        self.state = MessageState::Encrypted;
        Ok(())
    }

    /// Recipient binding found.
    ///
    /// Transitions: Encrypted → Delivering
    pub fn on_resolved(&mut self) -> Result<(), ProtocolError> {
        self.expect_state(MessageState::Encrypted)?;
        self.state = MessageState::Delivering;
        Ok(())
    }

    /// Recipient binding missing.
    ///
    /// Transitions: Encrypted → Rejected(recipient_unreachable)
    pub fn on_unreachable(&mut self) -> Result<(), ProtocolError> {
        self.expect_state(MessageState::Encrypted)?;
        self.reject(RejectReason::RecipientUnreachable);
        Ok(())
    }

    /// Envelope handed to the recipient's channel.
    ///
    /// Transitions: Delivering → Delivered
    pub fn on_delivered(&mut self) -> Result<(), ProtocolError> {
        self.expect_state(MessageState::Delivering)?;
        self.state = MessageState::Delivered;
        Ok(())
    }

    /// Recipient's channel refused the envelope.
    ///
    /// Transitions: Delivering → Rejected(reason)
    pub fn on_delivery_failed(&mut self, reason: RejectReason) -> Result<(), ProtocolError> {
        self.expect_state(MessageState::Delivering)?;
        self.reject(reason);
        Ok(())
    }
}
