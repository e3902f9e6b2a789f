//! Protocol errors.
//!
//! Every error is scoped to the single message (or request) that caused it.
//! Nothing here is fatal to the relay and nothing is retried.
//!
//! A failed integrity check is deliberately *not* an error: it is a normal
//! [`Verdict`](crate::codec::Verdict) outcome.

use thiserror::Error;

/// All possible protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    // --- Validation (rejected before any codec call) ---
    /// Plaintext is empty or whitespace only.
    #[error("empty plaintext")]
    EmptyPlaintext,

    /// Plaintext exceeds maximum size.
    #[error("plaintext too large")]
    PlaintextTooLarge,

    /// Plaintext contains NUL byte.
    #[error("nul byte in plaintext")]
    NulByteInPlaintext,

    /// Tampered ciphertext input is empty.
    #[error("empty ciphertext")]
    EmptyCiphertext,

    /// Participant name is empty, too long or contains control characters.
    #[error("invalid participant name")]
    InvalidParticipant,

    /// Participant is not on the relay roster.
    #[error("participant not allowed")]
    ParticipantNotAllowed,

    /// Request `sender` does not match the name registered on the connection.
    #[error("sender not registered on this connection")]
    SenderMismatch,

    // --- Routing ---
    /// Recipient has no active binding.
    #[error("recipient unreachable")]
    RecipientUnreachable,

    /// Recipient's delivery queue is full.
    #[error("recipient backlogged")]
    RecipientBacklogged,

    // --- Envelope ---
    /// Envelope string is not decodable (bad base64, truncated, oversized).
    #[error("malformed envelope")]
    MalformedEnvelope,

    /// Encryption failed inside the AEAD.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Master key is not 32 bytes of hex.
    #[error("invalid master key")]
    InvalidMasterKey,

    // --- Boundary ---
    /// Inbound event is not valid JSON or names an unknown event.
    #[error("invalid request")]
    InvalidRequest,

    // --- State machine ---
    /// Transition not allowed from the current message state.
    #[error("unexpected transition")]
    UnexpectedTransition,
}

impl ProtocolError {
    /// True for errors caused by the caller's own input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyPlaintext
                | Self::PlaintextTooLarge
                | Self::NulByteInPlaintext
                | Self::EmptyCiphertext
                | Self::InvalidParticipant
                | Self::ParticipantNotAllowed
                | Self::SenderMismatch
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(ProtocolError::EmptyPlaintext.is_validation());
        assert!(ProtocolError::SenderMismatch.is_validation());
        assert!(!ProtocolError::RecipientUnreachable.is_validation());
        assert!(!ProtocolError::MalformedEnvelope.is_validation());
    }

    #[test]
    fn test_messages_are_terse() {
        assert_eq!(ProtocolError::MalformedEnvelope.to_string(), "malformed envelope");
        assert_eq!(
            ProtocolError::RecipientUnreachable.to_string(),
            "recipient unreachable"
        );
    }
}
