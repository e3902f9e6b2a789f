//! Boundary events.
//!
//! Every WebSocket text frame carries one JSON object:
//! ```text
//! {"event": "<name>", "data": { ...payload... }}
//! ```
//!
//! Requests are parsed into [`ClientRequest`] at the boundary. Anything that
//! does not parse is answered with a `status_update` and never reaches the
//! coordinator.

use serde::{Deserialize, Serialize};

use crate::codec::{Verdict, VerdictStatus};
use crate::envelope::Envelope;
use crate::error::ProtocolError;

// Status texts that clients match on. Built and recognised only here.
const REGISTERED: &str = "connected";
const REPLACED: &str = " (previous connection replaced)";
const REJECTED: &str = " rejected: ";

/// Client → relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Bind this connection to a participant name.
    RegisterUser {
        /// Participant name.
        username: String,
    },
    /// Encrypt and deliver a plaintext.
    SendMessage {
        /// Must equal the name registered on this connection.
        sender: String,
        /// Receiving participant.
        recipient: String,
        /// Plaintext.
        message: String,
    },
    /// Submit an adversarial envelope string for verification.
    TamperMessage {
        /// Must equal the name registered on this connection.
        sender: String,
        /// Participant whose context the envelope is checked against.
        recipient: String,
        /// Envelope string with substituted bytes.
        tampered_encrypted: String,
    },
}

impl ClientRequest {
    /// Parse a request frame.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for malformed JSON, unknown events or missing fields.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|_| ProtocolError::InvalidRequest)
    }

    /// Serialize to a request frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Event name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterUser { .. } => "register_user",
            Self::SendMessage { .. } => "send_message",
            Self::TamperMessage { .. } => "tamper_message",
        }
    }
}

/// Relay → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Informational; no state change.
    StatusUpdate {
        /// Status text.
        msg: String,
    },
    /// Acknowledgment to the sender only. Carries no verdict.
    SendSuccess {
        /// Plaintext the sender submitted, for local echo.
        original_message: String,
        /// Envelope string as it travelled.
        encrypted_message: String,
        /// Delivery status text.
        decryption_status: String,
    },
    /// Delivered to the recipient only.
    NewMessage {
        /// Sending participant.
        sender: String,
        /// Whether the tag verified.
        integrity_verified: bool,
        /// Plaintext, present only when verified.
        #[serde(default)]
        decrypted_message: Option<String>,
        /// Envelope string as received.
        encrypted_data: String,
        /// Direction bound into the tag, e.g. `"Alice to Bob"`.
        associated_data: String,
        /// Verification outcome.
        status: VerdictStatus,
    },
    /// Delivered to the tamper-path submitter.
    TamperResult {
        /// Whether the tag verified.
        integrity_verified: bool,
        /// Plaintext, present only when verified.
        #[serde(default)]
        decrypted_message: Option<String>,
        /// Verification outcome, `malformed` if the envelope did not decode.
        status: VerdictStatus,
    },
}

impl ServerEvent {
    /// Build a `status_update`.
    pub fn status(msg: impl Into<String>) -> Self {
        Self::StatusUpdate { msg: msg.into() }
    }

    /// Build the `status_update` confirming that `name` is registered.
    pub fn registered(name: &str, replaced: bool) -> Self {
        let suffix = if replaced { REPLACED } else { "" };
        Self::status(format!("{name} {REGISTERED}{suffix}"))
    }

    /// Build the `status_update` reporting that a `request` was refused.
    pub fn rejected(request: &str, error: ProtocolError) -> Self {
        Self::status(format!("{request}{REJECTED}{error}"))
    }

    /// Whether this event confirms the registration of `name`.
    pub fn confirms_registration(&self, name: &str) -> bool {
        let Self::StatusUpdate { msg } = self else {
            return false;
        };
        match msg.strip_prefix(name).and_then(|rest| rest.strip_prefix(' ')) {
            Some(rest) => rest == REGISTERED || rest.strip_prefix(REGISTERED) == Some(REPLACED),
            None => false,
        }
    }

    /// Reason text, if this event reports that a `request` was refused.
    pub fn rejection_of(&self, request: &str) -> Option<&str> {
        match self {
            Self::StatusUpdate { msg } => msg.strip_prefix(request)?.strip_prefix(REJECTED),
            _ => None,
        }
    }

    /// Build a `new_message` from a received envelope and its verdict.
    pub fn new_message(envelope: &Envelope, verdict: Verdict) -> Self {
        let status = verdict.status();
        Self::NewMessage {
            sender: envelope.sender().to_owned(),
            integrity_verified: verdict.integrity_verified(),
            decrypted_message: verdict.into_plaintext(),
            encrypted_data: envelope.encode(),
            associated_data: envelope.route_label(),
            status,
        }
    }

    /// Build a `tamper_result` from a verdict.
    pub fn tamper_result(verdict: Verdict) -> Self {
        let status = verdict.status();
        Self::TamperResult {
            integrity_verified: verdict.integrity_verified(),
            decrypted_message: verdict.into_plaintext(),
            status,
        }
    }

    /// Parse an event frame.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the frame is not a known event.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|_| ProtocolError::InvalidRequest)
    }

    /// Serialize to an event frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Event name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusUpdate { .. } => "status_update",
            Self::SendSuccess { .. } => "send_success",
            Self::NewMessage { .. } => "new_message",
            Self::TamperResult { .. } => "tamper_result",
        }
    }
}
