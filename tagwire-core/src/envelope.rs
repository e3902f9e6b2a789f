//! Authenticated envelope and its wire encoding.
//!
//! Wire format (one string, URL-safe base64 without padding):
//! ```text
//! +-------------+---------------------+-----------+
//! | NONCE (24B) | CIPHERTEXT (N bytes)| TAG (16B) |
//! +-------------+---------------------+-----------+
//! ```
//!
//! `sender` and `recipient` travel next to the string as separate event
//! fields. They are not encrypted but they are authenticated: both are bound
//! into the associated data, so substituting either fails verification.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::ProtocolError;

/// XChaCha20-Poly1305 nonce length.
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

/// Maximum plaintext length in bytes.
pub const MAX_PLAINTEXT_LENGTH: usize = 4000;

/// Maximum participant name length in bytes.
pub const MAX_PARTICIPANT_LENGTH: usize = 64;

/// Maximum length of an encoded envelope string.
pub const MAX_ENVELOPE_CHARS: usize = 8192;

/// Domain label prefixed to the associated data.
const AD_LABEL: &[u8] = b"tagwire/v1";

/// An authenticated envelope.
///
/// Immutable after construction. Produced once per send by
/// [`codec::encrypt`](crate::codec::encrypt), or decoded from an untrusted
/// string on the tamper path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender: String,
    recipient: String,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_LEN],
}

impl Envelope {
    pub(crate) fn new(
        sender: &str,
        recipient: &str,
        nonce: [u8; NONCE_LEN],
        ciphertext: Vec<u8>,
        tag: [u8; TAG_LEN],
    ) -> Self {
        Self {
            sender: sender.to_owned(),
            recipient: recipient.to_owned(),
            nonce,
            ciphertext,
            tag,
        }
    }

    /// Rebuild an envelope from raw `nonce ‖ ciphertext ‖ tag` bytes.
    ///
    /// # Errors
    ///
    /// `MalformedEnvelope` if the bytes are shorter than nonce + tag, or
    /// `InvalidParticipant` if either name is invalid.
    pub fn from_bytes(sender: &str, recipient: &str, bytes: &[u8]) -> Result<Self, ProtocolError> {
        validate_participant(sender)?;
        validate_participant(recipient)?;

        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(ProtocolError::MalformedEnvelope);
        }

        let (nonce_bytes, rest) = bytes.split_at(NONCE_LEN);
        let (ciphertext, tag_bytes) = rest.split_at(rest.len() - TAG_LEN);

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(tag_bytes);

        Ok(Self::new(sender, recipient, nonce, ciphertext.to_vec(), tag))
    }

    /// Decode an envelope from its wire string.
    ///
    /// Surrounding whitespace is ignored. An empty ciphertext body is
    /// syntactically valid; it simply will not verify.
    ///
    /// # Errors
    ///
    /// `MalformedEnvelope` if the string is oversized, not base64, or too
    /// short to hold a nonce and tag.
    pub fn decode(sender: &str, recipient: &str, encoded: &str) -> Result<Self, ProtocolError> {
        let encoded = encoded.trim();
        if encoded.is_empty() || encoded.len() > MAX_ENVELOPE_CHARS {
            return Err(ProtocolError::MalformedEnvelope);
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| ProtocolError::MalformedEnvelope)?;

        Self::from_bytes(sender, recipient, &bytes)
    }

    /// Serialize to raw `nonce ‖ ciphertext ‖ tag` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Encode to the wire string.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }

    /// Sending participant.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Receiving participant.
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Per-message nonce.
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Ciphertext body, without the tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Integrity tag.
    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    /// Human-readable direction, e.g. `"Alice to Bob"`.
    pub fn route_label(&self) -> String {
        format!("{} to {}", self.sender, self.recipient)
    }

    /// Associated data bound into the tag.
    pub fn associated_data(&self) -> Vec<u8> {
        associated_data(&self.sender, &self.recipient)
    }
}

/// Build the associated data for a direction.
///
/// `label ‖ len(sender) ‖ sender ‖ len(recipient) ‖ recipient`, lengths as
/// big-endian u16. Length prefixes keep `("ab", "c")` and `("a", "bc")` apart.
pub(crate) fn associated_data(sender: &str, recipient: &str) -> Vec<u8> {
    let mut ad = Vec::with_capacity(AD_LABEL.len() + 4 + sender.len() + recipient.len());
    ad.extend_from_slice(AD_LABEL);
    push_prefixed(&mut ad, sender.as_bytes());
    push_prefixed(&mut ad, recipient.as_bytes());
    ad
}

pub(crate) fn push_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    // Names are validated to MAX_PARTICIPANT_LENGTH, which fits in u16
    #[allow(clippy::cast_possible_truncation)]
    let len = (bytes.len() as u16).to_be_bytes();
    buf.extend_from_slice(&len);
    buf.extend_from_slice(bytes);
}

/// Validate outbound plaintext.
///
/// # Errors
///
/// Returns error if:
/// - Plaintext is empty or whitespace only
/// - Plaintext exceeds MAX_PLAINTEXT_LENGTH
/// - Plaintext contains NUL byte
pub fn validate_plaintext(plaintext: &str) -> Result<&str, ProtocolError> {
    if plaintext.trim().is_empty() {
        return Err(ProtocolError::EmptyPlaintext);
    }

    if plaintext.len() > MAX_PLAINTEXT_LENGTH {
        return Err(ProtocolError::PlaintextTooLarge);
    }

    if plaintext.contains('\0') {
        return Err(ProtocolError::NulByteInPlaintext);
    }

    Ok(plaintext)
}

/// Validate a participant name.
///
/// # Errors
///
/// `InvalidParticipant` if the name is empty, longer than
/// MAX_PARTICIPANT_LENGTH bytes, or contains control characters.
pub fn validate_participant(name: &str) -> Result<&str, ProtocolError> {
    if name.is_empty() || name.len() > MAX_PARTICIPANT_LENGTH {
        return Err(ProtocolError::InvalidParticipant);
    }
    if name.chars().any(char::is_control) {
        return Err(ProtocolError::InvalidParticipant);
    }
    Ok(name)
}
