//! Authenticated channel codec.
//!
//! XChaCha20-Poly1305 with a fresh random nonce per message. The Poly1305 tag
//! is kept detached so the envelope carries it as its own field.
//!
//! The tag covers the ciphertext, the pair context (through the key), and
//! sender and recipient (through the associated data). Changing any of them
//! makes verification fail.
//!
//! `decrypt_and_verify` never fails: every outcome is a [`Verdict`]. Input
//! that cannot even be decoded into an [`Envelope`] is rejected earlier, by
//! [`Envelope::decode`].

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Key, Tag, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::envelope::{
    associated_data, validate_participant, validate_plaintext, Envelope, NONCE_LEN, TAG_LEN,
};
use crate::error::ProtocolError;
use crate::keys::PairContext;

/// Outcome category of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    /// Tag matched; plaintext recovered.
    Verified,
    /// Tag did not match: tampered ciphertext, wrong direction, or forgery.
    TagMismatch,
    /// Tag matched but the plaintext is not UTF-8.
    UndecodablePlaintext,
    /// Envelope could not be decoded; no verification was attempted.
    Malformed,
}

impl VerdictStatus {
    /// Human-readable description.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Verified => "integrity verified",
            Self::TagMismatch => "integrity check failed: message tampered or forged",
            Self::UndecodablePlaintext => "message discarded: undecodable plaintext",
            Self::Malformed => "malformed envelope: rejected before verification",
        }
    }
}

/// Result of a decrypt-and-verify attempt.
///
/// Plaintext is present if and only if integrity was verified. The fields are
/// private and the only constructors uphold that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    plaintext: Option<String>,
    status: VerdictStatus,
}

impl Verdict {
    fn verified(plaintext: String) -> Self {
        Self {
            plaintext: Some(plaintext),
            status: VerdictStatus::Verified,
        }
    }

    fn rejected(status: VerdictStatus) -> Self {
        Self {
            plaintext: None,
            status,
        }
    }

    /// Verdict for an envelope that failed to decode.
    pub fn malformed() -> Self {
        Self::rejected(VerdictStatus::Malformed)
    }

    /// Whether the integrity tag verified.
    pub fn integrity_verified(&self) -> bool {
        self.plaintext.is_some()
    }

    /// Recovered plaintext, only when verified.
    pub fn plaintext(&self) -> Option<&str> {
        self.plaintext.as_deref()
    }

    /// Consume the verdict, taking the plaintext.
    pub fn into_plaintext(self) -> Option<String> {
        self.plaintext
    }

    /// Outcome category.
    pub fn status(&self) -> VerdictStatus {
        self.status
    }

    /// Human-readable description of the outcome.
    pub fn description(&self) -> &'static str {
        self.status.describe()
    }
}

fn cipher_for(context: &PairContext) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(context.key()))
}

/// Encrypt a plaintext into an authenticated envelope.
///
/// A fresh 192-bit nonce is drawn per call, so encrypting the same plaintext
/// twice yields different envelopes.
///
/// # Errors
///
/// Validation errors for bad plaintext or names; `EncryptionFailed` if the
/// AEAD refuses the input.
pub fn encrypt(
    plaintext: &str,
    sender: &str,
    recipient: &str,
    context: &PairContext,
) -> Result<Envelope, ProtocolError> {
    validate_plaintext(plaintext)?;
    validate_participant(sender)?;
    validate_participant(recipient)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut buffer = plaintext.as_bytes().to_vec();
    let ad = associated_data(sender, recipient);

    let tag = cipher_for(context)
        .encrypt_in_place_detached(XNonce::from_slice(&nonce), &ad, &mut buffer)
        .map_err(|_| ProtocolError::EncryptionFailed)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(Envelope::new(sender, recipient, nonce, buffer, tag_bytes))
}

/// Recompute and check the tag, then decrypt.
///
/// Tag comparison is constant-time (performed inside the AEAD). The
/// plaintext buffer is zeroized if verification fails part-way.
pub fn decrypt_and_verify(envelope: &Envelope, context: &PairContext) -> Verdict {
    let mut buffer = Zeroizing::new(envelope.ciphertext().to_vec());
    let ad = envelope.associated_data();

    let result = cipher_for(context).decrypt_in_place_detached(
        XNonce::from_slice(envelope.nonce()),
        &ad,
        buffer.as_mut_slice(),
        Tag::from_slice(envelope.tag()),
    );

    if result.is_err() {
        return Verdict::rejected(VerdictStatus::TagMismatch);
    }

    match std::str::from_utf8(&buffer) {
        Ok(text) => Verdict::verified(text.to_owned()),
        Err(_) => Verdict::rejected(VerdictStatus::UndecodablePlaintext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyPolicy, KEY_LEN};

    fn context() -> PairContext {
        KeyPolicy::from_bytes([0x42; KEY_LEN])
            .context_for("Alice", "Bob")
            .unwrap()
    }

    #[test]
    fn test_roundtrip_law() {
        let ctx = context();
        let longest = "x".repeat(4000);
        for text in ["hi", "Hello, secure world!", "유니코드 ✓", longest.as_str()] {
            let env = encrypt(text, "Alice", "Bob", &ctx).unwrap();
            let verdict = decrypt_and_verify(&env, &ctx);
            assert!(verdict.integrity_verified());
            assert_eq!(verdict.plaintext(), Some(text));
            assert_eq!(verdict.status(), VerdictStatus::Verified);
        }
    }

    #[test]
    fn test_ciphertext_hides_plaintext() {
        let env = encrypt("attack at dawn", "Alice", "Bob", &context()).unwrap();
        assert_ne!(env.ciphertext(), b"attack at dawn");
        assert_eq!(env.ciphertext().len(), "attack at dawn".len());
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let ctx = context();
        let a = encrypt("same", "Alice", "Bob", &ctx).unwrap();
        let b = encrypt("same", "Alice", "Bob", &ctx).unwrap();
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_tamper_detection_law() {
        let ctx = context();
        let env = encrypt("integrity matters", "Alice", "Bob", &ctx).unwrap();
        let bytes = env.to_bytes();

        // Every single-byte flip, across nonce, ciphertext and tag
        for i in 0..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            let env = Envelope::from_bytes("Alice", "Bob", &tampered).unwrap();
            let verdict = decrypt_and_verify(&env, &ctx);
            assert!(!verdict.integrity_verified(), "flip at byte {} verified", i);
            assert_eq!(verdict.plaintext(), None);
            assert_eq!(verdict.status(), VerdictStatus::TagMismatch);
        }
    }

    #[test]
    fn test_swapped_direction_fails() {
        let ctx = context();
        let env = encrypt("hi", "Alice", "Bob", &ctx).unwrap();
        let swapped = Envelope::from_bytes("Bob", "Alice", &env.to_bytes()).unwrap();
        assert!(!decrypt_and_verify(&swapped, &ctx).integrity_verified());
    }

    #[test]
    fn test_substituted_recipient_fails() {
        let policy = KeyPolicy::from_bytes([0x42; KEY_LEN]);
        let ctx = policy.context_for("Alice", "Bob").unwrap();
        let env = encrypt("hi", "Alice", "Bob", &ctx).unwrap();
        let rerouted = Envelope::from_bytes("Alice", "Mallory", &env.to_bytes()).unwrap();
        let mallory_ctx = policy.context_for("Alice", "Mallory").unwrap();
        assert!(!decrypt_and_verify(&rerouted, &mallory_ctx).integrity_verified());
        assert!(!decrypt_and_verify(&rerouted, &ctx).integrity_verified());
    }

    #[test]
    fn test_wrong_master_fails() {
        let env = encrypt("hi", "Alice", "Bob", &context()).unwrap();
        let other = KeyPolicy::from_bytes([0x43; KEY_LEN])
            .context_for("Alice", "Bob")
            .unwrap();
        let verdict = decrypt_and_verify(&env, &other);
        assert!(!verdict.integrity_verified());
    }

    #[test]
    fn test_arbitrary_bytes_do_not_panic() {
        let ctx = context();
        let env = Envelope::from_bytes("Alice", "Bob", &[0xEE; 64]).unwrap();
        let verdict = decrypt_and_verify(&env, &ctx);
        assert!(!verdict.integrity_verified());
        assert_eq!(verdict.description(), VerdictStatus::TagMismatch.describe());
    }

    #[test]
    fn test_encrypt_rejects_empty() {
        assert_eq!(
            encrypt("", "Alice", "Bob", &context()).unwrap_err(),
            ProtocolError::EmptyPlaintext
        );
    }

    #[test]
    fn test_malformed_verdict_has_no_plaintext() {
        let verdict = Verdict::malformed();
        assert!(!verdict.integrity_verified());
        assert!(verdict.into_plaintext().is_none());
    }

    #[test]
    fn test_authentic_non_utf8_is_undecodable() {
        let context = context();
        let nonce = [0x07; NONCE_LEN];
        let mut buffer = vec![0xff, 0xfe, 0x41];
        let tag = cipher_for(&context)
            .encrypt_in_place_detached(
                XNonce::from_slice(&nonce),
                &associated_data("Alice", "Bob"),
                &mut buffer,
            )
            .unwrap();
        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(&tag);
        let envelope = Envelope::new("Alice", "Bob", nonce, buffer, tag_bytes);

        let verdict = decrypt_and_verify(&envelope, &context);
        assert!(!verdict.integrity_verified());
        assert_eq!(verdict.status(), VerdictStatus::UndecodablePlaintext);
        assert!(verdict.plaintext().is_none());
    }
}
