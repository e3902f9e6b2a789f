//! Key-derivation policy.
//!
//! The relay holds one 32-byte master secret. Every pair of participants
//! gets its own context derived from it:
//!
//! ```text
//! context(a, b) = HKDF-SHA256(ikm = master,
//!                             salt = "tagwire/pair-context/v1",
//!                             info = len(lo) ‖ lo ‖ len(hi) ‖ hi)
//! ```
//!
//! where `(lo, hi)` is the sorted pair, so both directions share a context.
//! Direction is bound separately through the AEAD associated data.
//!
//! # Security Properties
//!
//! - Master and pair keys are zeroized on drop
//! - Keys never appear in `Debug` output, only a short fingerprint
//! - Derivation is a pure function; no state is shared between messages

use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::envelope::push_prefixed;
use crate::error::ProtocolError;

/// Master and pair key length.
pub const KEY_LEN: usize = 32;

const PAIR_SALT: &[u8] = b"tagwire/pair-context/v1";

/// First 8 bytes of SHA-256 over key material, as 16 hex characters.
fn fingerprint_of(key: &[u8]) -> String {
    let digest = Sha256::digest(key);
    hex::encode(&digest[..8])
}

/// Relay-wide key-derivation policy.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyPolicy {
    master: [u8; KEY_LEN],
}

impl KeyPolicy {
    /// Generate a fresh master secret from OS entropy.
    pub fn generate() -> Self {
        let mut master = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut master);
        Self { master }
    }

    /// Use the given master secret.
    pub fn from_bytes(master: [u8; KEY_LEN]) -> Self {
        Self { master }
    }

    /// Parse a master secret from 64 hex characters.
    ///
    /// # Errors
    ///
    /// `InvalidMasterKey` if the input is not exactly 32 bytes of hex.
    pub fn from_hex(encoded: &str) -> Result<Self, ProtocolError> {
        let bytes = Zeroizing::new(
            hex::decode(encoded.trim()).map_err(|_| ProtocolError::InvalidMasterKey)?,
        );
        if bytes.len() != KEY_LEN {
            return Err(ProtocolError::InvalidMasterKey);
        }
        let mut master = [0u8; KEY_LEN];
        master.copy_from_slice(&bytes);
        Ok(Self { master })
    }

    /// Derive the shared context for a pair of participants.
    ///
    /// Symmetric: `context_for(a, b)` and `context_for(b, a)` are equal.
    pub fn context_for(&self, a: &str, b: &str) -> Result<PairContext, ProtocolError> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        let mut info = Vec::with_capacity(4 + lo.len() + hi.len());
        push_prefixed(&mut info, lo.as_bytes());
        push_prefixed(&mut info, hi.as_bytes());

        let hk = Hkdf::<Sha256>::new(Some(PAIR_SALT), &self.master);
        let mut key = [0u8; KEY_LEN];
        hk.expand(&info, &mut key)
            .map_err(|_| ProtocolError::KeyDerivationFailed)?;

        Ok(PairContext { key })
    }

    /// Fingerprint of the master secret, for start-up logs.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.master)
    }
}

impl std::fmt::Debug for KeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPolicy")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Shared key material for one pair of participants.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PairContext {
    key: [u8; KEY_LEN],
}

impl PairContext {
    pub(crate) fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Fingerprint of the pair key. Safe to log.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.key)
    }
}

impl std::fmt::Debug for PairContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairContext")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
