//! tagwire Protocol Core
//!
//! Authenticated point-to-point message exchange through a verifying relay.
//!
//! This crate provides:
//! - Envelope wire encoding with strict bounds checking
//! - Per-pair key derivation from a relay master secret
//! - Authenticated channel codec producing verdicts, never panics
//! - Per-message exchange state machine
//! - Typed boundary events
//!
//! # Invariants
//!
//! - A verdict carries plaintext if and only if the integrity tag verified
//! - Verification is per message; no state is carried between messages
//! - Malformed envelopes are rejected before any verification is attempted
//! - Direct use of `unsafe` is forbidden (#![forbid(unsafe_code)])
//! - Key material is zeroized on drop

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod codec;
pub mod envelope;
pub mod error;
pub mod event;
pub mod keys;
pub mod state;

pub use codec::{decrypt_and_verify, encrypt, Verdict, VerdictStatus};
pub use envelope::Envelope;
pub use error::ProtocolError;
pub use event::{ClientRequest, ServerEvent};
pub use keys::{KeyPolicy, PairContext};
pub use state::{MessageFlow, MessageId, MessageState, RejectReason};
