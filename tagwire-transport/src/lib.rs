//! tagwire Transport
//!
//! Async client library for the tagwire relay.
//!
//! This crate wraps `tagwire-core` events and provides a simple API for
//! registering with a relay and exchanging authenticated messages.
//!
//! # Trust model
//!
//! The relay holds the keys. It encrypts on send and verifies on delivery;
//! clients see the outcome. A `new_message` with `integrity_verified: false`
//! never carries plaintext.
//!
//! - **Fixed Limits**: 4000-byte plaintext limit, enforced locally and again
//!   by the relay.
//! - **Strict Framing**: one WebSocket text message per JSON event.
//! - **wss:// by default**: plain `ws://` requires `insecure_dev`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
mod relay;
pub mod session;

pub use config::ClientConfig;
pub use error::TransportError;
pub use session::RelaySession;
pub use tagwire_core::{ServerEvent, VerdictStatus};
