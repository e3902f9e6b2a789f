//! Session registry: participant name → live delivery channel.
//!
//! Backed by a `DashMap`, so every read and write of one name is mutually
//! exclusive with every other access to that name. Registrations for the same
//! name race; whichever insert lands last is what `resolve` returns.

use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use tagwire_core::envelope::validate_participant;
use tagwire_core::{Envelope, ProtocolError, ServerEvent};

/// Relay-local connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Item queued on a connection's outbound channel.
#[derive(Debug)]
pub enum Outbound {
    /// Ready-made event for the client.
    Event(ServerEvent),
    /// Envelope addressed to this connection's participant. Verified by the
    /// receiving side before anything is shown.
    Envelope(Envelope),
}

/// Sending half of one connection's bounded outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    /// Wrap a queue sender.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>) -> Self {
        Self { id, tx }
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an item without waiting.
    ///
    /// A full queue is `RecipientBacklogged`, a closed one
    /// `RecipientUnreachable`. Neither is retried.
    pub fn deliver(&self, item: Outbound) -> Result<(), ProtocolError> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => ProtocolError::RecipientBacklogged,
            TrySendError::Closed(_) => ProtocolError::RecipientUnreachable,
        })
    }

    /// Queue an event for this connection, best effort.
    pub fn notify(&self, event: ServerEvent) {
        let name = event.name();
        if let Err(e) = self.deliver(Outbound::Event(event)) {
            tracing::debug!(conn = %self.id, event = name, error = %e, "event dropped");
        }
    }
}

/// Participant → channel bindings.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    bindings: DashMap<String, ConnectionHandle>,
    roster: Option<HashSet<String>>,
}

impl SessionRegistry {
    /// Registry accepting any valid name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry accepting only the listed names.
    pub fn with_roster<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bindings: DashMap::new(),
            roster: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Bind `name` to `channel`, replacing any earlier binding of that name.
    ///
    /// A connection owns at most one name: any other name it held is
    /// released. The registrant receives a `status_update` confirming the
    /// (re)registration.
    ///
    /// # Errors
    ///
    /// `InvalidParticipant` or `ParticipantNotAllowed`.
    pub fn register(&self, name: &str, channel: &ConnectionHandle) -> Result<(), ProtocolError> {
        validate_participant(name)?;
        if let Some(roster) = &self.roster {
            if !roster.contains(name) {
                return Err(ProtocolError::ParticipantNotAllowed);
            }
        }

        self.bindings
            .retain(|bound, handle| handle.id() != channel.id() || bound == name);

        let previous = self.bindings.insert(name.to_owned(), channel.clone());

        let replaced = match previous {
            Some(prev) if prev.id() != channel.id() => {
                tracing::info!(participant = name, conn = %channel.id(), replaced = %prev.id(), "participant re-registered");
                true
            }
            _ => {
                tracing::info!(participant = name, conn = %channel.id(), "participant registered");
                false
            }
        };
        channel.notify(ServerEvent::registered(name, replaced));
        Ok(())
    }

    /// Current channel for `name`.
    ///
    /// # Errors
    ///
    /// `RecipientUnreachable` if nothing is bound.
    pub fn resolve(&self, name: &str) -> Result<ConnectionHandle, ProtocolError> {
        self.bindings
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or(ProtocolError::RecipientUnreachable)
    }

    /// Remove every binding that points at `channel`.
    ///
    /// Names that were since re-registered on another connection are kept.
    pub fn unregister(&self, channel: ConnectionId) {
        self.bindings.retain(|name, handle| {
            let keep = handle.id() != channel;
            if !keep {
                tracing::info!(participant = %name, conn = %channel, "participant unregistered");
            }
            keep
        });
    }

    /// Name currently bound to `channel`, if any.
    pub fn registered_name(&self, channel: ConnectionId) -> Option<String> {
        self.bindings
            .iter()
            .find(|entry| entry.value().id() == channel)
            .map(|entry| entry.key().clone())
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True when nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
