//! Owner of every live connection.
//!
//! The [`Registry`] maps a [`ConnId`] handle to the [`Connection`] it owns.
//! Handles are handed out in increasing order and never reused, so a stale
//! handle held by the driver can only ever miss, never alias a newer
//! connection.
//!
//! Destruction always goes through [`Registry::destroy`]: the connection is
//! removed from the map first and torn down afterwards, which makes a second
//! destroy of the same handle a no-op.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use crate::config::{Config, ConfigError};
use crate::connection::{ConnError, Connection, Disposition};
use crate::endpoint::Endpoint;
use crate::sender::Fill;

/// Opaque, never-reused connection handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(u64);

impl ConnId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The set of live connections.
#[derive(Debug)]
pub struct Registry<E> {
    connections: BTreeMap<ConnId, Connection<E>>,
    next_id: u64,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<E: Endpoint> Registry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a connection over `endpoint` and register it.
    pub fn open(&mut self, endpoint: E, config: &Config) -> Result<ConnId, ConfigError> {
        let conn = Connection::new(endpoint, config)?;
        Ok(self.register(conn))
    }

    /// Take ownership of `conn` and assign it a fresh handle.
    pub fn register(&mut self, mut conn: Connection<E>) -> ConnId {
        let id = ConnId(self.next_id);
        self.next_id += 1;
        conn.set_id(id);
        log::info!("[ctcp {id}] registered ({} live)", self.connections.len() + 1);
        self.connections.insert(id, conn);
        id
    }

    /// Remove `id` without tearing it down.  `None` if it is not registered.
    pub fn unregister(&mut self, id: ConnId) -> Option<Connection<E>> {
        self.connections.remove(&id)
    }

    /// Unregister `id`, then release its state and signal end-of-input.
    ///
    /// Returns `false` if the handle was already gone.
    pub fn destroy(&mut self, id: ConnId, outcome: Result<(), ConnError>) -> bool {
        match self.unregister(id) {
            Some(mut conn) => {
                conn.teardown(outcome);
                log::info!(
                    "[ctcp {id}] destroyed after {} retransmissions ({} live)",
                    conn.retransmissions(),
                    self.connections.len()
                );
                true
            }
            None => false,
        }
    }

    /// Destroy `id` at the application's request.
    pub fn abort(&mut self, id: ConnId) -> bool {
        self.destroy(id, Err(ConnError::Aborted))
    }

    /// Run the sender path of `id`.
    pub fn on_readable(&mut self, id: ConnId, now: Instant) -> Option<Fill> {
        self.connections.get_mut(&id).map(|c| c.on_readable(now))
    }

    /// Run the receiver path of `id`, destroying it once both sides closed.
    pub fn on_segment(&mut self, id: ConnId, datagram: &[u8]) -> Option<Disposition> {
        let disposition = self.connections.get_mut(&id)?.on_segment(datagram);
        if disposition == Disposition::Finished {
            self.destroy(id, Ok(()));
        }
        Some(disposition)
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection<E>> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection<E>> {
        self.connections.get_mut(&id)
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.connections.keys().copied()
    }

    /// Visit every live connection in handle order.
    ///
    /// The map cannot change shape during the visit; callers that decide to
    /// destroy a connection collect its handle and destroy it afterwards.
    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(ConnId, &mut Connection<E>),
    {
        for (&id, conn) in self.connections.iter_mut() {
            f(id, conn);
        }
    }
}
