//! Registry of established connections.
//!
//! Insertion-ordered so broadcasts reach peers in the order they finished
//! their handshake. Only the coordinator holds a registry; connection actors
//! never touch it.

use std::fmt;

use relaychat_crypto::SessionCipher;

/// Relay-assigned identity of one accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coordinator-side view of one established connection.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    id: ConnectionId,
    session: SessionCipher,
    display_name: Option<String>,
}

impl ConnectionRecord {
    /// Connection this record describes.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Self-asserted display name. `None` until the introduction arrives.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Encrypt `plaintext` under this connection's own session key.
    pub fn encrypt(&self, plaintext: &str) -> String {
        self.session.encrypt(plaintext)
    }
}

/// Insertion-ordered set of established connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    records: Vec<ConnectionRecord>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an established connection.
    ///
    /// Returns `false` if the connection is already registered.
    pub fn register(&mut self, id: ConnectionId, session: SessionCipher) -> bool {
        if self.contains(id) {
            return false;
        }

        self.records.push(ConnectionRecord { id, session, display_name: None });
        true
    }

    /// Remove a connection. `None` if it was not registered.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<ConnectionRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(index))
    }

    /// Record for a connection. `None` if not registered.
    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Check if a connection is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.get(id).is_some()
    }

    /// Set the display name of a connection.
    ///
    /// Returns `false` if the connection is unknown or already has a name;
    /// a name is set at most once.
    pub fn introduce(&mut self, id: ConnectionId, display_name: String) -> bool {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) if record.display_name.is_none() => {
                record.display_name = Some(display_name);
                true
            },
            _ => false,
        }
    }

    /// Records in insertion order, skipping `exclude`.
    pub fn recipients(
        &self,
        exclude: Option<ConnectionId>,
    ) -> impl Iterator<Item = &ConnectionRecord> + '_ {
        self.records.iter().filter(move |r| Some(r.id) != exclude)
    }

    /// Display names of introduced connections, in insertion order.
    pub fn display_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.records.iter().filter_map(ConnectionRecord::display_name)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
