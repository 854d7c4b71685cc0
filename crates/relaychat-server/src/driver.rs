//! Relay driver.
//!
//! Pure action-based core of the relay. Connection actors report what they
//! observed as [`RelayEvent`]s; the driver updates the
//! [`ConnectionRegistry`] and answers with [`RelayAction`]s for the runtime
//! to execute. No I/O happens here, so every fan-out rule is testable without
//! sockets.

use relaychat_core::notice;
use relaychat_crypto::SessionCipher;

use crate::registry::{ConnectionId, ConnectionRegistry};

/// Who receives the "entered" notice when a peer introduces itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BroadcastPolicy {
    /// Every established connection, the newcomer included.
    #[default]
    IncludeSender,
    /// Every established connection except the newcomer.
    ExcludeSender,
}

/// Relay configuration
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// Recipients of the join notice
    pub join_notice: BroadcastPolicy,
}

/// Events that the relay driver processes.
///
/// These are produced by connection actors and delivered in order by the
/// coordinator.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A connection completed its key exchange
    ConnectionEstablished {
        /// Connection that finished the handshake
        connection: ConnectionId,
        /// Session cipher agreed with that peer
        session: SessionCipher,
    },

    /// First decrypted record from a connection: its display name
    Joined {
        /// Connection that introduced itself
        connection: ConnectionId,
        /// Self-asserted display name
        display_name: String,
    },

    /// Any later decrypted record from a connection
    MessageReceived {
        /// Connection that sent the message
        connection: ConnectionId,
        /// Decrypted message text
        text: String,
    },

    /// A connection ended (peer closed, read failed, write failed)
    ConnectionClosed {
        /// Connection that ended
        connection: ConnectionId,
        /// Reason for closure
        reason: String,
    },
}

/// Actions that the relay driver produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Write one encrypted record to a connection
    SendRecord {
        /// Target connection
        connection: ConnectionId,
        /// Base64 ciphertext, already under the target's session key
        record: String,
    },

    /// Release the runtime's resources for a connection
    Disconnect {
        /// Connection to drop
        connection: ConnectionId,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for relay actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
}

/// Action-based relay driver.
///
/// Owns the registry of established connections and turns every event into
/// per-recipient ciphertexts. Each recipient's copy is encrypted under that
/// recipient's own session key.
#[derive(Debug, Default)]
pub struct RelayDriver {
    registry: ConnectionRegistry,
    config: RelayConfig,
}

impl RelayDriver {
    /// Create a new relay driver.
    pub fn new(config: RelayConfig) -> Self {
        Self { registry: ConnectionRegistry::new(), config }
    }

    /// Registry of established connections.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Process a relay event and return actions to execute.
    pub fn process_event(&mut self, event: RelayEvent) -> Vec<RelayAction> {
        match event {
            RelayEvent::ConnectionEstablished { connection, session } => {
                self.handle_established(connection, session)
            },
            RelayEvent::Joined { connection, display_name } => {
                self.handle_joined(connection, display_name)
            },
            RelayEvent::MessageReceived { connection, text } => {
                self.handle_message(connection, &text)
            },
            RelayEvent::ConnectionClosed { connection, reason } => {
                self.handle_closed(connection, &reason)
            },
        }
    }

    fn handle_established(
        &mut self,
        connection: ConnectionId,
        session: SessionCipher,
    ) -> Vec<RelayAction> {
        if !self.registry.register(connection, session) {
            return vec![log(
                LogLevel::Warn,
                format!("connection {connection} established twice, keeping first session"),
            )];
        }

        vec![log(
            LogLevel::Debug,
            format!(
                "connection {connection} established ({} connected)",
                self.registry.len()
            ),
        )]
    }

    fn handle_joined(&mut self, connection: ConnectionId, display_name: String) -> Vec<RelayAction> {
        let joined = notice::joined(&display_name);

        if !self.registry.introduce(connection, display_name) {
            let message = if self.registry.contains(connection) {
                format!("connection {connection} introduced itself twice, ignoring")
            } else {
                format!("introduction from unknown connection {connection} dropped")
            };
            return vec![log(LogLevel::Warn, message)];
        }

        let exclude = match self.config.join_notice {
            BroadcastPolicy::IncludeSender => None,
            BroadcastPolicy::ExcludeSender => Some(connection),
        };

        let mut actions = self.broadcast(&joined, exclude);
        actions.push(log(
            LogLevel::Info,
            format!("{joined} on connection {connection} (present: {})", self.roster()),
        ));
        actions
    }

    fn handle_message(&self, connection: ConnectionId, text: &str) -> Vec<RelayAction> {
        let Some(name) = self.registry.get(connection).and_then(|r| r.display_name()) else {
            return vec![log(
                LogLevel::Debug,
                format!("message from unintroduced connection {connection} dropped"),
            )];
        };

        let line = notice::chat(name, text);
        let mut actions = self.broadcast(&line, Some(connection));
        actions.push(log(LogLevel::Debug, format!("relayed message from connection {connection}")));
        actions
    }

    fn handle_closed(&mut self, connection: ConnectionId, reason: &str) -> Vec<RelayAction> {
        let Some(record) = self.registry.unregister(connection) else {
            // Already removed, or never finished its handshake
            return vec![RelayAction::Disconnect { connection }];
        };

        let mut actions = vec![RelayAction::Disconnect { connection }];

        if let Some(name) = record.display_name() {
            actions.extend(self.broadcast(&notice::left(name), None));
        }

        actions.push(log(
            LogLevel::Info,
            format!("connection {connection} closed: {reason} (present: {})", self.roster()),
        ));
        actions
    }

    /// Introduced names, for join and quit log lines.
    fn roster(&self) -> String {
        let names: Vec<_> = self.registry.display_names().collect();
        if names.is_empty() { "nobody".to_string() } else { names.join(", ") }
    }

    fn broadcast(&self, plaintext: &str, exclude: Option<ConnectionId>) -> Vec<RelayAction> {
        self.registry
            .recipients(exclude)
            .map(|r| RelayAction::SendRecord { connection: r.id(), record: r.encrypt(plaintext) })
            .collect()
    }
}

fn log(level: LogLevel, message: String) -> RelayAction {
    RelayAction::Log { level, message }
}
