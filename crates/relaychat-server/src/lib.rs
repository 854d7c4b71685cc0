//! Relaychat relay.
//!
//! Accepts endpoint connections over TCP and rebroadcasts their chat under
//! each recipient's own session key.
//!
//! # Architecture
//!
//! The [`RelayDriver`] is pure action-based logic: it owns the
//! [`ConnectionRegistry`] and turns join, read and quit events into
//! per-recipient ciphertexts. [`Server`] is the runtime around it:
//!
//! - one connection actor per accepted socket ([`run_connection`]) runs the
//!   relay half of the key exchange and reports decrypted records
//! - one [`Coordinator`] task owns the driver, so the registry has a single
//!   writer and broadcasts are serialized
//! - one writer task per connection drains that connection's outbound queue,
//!   so a peer that stops reading never holds up the others
//!
//! # Components
//!
//! - [`Server`]: binds the listener and runs the accept loop
//! - [`Coordinator`]: executes driver actions against per-connection queues
//! - [`RelayDriver`]: event in, actions out (no I/O)
//! - [`ConnectionRegistry`]: insertion-ordered established connections

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod coordinator;
mod driver;
mod error;
mod registry;

use std::net::SocketAddr;

pub use connection::run_connection;
pub use coordinator::{Coordinator, DEFAULT_INBOX_CAPACITY, DEFAULT_OUTBOUND_CAPACITY, Inbound};
pub use driver::{
    BroadcastPolicy, LogLevel, RelayAction, RelayConfig as DriverConfig, RelayDriver, RelayEvent,
};
pub use error::{ConnectionError, ServerError};
pub use registry::{ConnectionId, ConnectionRecord, ConnectionRegistry};
use tokio::net::{TcpListener, TcpSocket, tcp::OwnedWriteHalf};

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:1234";

/// Default accept backlog.
pub const DEFAULT_BACKLOG: u32 = 50;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "127.0.0.1:1234")
    pub bind_address: String,
    /// Pending-connection queue length passed to `listen`
    pub backlog: u32,
    /// Driver configuration (join notice policy)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            backlog: DEFAULT_BACKLOG,
            driver: DriverConfig::default(),
        }
    }
}

/// Production relay server.
///
/// Wraps [`RelayDriver`] with a TCP listener and tokio tasks.
pub struct Server {
    listener: TcpListener,
    driver: DriverConfig,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ServerError::Config(format!("invalid bind address '{}': {}", config.bind_address, e))
        })?;

        if config.backlog == 0 {
            return Err(ServerError::Config("backlog must be at least 1".to_string()));
        }

        let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.backlog)?;

        Ok(Self { listener, driver: config.driver })
    }

    /// Run the server, accepting connections and relaying their messages.
    ///
    /// Runs until the coordinator task stops, which only happens on a bug.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Relay listening on {}", self.local_addr()?);

        let (coordinator, inbox) = Coordinator::<OwnedWriteHalf>::new(self.driver);
        let mut coordinator = tokio::spawn(coordinator.run());
        let mut next_id: u64 = 0;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        next_id += 1;
                        let connection = ConnectionId::new(next_id);
                        tracing::info!("{} connected as connection {}", peer, connection);

                        let (reader, writer) = stream.into_split();
                        tokio::spawn(run_connection(connection, reader, writer, inbox.clone()));
                    },
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    },
                },
                result = &mut coordinator => {
                    let reason = match result {
                        Ok(()) => "coordinator stopped".to_string(),
                        Err(e) => format!("coordinator failed: {e}"),
                    };
                    return Err(ServerError::Internal(reason));
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }
}
