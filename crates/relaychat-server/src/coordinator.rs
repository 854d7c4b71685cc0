//! Relay coordinator.
//!
//! Single task that owns the [`RelayDriver`]. Connection actors feed it
//! [`Inbound`] messages over one channel, so join, read and quit handling are
//! serialized and a broadcast is never interleaved with a registry change.
//!
//! The coordinator never touches a socket. Each established connection gets
//! an outbound queue drained by its own writer task, so a peer that stops
//! reading stalls only its own writer. A connection is evicted when its
//! writer reports a failed write or its queue overflows: the queue and the
//! actor's shutdown signal are dropped and one quit is queued for it. Queued
//! quits run before the next inbound message and are deduplicated, so an
//! eviction announces the departure exactly once even if the connection actor
//! reports the same quit later.

use std::collections::{HashMap, HashSet, VecDeque};

use relaychat_core::write_record;
use relaychat_crypto::SessionCipher;
use tokio::{
    io::AsyncWrite,
    sync::{mpsc, oneshot},
    task::AbortHandle,
};

use crate::{
    driver::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent},
    registry::ConnectionId,
};

/// Default capacity of the coordinator inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// Default number of records queued for one connection before it is evicted.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// Messages from connection actors to the coordinator.
#[derive(Debug)]
pub enum Inbound<W> {
    /// Handshake finished; the coordinator takes over the write half
    Established {
        /// Connection that finished the handshake
        connection: ConnectionId,
        /// Session cipher agreed with that peer
        session: SessionCipher,
        /// Write half of the socket
        writer: W,
        /// Dropped by the coordinator to stop the connection actor
        shutdown: oneshot::Sender<()>,
    },

    /// Any other relay event
    Event(RelayEvent),
}

/// Coordinator-side handle to one connection's writer task.
struct Outbound {
    queue: mpsc::Sender<String>,
    task: AbortHandle,
    // Held only to be dropped; the actor stops when it goes away
    _shutdown: oneshot::Sender<()>,
}

/// Owner of the relay driver and every connection's outbound queue.
pub struct Coordinator<W> {
    driver: RelayDriver,
    outbound: HashMap<ConnectionId, Outbound>,
    outbound_capacity: usize,
    inbox: mpsc::Receiver<Inbound<W>>,
    failures_tx: mpsc::UnboundedSender<ConnectionId>,
    failures: mpsc::UnboundedReceiver<ConnectionId>,
    pending_quits: VecDeque<ConnectionId>,
    queued_quits: HashSet<ConnectionId>,
}

impl<W> Coordinator<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Create a coordinator and the sender connection actors report to.
    pub fn new(config: RelayConfig) -> (Self, mpsc::Sender<Inbound<W>>) {
        Self::with_capacity(config, DEFAULT_INBOX_CAPACITY, DEFAULT_OUTBOUND_CAPACITY)
    }

    /// Create a coordinator with custom inbox and per-connection queue sizes.
    pub fn with_capacity(
        config: RelayConfig,
        inbox_capacity: usize,
        outbound_capacity: usize,
    ) -> (Self, mpsc::Sender<Inbound<W>>) {
        let (tx, inbox) = mpsc::channel(inbox_capacity);
        let (failures_tx, failures) = mpsc::unbounded_channel();
        let coordinator = Self {
            driver: RelayDriver::new(config),
            outbound: HashMap::new(),
            outbound_capacity,
            inbox,
            failures_tx,
            failures,
            pending_quits: VecDeque::new(),
            queued_quits: HashSet::new(),
        };
        (coordinator, tx)
    }

    /// Process inbound messages until every sender is dropped.
    pub async fn run(mut self) {
        loop {
            self.drain_pending_quits();

            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
                Some(connection) = self.failures.recv() => {
                    // A failure for a connection already removed is stale
                    if self.outbound.contains_key(&connection) {
                        self.evict(connection);
                    }
                },
            }
        }

        tracing::debug!("coordinator inbox closed, shutting down");
    }

    fn handle(&mut self, message: Inbound<W>) {
        let event = match message {
            Inbound::Established { connection, session, writer, shutdown } => {
                self.attach(connection, writer, shutdown);
                RelayEvent::ConnectionEstablished { connection, session }
            },
            Inbound::Event(event) => event,
        };

        let actions = self.driver.process_event(event);
        self.execute_actions(actions);
    }

    fn attach(&mut self, connection: ConnectionId, writer: W, shutdown: oneshot::Sender<()>) {
        // The driver keeps the first session too
        if self.outbound.contains_key(&connection) {
            return;
        }

        let (queue, records) = mpsc::channel(self.outbound_capacity);
        let task =
            tokio::spawn(write_outbound(connection, writer, records, self.failures_tx.clone()));

        let outbound = Outbound { queue, task: task.abort_handle(), _shutdown: shutdown };
        self.outbound.insert(connection, outbound);
    }

    /// Drop a connection's queue, stop its tasks and queue its quit once.
    fn evict(&mut self, connection: ConnectionId) {
        if let Some(outbound) = self.outbound.remove(&connection) {
            outbound.task.abort();
        }
        if self.queued_quits.insert(connection) {
            self.pending_quits.push_back(connection);
        }
    }

    fn drain_pending_quits(&mut self) {
        while let Some(connection) = self.pending_quits.pop_front() {
            self.queued_quits.remove(&connection);

            let actions = self.driver.process_event(RelayEvent::ConnectionClosed {
                connection,
                reason: "write failed".to_string(),
            });
            self.execute_actions(actions);
        }
    }

    fn execute_actions(&mut self, actions: Vec<RelayAction>) {
        for action in actions {
            match action {
                RelayAction::SendRecord { connection, record } => {
                    // Missing queue means the connection is already being evicted
                    let Some(outbound) = self.outbound.get(&connection) else {
                        continue;
                    };

                    match outbound.queue.try_send(record) {
                        Ok(()) => {},
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!(
                                "connection {} is not reading, outbound queue full",
                                connection
                            );
                            self.evict(connection);
                        },
                        Err(mpsc::error::TrySendError::Closed(_)) => self.evict(connection),
                    }
                },

                RelayAction::Disconnect { connection } => {
                    // Writer drains what is already queued, then closes
                    self.outbound.remove(&connection);
                },

                RelayAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                },
            }
        }
    }
}

/// Write queued records to one connection until the queue closes.
///
/// A failed write is reported on `failures` and ends the task.
async fn write_outbound<W>(
    connection: ConnectionId,
    mut writer: W,
    mut records: mpsc::Receiver<String>,
    failures: mpsc::UnboundedSender<ConnectionId>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(record) = records.recv().await {
        if let Err(e) = write_record(&mut writer, &record).await {
            tracing::warn!("write to connection {} failed: {}", connection, e);
            // Coordinator gone means nothing is left to evict from
            let _ = failures.send(connection);
            return;
        }
    }
}
