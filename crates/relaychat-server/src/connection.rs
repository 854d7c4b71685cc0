//! Per-connection actor.
//!
//! Runs the relay side of the key exchange over its own socket, hands the
//! write half to the coordinator, then decrypts records and reports them as
//! join and read events. Whatever ends the loop is reported once as a quit,
//! unless the coordinator evicted the connection first.

use rand::rngs::OsRng;
use relaychat_core::{HandshakeAction, HandshakeError, RecordReader, RelayHandshake, write_record};
use relaychat_crypto::SessionCipher;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
};

use crate::{
    coordinator::Inbound,
    driver::RelayEvent,
    error::ConnectionError,
    registry::ConnectionId,
};

/// Drive one accepted connection to completion.
///
/// Returns when the peer disconnects, a record fails to read or decrypt, the
/// coordinator evicts the connection, or the coordinator goes away.
pub async fn run_connection<R, W>(
    connection: ConnectionId,
    reader: R,
    mut writer: W,
    coordinator: mpsc::Sender<Inbound<W>>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = RecordReader::new(reader);

    let session = match handshake(&mut reader, &mut writer).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("connection {} handshake failed: {}", connection, e);
            report_closed(&coordinator, connection, e.to_string()).await;
            return;
        },
    };

    let (shutdown, evicted) = oneshot::channel();
    let established =
        Inbound::Established { connection, session: session.clone(), writer, shutdown };
    if coordinator.send(established).await.is_err() {
        return;
    }

    let err = tokio::select! {
        result = relay_records(connection, &mut reader, &session, &coordinator) => match result {
            Ok(()) => return,
            Err(e) => e,
        },
        _ = evicted => {
            tracing::debug!("connection {} evicted by coordinator", connection);
            return;
        },
    };

    match err {
        ConnectionError::Closed => tracing::debug!("connection {} closed by peer", connection),
        ref e => tracing::warn!("connection {} failed: {}", connection, e),
    }
    report_closed(&coordinator, connection, err.to_string()).await;
}

async fn handshake<R, W>(
    reader: &mut RecordReader<R>,
    writer: &mut W,
) -> Result<SessionCipher, ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut handshake = RelayHandshake::new();

    let record = reader.next_record().await?.ok_or(ConnectionError::Closed)?;
    handshake.handle_record(&record)?;

    for action in handshake.send_session_key(&mut OsRng)? {
        match action {
            HandshakeAction::SendRecord(record) => write_record(writer, &record).await?,
            HandshakeAction::Established(cipher) => return Ok(cipher),
        }
    }

    Err(HandshakeError::InvalidState { state: handshake.state(), operation: "establish" }.into())
}

/// Decrypt records until the connection fails.
///
/// `Ok(())` only when the coordinator is gone and nothing is left to report to.
async fn relay_records<R, W>(
    connection: ConnectionId,
    reader: &mut RecordReader<R>,
    session: &SessionCipher,
    coordinator: &mpsc::Sender<Inbound<W>>,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let mut introduced = false;

    loop {
        let record = reader.next_record().await?.ok_or(ConnectionError::Closed)?;
        let text = session.decrypt(&record)?;

        let event = if introduced {
            RelayEvent::MessageReceived { connection, text }
        } else {
            introduced = true;
            RelayEvent::Joined { connection, display_name: text }
        };

        if coordinator.send(Inbound::Event(event)).await.is_err() {
            return Ok(());
        }
    }
}

async fn report_closed<W>(
    coordinator: &mpsc::Sender<Inbound<W>>,
    connection: ConnectionId,
    reason: String,
) {
    // A closed inbox means the relay is shutting down
    let closed = RelayEvent::ConnectionClosed { connection, reason };
    let _ = coordinator.send(Inbound::Event(closed)).await;
}
