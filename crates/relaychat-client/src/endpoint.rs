//! Endpoint session.
//!
//! [`Endpoint::connect`] returns only once the session key is agreed and the
//! introduction is on the wire. [`Endpoint::run`] then services two sources:
//! records from the relay (read by a dedicated task) and local input lines.
//! `select!` picks whichever is ready first, so neither starves the other.

use rand::{CryptoRng, RngCore, rngs::OsRng};
use relaychat_core::{
    EndpointHandshake, HandshakeAction, HandshakeError, RecordReader, WireError, write_record,
};
use relaychat_crypto::SessionCipher;
use tokio::{
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
};

use crate::error::EndpointError;

/// Records buffered between the socket reader task and the relay loop.
const RECORD_BUFFER: usize = 32;

/// An established session with the relay.
#[derive(Debug)]
pub struct Endpoint {
    reader: RecordReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    session: SessionCipher,
    display_name: String,
}

impl Endpoint {
    /// Connect, exchange keys and introduce ourselves as `display_name`.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        display_name: impl Into<String>,
    ) -> Result<Self, EndpointError> {
        Self::connect_with(addr, EndpointHandshake::new(display_name), &mut OsRng).await
    }

    /// Like [`Endpoint::connect`] with a prepared handshake and RNG.
    pub async fn connect_with<A, R>(
        addr: A,
        mut handshake: EndpointHandshake,
        rng: &mut R,
    ) -> Result<Self, EndpointError>
    where
        A: ToSocketAddrs,
        R: RngCore + CryptoRng,
    {
        let stream = TcpStream::connect(addr).await.map_err(EndpointError::Connect)?;
        let peer = stream.peer_addr().map_err(EndpointError::Connect)?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = RecordReader::new(reader);

        tracing::debug!("connected to relay at {}, starting handshake", peer);

        let offer = handshake.offer_public_key(rng)?;
        for action in offer {
            if let HandshakeAction::SendRecord(record) = action {
                write_record(&mut writer, &record).await?;
            }
        }

        let wrapped = reader.next_record().await?.ok_or(EndpointError::HandshakeInterrupted)?;
        let actions = handshake.handle_record(&wrapped)?;
        let session = establish(&mut writer, &handshake, actions).await?;

        tracing::info!("session established with {} as '{}'", peer, handshake.display_name());

        Ok(Self { reader, writer, session, display_name: handshake.display_name().to_string() })
    }

    /// Name this endpoint introduced itself with.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Relay lines until the socket closes.
    ///
    /// Each non-empty line from `input` is encrypted and sent; a trailing
    /// `\r` is trimmed first. Each record from the relay is decrypted and
    /// delivered to `output`. When `input` closes the loop keeps delivering
    /// relay output.
    ///
    /// Returns `Ok(())` when the relay closes the socket or `output` is
    /// dropped.
    ///
    /// # Errors
    ///
    /// - `EndpointError::Socket` if reading or writing the socket fails
    /// - `EndpointError::Crypto` if a relay record does not decrypt
    pub async fn run(
        self,
        input: mpsc::Receiver<String>,
        output: mpsc::Sender<String>,
    ) -> Result<(), EndpointError> {
        let Self { reader, mut writer, session, .. } = self;

        let (records_tx, records) = mpsc::channel(RECORD_BUFFER);
        let reader_task = tokio::spawn(forward_records(reader, records_tx));

        let result = relay_loop(&mut writer, &session, records, input, output).await;

        reader_task.abort();
        result
    }
}

/// Execute the final handshake actions, returning the agreed cipher.
async fn establish(
    writer: &mut OwnedWriteHalf,
    handshake: &EndpointHandshake,
    actions: Vec<HandshakeAction>,
) -> Result<SessionCipher, EndpointError> {
    for action in actions {
        match action {
            HandshakeAction::SendRecord(record) => write_record(writer, &record).await?,
            HandshakeAction::Established(cipher) => return Ok(cipher),
        }
    }

    Err(HandshakeError::InvalidState {
        state: handshake.state(),
        operation: "establish",
    }
    .into())
}

/// Read relay records into `tx` until EOF, a read error, or `tx` closes.
async fn forward_records(
    mut reader: RecordReader<OwnedReadHalf>,
    tx: mpsc::Sender<Result<String, WireError>>,
) {
    loop {
        let item = match reader.next_record().await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => return,
            Err(e) => Err(e),
        };
        let failed = item.is_err();

        if tx.send(item).await.is_err() || failed {
            return;
        }
    }
}

async fn relay_loop(
    writer: &mut OwnedWriteHalf,
    session: &SessionCipher,
    mut records: mpsc::Receiver<Result<String, WireError>>,
    mut input: mpsc::Receiver<String>,
    output: mpsc::Sender<String>,
) -> Result<(), EndpointError> {
    let mut input_open = true;

    loop {
        tokio::select! {
            record = records.recv() => match record {
                Some(record) => {
                    let line = session.decrypt(&record?)?;
                    if output.send(line).await.is_err() {
                        tracing::debug!("output closed, leaving relay loop");
                        return Ok(());
                    }
                },
                None => {
                    tracing::info!("relay closed the connection");
                    return Ok(());
                },
            },
            line = input.recv(), if input_open => match line {
                Some(line) => {
                    let text = line.strip_suffix('\r').unwrap_or(&line);
                    if !text.is_empty() {
                        write_record(writer, &session.encrypt(text)).await?;
                    }
                },
                None => {
                    tracing::debug!("local input closed, still receiving");
                    input_open = false;
                },
            },
        }
    }
}
