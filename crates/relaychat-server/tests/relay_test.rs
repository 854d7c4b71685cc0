//! Relay tests over real TCP.
//!
//! Peers speak the wire protocol by hand through the core handshake so each
//! step can be observed or broken on purpose.

use std::{net::SocketAddr, time::Duration};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use relaychat_core::{EndpointHandshake, HandshakeAction, RecordReader, write_record};
use relaychat_crypto::SessionCipher;
use relaychat_server::{BroadcastPolicy, DriverConfig, Server, ServerError, ServerRuntimeConfig};
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};

const TIMEOUT: Duration = Duration::from_secs(10);
const TEST_KEY_BITS: usize = 1024;

async fn start_relay(driver: DriverConfig) -> SocketAddr {
    let config =
        ServerRuntimeConfig { bind_address: "127.0.0.1:0".to_string(), driver, ..Default::default() };
    let server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

struct TestPeer {
    reader: RecordReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    session: SessionCipher,
}

impl TestPeer {
    async fn connect(addr: SocketAddr, name: &str, seed: u64) -> Self {
        let stream = timeout(TIMEOUT, TcpStream::connect(addr)).await.unwrap().unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = RecordReader::new(reader);
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut handshake = EndpointHandshake::with_key_bits(name, TEST_KEY_BITS);

        for action in handshake.offer_public_key(&mut rng).unwrap() {
            if let HandshakeAction::SendRecord(record) = action {
                write_record(&mut writer, &record).await.unwrap();
            }
        }

        let wrapped = timeout(TIMEOUT, reader.next_record()).await.unwrap().unwrap().unwrap();
        let mut session = None;
        for action in handshake.handle_record(&wrapped).unwrap() {
            match action {
                HandshakeAction::SendRecord(record) => {
                    write_record(&mut writer, &record).await.unwrap();
                },
                HandshakeAction::Established(cipher) => session = Some(cipher),
            }
        }

        Self { reader, writer, session: session.unwrap() }
    }

    async fn send(&mut self, text: &str) {
        write_record(&mut self.writer, &self.session.encrypt(text)).await.unwrap();
    }

    async fn recv(&mut self) -> String {
        let record = timeout(TIMEOUT, self.reader.next_record()).await.unwrap().unwrap().unwrap();
        self.session.decrypt(&record).unwrap()
    }
}

#[tokio::test]
async fn bind_rejects_invalid_address() {
    let config =
        ServerRuntimeConfig { bind_address: "not an address".to_string(), ..Default::default() };

    let result = Server::bind(config);
    assert!(matches!(result, Err(ServerError::Config(_))));
}

#[tokio::test]
async fn bind_rejects_zero_backlog() {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        backlog: 0,
        ..Default::default()
    };

    assert!(matches!(Server::bind(config), Err(ServerError::Config(_))));
}

#[test]
fn runtime_config_defaults() {
    let config = ServerRuntimeConfig::default();

    assert_eq!(config.bind_address, "127.0.0.1:1234");
    assert_eq!(config.backlog, 50);
    assert_eq!(config.driver.join_notice, BroadcastPolicy::IncludeSender);
}

#[tokio::test]
async fn joiner_sees_own_entered_notice() {
    let addr = start_relay(DriverConfig::default()).await;

    let mut alice = TestPeer::connect(addr, "Alice", 1).await;

    assert_eq!(alice.recv().await, "(Alice entered...)");
}

#[tokio::test]
async fn message_reaches_others_under_their_own_keys() {
    let addr = start_relay(DriverConfig::default()).await;

    let mut alice = TestPeer::connect(addr, "Alice", 1).await;
    assert_eq!(alice.recv().await, "(Alice entered...)");

    let mut bob = TestPeer::connect(addr, "Bob", 2).await;
    assert_eq!(bob.recv().await, "(Bob entered...)");
    assert_eq!(alice.recv().await, "(Bob entered...)");

    alice.send("hello").await;
    assert_eq!(bob.recv().await, "[Alice] -> hello");

    // Same text sent twice is a message, not a second introduction
    bob.send("Bob").await;
    assert_eq!(alice.recv().await, "[Bob] -> Bob");
}

#[tokio::test]
async fn exclude_sender_policy_hides_own_join() {
    let addr = start_relay(DriverConfig { join_notice: BroadcastPolicy::ExcludeSender }).await;

    let mut alice = TestPeer::connect(addr, "Alice", 1).await;
    let mut bob = TestPeer::connect(addr, "Bob", 2).await;
    assert_eq!(alice.recv().await, "(Bob entered...)");

    // First thing Bob sees is Alice's message, not his own join
    alice.send("welcome").await;
    assert_eq!(bob.recv().await, "[Alice] -> welcome");
}

#[tokio::test]
async fn disconnect_announces_departure() {
    let addr = start_relay(DriverConfig::default()).await;

    let mut alice = TestPeer::connect(addr, "Alice", 1).await;
    assert_eq!(alice.recv().await, "(Alice entered...)");
    let bob = TestPeer::connect(addr, "Bob", 2).await;
    assert_eq!(alice.recv().await, "(Bob entered...)");

    drop(bob);

    assert_eq!(alice.recv().await, "(Bob left...)");
}

#[tokio::test]
async fn garbage_handshake_closes_only_that_connection() {
    let addr = start_relay(DriverConfig::default()).await;

    let mut alice = TestPeer::connect(addr, "Alice", 1).await;
    assert_eq!(alice.recv().await, "(Alice entered...)");

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    writer.write_all(b"definitely not a public key\r\n").await.unwrap();
    let mut reader = RecordReader::new(reader);
    let closed = timeout(TIMEOUT, reader.next_record()).await.unwrap();
    assert!(matches!(closed, Ok(None) | Err(_)));

    // Relay still serves everyone else
    let mut bob = TestPeer::connect(addr, "Bob", 2).await;
    assert_eq!(bob.recv().await, "(Bob entered...)");
    assert_eq!(alice.recv().await, "(Bob entered...)");
}

#[tokio::test]
async fn undecryptable_record_ends_connection_with_quit() {
    let addr = start_relay(DriverConfig::default()).await;

    let mut alice = TestPeer::connect(addr, "Alice", 1).await;
    assert_eq!(alice.recv().await, "(Alice entered...)");
    let mut bob = TestPeer::connect(addr, "Bob", 2).await;
    assert_eq!(alice.recv().await, "(Bob entered...)");

    // Valid base64, not a multiple of the block size
    write_record(&mut bob.writer, "AAAA").await.unwrap();

    assert_eq!(alice.recv().await, "(Bob left...)");
}

#[tokio::test]
async fn peer_that_never_reads_does_not_stall_the_relay() {
    let addr = start_relay(DriverConfig::default()).await;

    let mut alice = TestPeer::connect(addr, "Alice", 1).await;
    assert_eq!(alice.recv().await, "(Alice entered...)");
    // Finishes the handshake, then never reads again
    let _mallory = TestPeer::connect(addr, "Mallory", 3).await;
    assert_eq!(alice.recv().await, "(Mallory entered...)");
    let mut bob = TestPeer::connect(addr, "Bob", 2).await;
    assert_eq!(bob.recv().await, "(Bob entered...)");

    let payload = "x".repeat(40_000);
    let expected = format!("[Alice] -> {payload}");
    let bob_reader = tokio::spawn(async move {
        let mut relayed = 0;
        loop {
            let line = bob.recv().await;
            if line == "[Alice] -> marker" {
                return relayed;
            }
            assert_eq!(line, expected);
            relayed += 1;
        }
    });

    // Far more than Mallory's socket buffers can hold
    for _ in 0..400 {
        alice.send(&payload).await;
    }
    alice.send("marker").await;

    let relayed = timeout(Duration::from_secs(60), bob_reader).await.unwrap().unwrap();
    assert_eq!(relayed, 400);
}
