//! Key-exchange state machines.
//!
//! Each connection runs two halves of the same protocol in lockstep: the
//! [`EndpointHandshake`] on the client and the [`RelayHandshake`] inside the
//! relay's per-connection actor. Exactly four records cross the wire before
//! both sides reach [`HandshakeState::Established`]: public key, wrapped
//! session key, then the endpoint's introduction.
//!
//! Both machines are pure. They take received records (and an RNG where keys
//! are generated) and return [`HandshakeAction`]s for the driver to execute.
//!
//! # State Machine
//!
//! ```text
//! Endpoint:
//! ┌────────────────────┐ offer_public_key ┌──────────────────────────┐ handle_record ┌─────────────┐
//! │ AwaitPeerPublicKey │─────────────────>│ AwaitEncryptedSessionKey │──────────────>│ Established │
//! └────────────────────┘                  └──────────────────────────┘               └─────────────┘
//!
//! Relay:
//! ┌────────────────┐ handle_record ┌───────────────────────┐ send_session_key ┌─────────────┐
//! │ AwaitPublicKey │──────────────>│ ReadyToSendSessionKey │─────────────────>│ Established │
//! └────────────────┘               └───────────────────────┘                  └─────────────┘
//! ```
//!
//! Transitions only move right. A failed step leaves the machine where it was
//! and the caller drops the connection; there is no renegotiation.

use rand::{CryptoRng, RngCore};
use relaychat_crypto::{
    KeyPair, PublicKey, RSA_KEY_BITS, SessionCipher, SessionKey, decode_base64, encode_base64,
};

use crate::error::HandshakeError;

/// Handshake progress of one side of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Endpoint: keypair not generated yet, public key not offered
    AwaitPeerPublicKey,
    /// Endpoint: public key sent, waiting for the wrapped session key
    AwaitEncryptedSessionKey,
    /// Relay: waiting for the endpoint's public key
    AwaitPublicKey,
    /// Relay: peer public key known, session key not sent yet
    ReadyToSendSessionKey,
    /// Session key shared, application records allowed
    Established,
}

/// Actions returned by the handshake state machines.
///
/// The driver executes these in order:
/// - `SendRecord`: write the record as one line to the peer
/// - `Established`: switch the connection to application traffic
#[derive(Debug, Clone)]
pub enum HandshakeAction {
    /// Write this base64 record to the peer
    SendRecord(String),

    /// Handshake complete; all further records use this cipher
    Established(SessionCipher),
}

/// Endpoint half of the key exchange.
///
/// Generates a throwaway RSA keypair, recovers the session key the relay
/// wraps under it, then introduces itself with its display name.
#[derive(Debug)]
pub struct EndpointHandshake {
    state: HandshakeState,
    display_name: String,
    key_bits: usize,
    keypair: Option<KeyPair>,
    session: Option<SessionCipher>,
}

impl EndpointHandshake {
    /// Create a new handshake in [`HandshakeState::AwaitPeerPublicKey`].
    pub fn new(display_name: impl Into<String>) -> Self {
        Self::with_key_bits(display_name, RSA_KEY_BITS)
    }

    /// Like [`EndpointHandshake::new`] with a non-default RSA modulus size.
    pub fn with_key_bits(display_name: impl Into<String>, key_bits: usize) -> Self {
        Self {
            state: HandshakeState::AwaitPeerPublicKey,
            display_name: display_name.into(),
            key_bits,
            keypair: None,
            session: None,
        }
    }

    /// Current handshake state
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Display name sent as the introduction.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Session cipher. `None` until established.
    pub fn session(&self) -> Option<&SessionCipher> {
        self.session.as_ref()
    }

    /// Generate the keypair and offer its public half (step 2).
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not in `AwaitPeerPublicKey`
    /// - `HandshakeError::Crypto` if key generation or encoding fails
    pub fn offer_public_key<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        self.expect_state(HandshakeState::AwaitPeerPublicKey, "offer_public_key")?;

        let keypair = KeyPair::generate_with_bits(rng, self.key_bits)?;
        let record = keypair.public_key().to_base64()?;

        self.keypair = Some(keypair);
        self.state = HandshakeState::AwaitEncryptedSessionKey;

        Ok(vec![HandshakeAction::SendRecord(record)])
    }

    /// Unwrap the session key sent by the relay (step 5) and introduce
    /// ourselves (step 6).
    ///
    /// Returns `SendRecord(introduction)` followed by `Established`.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not in `AwaitEncryptedSessionKey`
    /// - `HandshakeError::Decode` if the record is not base64
    /// - `HandshakeError::Crypto` if the record does not decrypt under our key
    pub fn handle_record(&mut self, record: &str) -> Result<Vec<HandshakeAction>, HandshakeError> {
        self.expect_state(HandshakeState::AwaitEncryptedSessionKey, "handle_record")?;

        let Some(keypair) = self.keypair.as_ref() else {
            return Err(HandshakeError::InvalidState {
                state: self.state,
                operation: "handle_record",
            });
        };

        let wrapped = decode_base64(record).map_err(HandshakeError::from_record)?;
        let material = keypair.decrypt(&wrapped)?;
        let cipher = SessionCipher::new(SessionKey::from_material(&material));

        // Keypair has done its job
        self.keypair = None;
        self.session = Some(cipher.clone());
        self.state = HandshakeState::Established;

        let introduction = cipher.encrypt(&self.display_name);

        Ok(vec![HandshakeAction::SendRecord(introduction), HandshakeAction::Established(cipher)])
    }

    fn expect_state(
        &self,
        expected: HandshakeState,
        operation: &'static str,
    ) -> Result<(), HandshakeError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(HandshakeError::InvalidState { state: self.state, operation })
        }
    }
}

/// Relay half of the key exchange, run by each accepted connection.
#[derive(Debug)]
pub struct RelayHandshake {
    state: HandshakeState,
    peer_public_key: Option<PublicKey>,
    session: Option<SessionCipher>,
}

impl Default for RelayHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayHandshake {
    /// Create a new handshake in [`HandshakeState::AwaitPublicKey`].
    pub fn new() -> Self {
        Self { state: HandshakeState::AwaitPublicKey, peer_public_key: None, session: None }
    }

    /// Current handshake state
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Public key the endpoint offered. `None` before step 3.
    pub fn peer_public_key(&self) -> Option<&PublicKey> {
        self.peer_public_key.as_ref()
    }

    /// Session cipher. `None` until established.
    pub fn session(&self) -> Option<&SessionCipher> {
        self.session.as_ref()
    }

    /// Accept the endpoint's public key (step 3).
    ///
    /// Produces no actions; call [`RelayHandshake::send_session_key`] next.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not in `AwaitPublicKey`
    /// - `HandshakeError::Decode` if the record is not a base64 DER public key
    pub fn handle_record(&mut self, record: &str) -> Result<Vec<HandshakeAction>, HandshakeError> {
        if self.state != HandshakeState::AwaitPublicKey {
            return Err(HandshakeError::InvalidState {
                state: self.state,
                operation: "handle_record",
            });
        }

        let public_key = PublicKey::from_base64(record).map_err(HandshakeError::from_record)?;

        self.peer_public_key = Some(public_key);
        self.state = HandshakeState::ReadyToSendSessionKey;

        Ok(vec![])
    }

    /// Generate the session key and send it wrapped under the peer's public
    /// key (step 4).
    ///
    /// Returns `SendRecord(wrapped key)` followed by `Established`.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not in `ReadyToSendSessionKey`
    /// - `HandshakeError::Crypto` if RSA encryption fails
    pub fn send_session_key<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        let (HandshakeState::ReadyToSendSessionKey, Some(peer)) =
            (self.state, self.peer_public_key.as_ref())
        else {
            return Err(HandshakeError::InvalidState {
                state: self.state,
                operation: "send_session_key",
            });
        };

        let key = SessionKey::generate(rng);
        let wrapped = peer.encrypt(rng, key.as_bytes())?;
        let cipher = SessionCipher::new(key);

        self.session = Some(cipher.clone());
        self.state = HandshakeState::Established;

        Ok(vec![
            HandshakeAction::SendRecord(encode_base64(&wrapped)),
            HandshakeAction::Established(cipher),
        ])
    }
}
