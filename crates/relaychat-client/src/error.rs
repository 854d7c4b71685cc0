//! Endpoint errors.

use relaychat_core::{HandshakeError, WireError};
use relaychat_crypto::CryptoError;
use thiserror::Error;

/// Errors that end an endpoint session.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Could not reach the relay.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Socket failed or delivered an unreadable record.
    #[error(transparent)]
    Socket(#[from] WireError),

    /// Key exchange with the relay failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// A relay record did not decrypt under the session key.
    #[error("decrypt failed: {0}")]
    Crypto(#[from] CryptoError),

    /// Relay closed the socket before the handshake finished.
    #[error("relay closed the connection during the handshake")]
    HandshakeInterrupted,
}
