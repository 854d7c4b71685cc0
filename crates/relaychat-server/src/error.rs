//! Server error types.

use std::fmt;

use relaychat_core::{HandshakeError, WireError};
use relaychat_crypto::CryptoError;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad backlog, etc.).
    ///
    /// These are fatal errors that prevent server startup. Fix configuration
    /// and restart.
    Config(String),

    /// Transport/network error (bind failure, I/O error, etc.).
    ///
    /// Fatal when returned from [`crate::Server::bind`]. Accept failures are
    /// logged by the accept loop and never surface here.
    Transport(String),

    /// Internal error (coordinator task ended, logic bug, etc.).
    ///
    /// Should never happen in correct implementation. Indicates a bug.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Why a single connection ended.
///
/// Always local to that connection: the coordinator turns it into one quit
/// event and every other connection carries on.
#[derive(Debug)]
pub enum ConnectionError {
    /// Key exchange failed (malformed record, out-of-turn record, RSA failure).
    Handshake(HandshakeError),

    /// Socket failed or sent an unreadable record.
    Wire(WireError),

    /// Application record did not decrypt under the session key.
    Crypto(CryptoError),

    /// Peer closed the socket.
    Closed,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake(err) => write!(f, "handshake failed: {err}"),
            Self::Wire(err) => write!(f, "{err}"),
            Self::Crypto(err) => write!(f, "decrypt failed: {err}"),
            Self::Closed => write!(f, "peer closed connection"),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Handshake(err) => Some(err),
            Self::Wire(err) => Some(err),
            Self::Crypto(err) => Some(err),
            Self::Closed => None,
        }
    }
}

impl From<HandshakeError> for ConnectionError {
    fn from(err: HandshakeError) -> Self {
        Self::Handshake(err)
    }
}

impl From<WireError> for ConnectionError {
    fn from(err: WireError) -> Self {
        Self::Wire(err)
    }
}

impl From<CryptoError> for ConnectionError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err)
    }
}
