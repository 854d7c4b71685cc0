//! Error types for the relaychat protocol core.
//!
//! Handshake errors and wire errors are kept apart: a handshake error means
//! the peer spoke out of turn or sent something undecodable, a wire error
//! means the byte stream itself failed. Either one ends the connection it
//! happened on and nothing else.

use std::io;

use relaychat_crypto::CryptoError;
use thiserror::Error;

use crate::handshake::HandshakeState;

/// Errors that can occur while running either half of the key exchange.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the error occurred
        state: HandshakeState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Handshake record was not valid base64 or did not carry a valid key
    #[error("malformed handshake record: {0}")]
    Decode(String),

    /// Key generation, wrapping or unwrapping failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl HandshakeError {
    /// Map base64 and key-parsing failures to [`HandshakeError::Decode`],
    /// leave everything else as a crypto failure.
    pub(crate) fn from_record(err: CryptoError) -> Self {
        match err {
            CryptoError::Base64(_) | CryptoError::PublicKey(_) => Self::Decode(err.to_string()),
            other => Self::Crypto(other),
        }
    }
}

/// Errors reading or writing line records.
#[derive(Error, Debug)]
pub enum WireError {
    /// Underlying socket failed (reset, broken pipe, ...)
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    /// Peer sent a record longer than the configured bound
    #[error("record exceeds {limit} bytes")]
    RecordTooLong {
        /// Maximum accepted record length
        limit: usize,
    },

    /// Record bytes were not UTF-8
    #[error("record is not valid UTF-8")]
    InvalidUtf8,
}
