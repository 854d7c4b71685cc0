//! Error types for the crypto primitives.

use thiserror::Error;

/// Failure of an encode, decode, encrypt or decrypt step.
///
/// None of these are transient: a record that fails once will fail again, so
/// callers treat every variant as fatal for the connection it arrived on.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Record was not valid base64
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Bytes were not a DER-encoded RSA `SubjectPublicKeyInfo`
    #[error("invalid public key: {0}")]
    PublicKey(String),

    /// RSA key generation, encryption or decryption failed
    #[error("rsa operation failed: {0}")]
    Rsa(#[from] rsa::Error),

    /// Session ciphertext had bad padding or a partial block
    #[error("session decryption failed: bad padding or truncated ciphertext")]
    Padding,

    /// Decrypted session plaintext was not UTF-8
    #[error("plaintext is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
