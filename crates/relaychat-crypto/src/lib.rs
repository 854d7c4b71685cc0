//! Relaychat Cryptographic Primitives
//!
//! The two layers of the relaychat confidentiality scheme:
//!
//! ```text
//! Endpoint                                   Relay connection
//!   KeyPair::generate (RSA-2048)
//!   PublicKey ── base64(SPKI DER) ─────────────> PublicKey::from_base64
//!                                               SessionKey::generate (AES-128)
//!   KeyPair::decrypt <── base64(PKCS#1 v1.5) ── PublicKey::encrypt
//!   SessionKey::from_material
//!        │                                              │
//!        └──────── SessionCipher (AES-128-ECB, PKCS#7) ─┘
//! ```
//!
//! The asymmetric keypair only lives for the duration of one handshake. The
//! session key is the raw first 16 bytes of the decrypted key-exchange payload
//! and is never passed through a KDF, so existing peers derive the same key
//! from the same bytes.
//!
//! All randomness is supplied by the caller. Production code passes
//! `rand::rngs::OsRng`; tests pass a seeded ChaCha RNG.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod asymmetric;
mod error;
mod symmetric;

pub use asymmetric::{KeyPair, PublicKey, RSA_KEY_BITS};
pub use error::CryptoError;
pub use symmetric::{SESSION_KEY_LEN, SessionCipher, SessionKey};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

/// Encode bytes as a single standard-alphabet, padded base64 record.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a standard-alphabet, padded base64 record.
///
/// Surrounding whitespace is ignored so records read with a stray `\r` still
/// decode.
pub fn decode_base64(record: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(BASE64.decode(record.trim())?)
}
