//! Relaychat protocol core.
//!
//! Pure protocol logic shared by the endpoint and the relay. Nothing in this
//! crate opens a socket or spawns a task.
//!
//! # Components
//!
//! - [`handshake`]: the two halves of the key exchange. Methods consume one
//!   received record (or a request to speak) and return
//!   [`HandshakeAction`]s for the caller to execute, in the same action-based
//!   style as the relay driver.
//! - [`wire`]: `\r\n` terminated records over any `AsyncRead`/`AsyncWrite`.
//! - [`notice`]: the join, quit and chat lines the relay broadcasts.
//! - [`error`]: typed errors for both.
//!
//! # Wire protocol
//!
//! ```text
//! Endpoint                                   Relay connection
//! AwaitPeerPublicKey                         AwaitPublicKey
//!   ── base64(SPKI DER public key) ───────────>
//! AwaitEncryptedSessionKey                   ReadyToSendSessionKey
//!   <── base64(RSA-PKCS1(session key)) ───────
//! Established                                Established
//!   ── base64(AES(display name)) ─────────────>   (introduction)
//!   <══ base64(AES(chat text)) ══════════════>
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod handshake;
pub mod notice;
pub mod wire;

pub use error::{HandshakeError, WireError};
pub use handshake::{EndpointHandshake, HandshakeAction, HandshakeState, RelayHandshake};
pub use relaychat_crypto::{SessionCipher, SessionKey};
pub use wire::{MAX_RECORD_LEN, RecordReader, write_record};
