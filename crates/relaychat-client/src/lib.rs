//! Relaychat endpoint.
//!
//! Connects to a relay, runs the endpoint half of the key exchange, introduces
//! itself, then shuttles lines between local channels and the socket.
//!
//! # Components
//!
//! - [`Endpoint`]: an established session with the relay
//! - [`EndpointConfig`]: host, port and display name
//! - [`EndpointError`]: everything that can end a session
//!
//! The interactive shell lives in the `relaychat` binary; this library only
//! sees plain strings over channels.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod endpoint;
mod error;

pub use config::{DEFAULT_HOST, EndpointConfig, default_display_name};
pub use endpoint::Endpoint;
pub use error::EndpointError;
