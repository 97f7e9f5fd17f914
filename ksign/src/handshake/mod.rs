//! Handshake coordinator
//!
//! Drives one request/response cycle with the authority over a shared channel:
//! probe until acknowledged, send the request exactly once, then wait for the
//! response carrying our correlation id.

mod config;
mod core;
mod error;

pub use config::HandshakeConfig;
pub use core::{Handshake, HandshakeState};
pub use error::HandshakeError;
