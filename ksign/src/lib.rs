//! ksign - signed SSH keys from a CA bot over Keybase chat
//!
//! The CA bot and its clients share a team conversation that other clients
//! use at the same time, and neither side knows whether the other is
//! listening. A request therefore goes through a short handshake:
//!
//! 1. The [`prober`] repeats a probe until the bot acks it
//! 2. The [`handshake`] coordinator sends the real request exactly once
//! 3. The response is picked out of the channel by its correlation id
//!
//! # Modules
//!
//! - [`channel`] - chat channel trait, Keybase and in-memory implementations
//! - [`prober`] - background liveness probes
//! - [`handshake`] - the probe/ack/request/response state machine
//! - [`authority`] - a minimal CA for loopback runs and tests
//! - [`sign`] - the `ks sign` flow
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod authority;
pub mod channel;
pub mod cli;
pub mod config;
pub mod handshake;
pub mod prober;
pub mod sign;

// Re-export commonly used types
pub use authority::{Authority, AuthorityHandle, AuthorityStats, Signer, loopback_signer};
pub use channel::{
    ChannelError, ChatChannel, ContentType, Destination, InboundMessage, KeybaseChannel, MemoryChannel, MemoryHub,
    Subscription,
};
pub use config::{AuthorityConfig, Config};
pub use handshake::{Handshake, HandshakeConfig, HandshakeError, HandshakeState};
pub use prober::{ProbeSchedule, Prober, ProberHandle};
pub use sign::{Target, TargetOverrides};
