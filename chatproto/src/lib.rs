//! ChatProto - signing requests over a shared chat channel
//!
//! Wire vocabulary for a client and a signing authority that talk through a
//! multi-tenant text channel where other exchanges are in flight at the same
//! time. Nothing here does I/O.
//!
//! # Protocol
//!
//! ```text
//! client                         authority
//!   | -- AckRequest-- (repeated) -->  |
//!   | <------------- Ack-- ---------  |
//!   | -- Signature_Request:{json} --> |
//!   | <- Signature_Response:{json} -- |
//! ```
//!
//! Responses are matched to requests by the `uuid` field; see [`correlate`].

pub mod correlate;
pub mod frame;
pub mod message;
pub mod signing;

pub use correlate::matches;
pub use frame::{
    ACK, Frame, FrameError, PROBE, REQUEST_PREAMBLE, RESPONSE_PREAMBLE, encode_request, encode_response,
    parse_request, parse_response,
};
pub use message::{CorrelationId, Request, Response};
pub use signing::{AuthorityError, SignatureOutcome, SignatureParams, SignatureRequest, SignatureResponse};
