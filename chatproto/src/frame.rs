//! Framing of protocol traffic on a plain-text chat channel
//!
//! A message body is either a bare sentinel (probe or ack), or a preamble
//! immediately followed by compact JSON. Anything else on the channel belongs
//! to someone else and is classified as [`Frame::Other`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::message::{Request, Response};

/// Sentinel broadcast by the client until the authority answers
pub const PROBE: &str = "AckRequest--";

/// Sentinel the authority sends back when it sees a probe
pub const ACK: &str = "Ack--";

/// Prefix of a framed request
pub const REQUEST_PREAMBLE: &str = "Signature_Request:";

/// Prefix of a framed response
pub const RESPONSE_PREAMBLE: &str = "Signature_Response:";

/// Errors raised while framing or unframing a payload
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Message does not start with {expected:?}")]
    MissingPreamble { expected: &'static str },

    #[error("Failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Classification of an inbound message body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Probe,
    Ack,
    /// Payload following the request preamble, still undecoded
    Request(&'a str),
    /// Payload following the response preamble, still undecoded
    Response(&'a str),
    Other,
}

impl<'a> Frame<'a> {
    /// Sentinels match exactly; payload frames match on their prefix
    pub fn classify(body: &'a str) -> Self {
        if body == PROBE {
            Frame::Probe
        } else if body == ACK {
            Frame::Ack
        } else if let Some(payload) = body.strip_prefix(REQUEST_PREAMBLE) {
            Frame::Request(payload)
        } else if let Some(payload) = body.strip_prefix(RESPONSE_PREAMBLE) {
            Frame::Response(payload)
        } else {
            Frame::Other
        }
    }
}

fn encode<T: Serialize>(preamble: &str, value: &T) -> Result<String, FrameError> {
    let json = serde_json::to_string(value).map_err(FrameError::Encode)?;
    Ok(format!("{preamble}{json}"))
}

fn decode<T: DeserializeOwned>(preamble: &'static str, body: &str) -> Result<T, FrameError> {
    let payload = body
        .strip_prefix(preamble)
        .ok_or(FrameError::MissingPreamble { expected: preamble })?;
    serde_json::from_str(payload).map_err(FrameError::Decode)
}

/// Frame a request for transmission
pub fn encode_request<P: Serialize>(request: &Request<P>) -> Result<String, FrameError> {
    debug!(uuid = %request.correlation_id(), "encode_request: called");
    encode(REQUEST_PREAMBLE, request)
}

/// Frame a response for transmission
pub fn encode_response<R: Serialize>(response: &Response<R>) -> Result<String, FrameError> {
    debug!(uuid = %response.correlation_id(), "encode_response: called");
    encode(RESPONSE_PREAMBLE, response)
}

/// Unframe a request (authority side)
pub fn parse_request<P: DeserializeOwned>(body: &str) -> Result<Request<P>, FrameError> {
    decode(REQUEST_PREAMBLE, body)
}

/// Unframe a response (client side)
pub fn parse_response<R: DeserializeOwned>(body: &str) -> Result<Response<R>, FrameError> {
    decode(RESPONSE_PREAMBLE, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CorrelationId;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Outcome {
        signed_key: String,
    }

    #[test]
    fn test_classify_sentinels_exactly() {
        assert_eq!(Frame::classify(PROBE), Frame::Probe);
        assert_eq!(Frame::classify(ACK), Frame::Ack);
        assert_eq!(Frame::classify("Ack-- "), Frame::Other);
        assert_eq!(Frame::classify(" Ack--"), Frame::Other);
        assert_eq!(Frame::classify("hello team"), Frame::Other);
    }

    #[test]
    fn test_classify_payload_frames_by_prefix() {
        assert_eq!(Frame::classify("Signature_Request:{}"), Frame::Request("{}"));
        assert_eq!(Frame::classify("Signature_Response:{\"a\":1}"), Frame::Response("{\"a\":1}"));
        assert_eq!(Frame::classify("Signature_Response:"), Frame::Response(""));
    }

    #[test]
    fn test_encode_response_is_preamble_plus_compact_json() {
        let id: CorrelationId = "01907c3e-6f1a-7cc4-9a3e-2b1f4c5d6e7f".parse().unwrap();
        let resp = Response::new(
            id,
            Outcome {
                signed_key: "cert".to_string(),
            },
        );
        let body = encode_response(&resp).unwrap();
        assert_eq!(
            body,
            r#"Signature_Response:{"uuid":"01907c3e-6f1a-7cc4-9a3e-2b1f4c5d6e7f","signed_key":"cert"}"#
        );
        let parsed: Response<Outcome> = parse_response(&body).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn test_parse_response_requires_preamble() {
        let err = parse_response::<Outcome>(r#"{"uuid":"x"}"#).unwrap_err();
        assert!(matches!(err, FrameError::MissingPreamble { .. }));

        let err = parse_response::<Outcome>(r#"Signature_Request:{"uuid":"x"}"#).unwrap_err();
        assert!(matches!(err, FrameError::MissingPreamble { .. }));
    }

    #[test]
    fn test_parse_response_rejects_malformed_json() {
        let err = parse_response::<Outcome>("Signature_Response:{not json").unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }

    #[test]
    fn test_parse_response_rejects_bad_uuid() {
        let err = parse_response::<Outcome>(r#"Signature_Response:{"uuid":"nope","signed_key":"k"}"#).unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }

    proptest! {
        #[test]
        fn prop_parse_response_never_panics(body in ".*") {
            let _ = parse_response::<Outcome>(&body);
            let _ = Frame::classify(&body);
        }

        #[test]
        fn prop_unprefixed_text_is_never_protocol_traffic(body in "[a-z ]{0,40}") {
            prop_assert_eq!(Frame::classify(&body), Frame::Other);
        }
    }
}
