//! Correlation of responses to the outstanding request
//!
//! This is the only thing keeping a client from acting on another client's
//! exchange. It applies to responses only; acks carry no id.

use crate::frame::FrameError;
use crate::message::{CorrelationId, Response};

impl<R> Response<R> {
    /// True when this response answers the request with the given id
    pub fn correlates_with(&self, outstanding: &CorrelationId) -> bool {
        self.uuid == *outstanding
    }
}

/// True iff the response parsed and carries the outstanding id
pub fn matches<R>(parsed: &Result<Response<R>, FrameError>, outstanding: &CorrelationId) -> bool {
    match parsed {
        Ok(response) => response.correlates_with(outstanding),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::parse_response;

    #[test]
    fn test_matching_id_correlates() {
        let id = CorrelationId::new();
        let parsed: Result<Response<()>, FrameError> = Ok(Response::new(id, ()));
        assert!(matches(&parsed, &id));
    }

    #[test]
    fn test_foreign_id_does_not_correlate() {
        let ours = CorrelationId::new();
        let theirs = CorrelationId::new();
        let parsed: Result<Response<()>, FrameError> = Ok(Response::new(theirs, ()));
        assert!(!matches(&parsed, &ours));
    }

    #[test]
    fn test_parse_failure_never_correlates() {
        let id = CorrelationId::new();
        let parsed = parse_response::<serde_json::Value>("Signature_Response:][");
        assert!(!matches(&parsed, &id));
    }
}
