//! Request and response envelopes
//!
//! Every payload exchanged with the authority carries a correlation id so a
//! client can pick its own answer out of a channel shared with other clients.
//! The authority-specific fields are flattened next to the id on the wire:
//!
//! ```text
//! {"uuid":"0190...","ssh_public_key":"ssh-ed25519 AAAA...","username":"alice",...}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token matching a response to the request that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Mint a fresh, time-ordered id
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A request bound for the authority
///
/// Created once per invocation and never mutated afterwards, so the fields are
/// only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request<P> {
    uuid: CorrelationId,
    #[serde(flatten)]
    params: P,
}

impl<P> Request<P> {
    /// Wrap authority parameters under a freshly minted correlation id
    pub fn new(params: P) -> Self {
        Self {
            uuid: CorrelationId::new(),
            params,
        }
    }

    /// Build a request under a known id (authority side and tests)
    pub fn with_id(uuid: CorrelationId, params: P) -> Self {
        Self { uuid, params }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.uuid
    }

    pub fn params(&self) -> &P {
        &self.params
    }
}

/// A response produced by the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response<R> {
    pub uuid: CorrelationId,
    #[serde(flatten)]
    pub outcome: R,
}

impl<R> Response<R> {
    pub fn new(uuid: CorrelationId, outcome: R) -> Self {
        Self { uuid, outcome }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.uuid
    }

    pub fn into_outcome(self) -> R {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Params {
        principal: String,
    }

    #[test]
    fn test_new_requests_get_distinct_ids() {
        let a = Request::new(Params {
            principal: "alice".to_string(),
        });
        let b = Request::new(Params {
            principal: "alice".to_string(),
        });
        assert_ne!(a.correlation_id(), b.correlation_id());
    }

    #[test]
    fn test_request_flattens_params_next_to_uuid() {
        let id: CorrelationId = "01907c3e-6f1a-7cc4-9a3e-2b1f4c5d6e7f".parse().unwrap();
        let req = Request::with_id(
            id,
            Params {
                principal: "alice".to_string(),
            },
        );
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"uuid": "01907c3e-6f1a-7cc4-9a3e-2b1f4c5d6e7f", "principal": "alice"})
        );
    }

    #[test]
    fn test_correlation_id_display_matches_uuid() {
        let uuid = Uuid::now_v7();
        let id = CorrelationId::from(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
        assert_eq!(id.to_string().parse::<CorrelationId>().unwrap(), id);
    }

    #[test]
    fn test_correlation_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<CorrelationId>().is_err());
    }
}
