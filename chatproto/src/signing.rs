//! Payloads for SSH key signing
//!
//! The client sends its public key and identity; the authority answers with
//! either a signed certificate or the reason it refused.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Request, Response};

/// Parameters the authority needs to issue a certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureParams {
    /// OpenSSH-formatted public key
    pub ssh_public_key: String,

    /// Chat identity of the requester
    pub username: String,

    /// Device the request originates from
    pub device_name: String,

    /// Principals requested for the certificate, comma separated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principals: Option<String>,
}

/// What the authority decided
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Failure reported by the authority inside an otherwise valid response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("CA rejected the request: {0}")]
    Rejected(String),

    #[error("CA response carried neither a signed key nor an error")]
    Empty,
}

impl SignatureOutcome {
    pub fn signed(key: impl Into<String>) -> Self {
        Self {
            signed_key: Some(key.into()),
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            signed_key: None,
            error: Some(reason.into()),
        }
    }

    /// An authority-reported error wins over any key sent alongside it
    pub fn into_result(self) -> Result<String, AuthorityError> {
        match (self.signed_key, self.error) {
            (_, Some(err)) if !err.is_empty() => Err(AuthorityError::Rejected(err)),
            (Some(key), _) if !key.is_empty() => Ok(key),
            _ => Err(AuthorityError::Empty),
        }
    }
}

pub type SignatureRequest = Request<SignatureParams>;
pub type SignatureResponse = Response<SignatureOutcome>;
