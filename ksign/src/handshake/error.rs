//! Handshake error types

use std::time::Duration;

use chatproto::FrameError;
use thiserror::Error;

use crate::channel::ChannelError;

/// Terminal failures of a single handshake
///
/// Nothing here is retried: the caller gets the error and no credential.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Error starting chat session: {0}")]
    ChannelConnect(#[source] ChannelError),

    #[error("Error subscribing to messages: {0}")]
    Subscribe(#[source] ChannelError),

    #[error("Failed to read message: {0}")]
    Read(#[source] ChannelError),

    #[error("Failed to encode request: {0}")]
    Marshal(#[source] FrameError),

    #[error("Failed to send request: {0}")]
    Send(#[source] ChannelError),

    #[error("Failed to parse a response from the CA: {0}")]
    Parse(#[source] FrameError),

    #[error("Timed out after {0:?} while waiting for a response from the CA")]
    Timeout(Duration),
}

impl HandshakeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HandshakeError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_timeout() {
        assert!(HandshakeError::Timeout(Duration::from_secs(5)).is_timeout());
        assert!(!HandshakeError::Read(ChannelError::Closed).is_timeout());
    }

    #[test]
    fn test_messages_name_the_failure() {
        let err = HandshakeError::Timeout(Duration::from_millis(5000));
        assert!(err.to_string().contains("Timed out after 5s"));

        let err = HandshakeError::Send(ChannelError::Api {
            message: "no conversations matched".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Failed to send request: Chat API error: no conversations matched"
        );
    }
}
