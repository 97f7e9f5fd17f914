//! Chat channel boundary
//!
//! The handshake talks to the outside world only through [`ChatChannel`]. The
//! channel delivers sender-attributed messages with no ordering, delivery or
//! exclusivity guarantees; other clients share it at the same time.
//!
//! Two implementations ship with the crate:
//! - [`keybase::KeybaseChannel`] drives the `keybase` CLI
//! - [`memory::MemoryHub`] is an in-process broadcast hub for tests and loopback runs

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;

pub mod keybase;
pub mod memory;

pub use keybase::KeybaseChannel;
pub use memory::{MemoryChannel, MemoryHub};

/// Where outbound messages go: a team conversation and optional topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub team: String,
    pub channel: Option<String>,
}

impl Destination {
    pub fn team(team: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            channel: None,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel {
            Some(channel) => write!(f, "{}#{}", self.team, channel),
            None => write!(f, "{}", self.team),
        }
    }
}

/// Kind of content a chat message carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    Text,
    /// Reactions, attachments, edits, system messages...
    Other(String),
}

/// A message as delivered by the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Identity the channel attributes the message to
    pub sender: String,
    pub content_type: ContentType,
    /// Text body; empty for non-text content
    pub body: String,
}

impl InboundMessage {
    pub fn text(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content_type: ContentType::Text,
            body: body.into(),
        }
    }

    pub fn is_text(&self) -> bool {
        self.content_type == ContentType::Text
    }
}

/// Errors surfaced by a channel implementation
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to launch chat client: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Chat client I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chat API error: {message}")]
    Api { message: String },

    #[error("Failed to decode chat client output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Chat client did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Message stream closed")]
    Closed,
}

/// Lazy, infinite stream of inbound messages
///
/// Not restartable: once dropped or closed, call [`ChatChannel::subscribe`] again.
pub struct Subscription {
    inner: BoxStream<'static, Result<InboundMessage, ChannelError>>,
}

impl Subscription {
    pub fn new(inner: BoxStream<'static, Result<InboundMessage, ChannelError>>) -> Self {
        Self { inner }
    }

    /// Wait for the next message; a finished stream is [`ChannelError::Closed`]
    pub async fn next(&mut self) -> Result<InboundMessage, ChannelError> {
        match self.inner.next().await {
            Some(item) => item,
            None => Err(ChannelError::Closed),
        }
    }
}

/// A connected session on a shared chat channel
///
/// Connecting is each implementation's constructor. Sends may be issued
/// concurrently from several tasks under the same identity.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Start receiving messages; only messages arriving after this call are seen
    async fn subscribe(&self) -> Result<Subscription, ChannelError>;

    /// Post a text message to a destination
    async fn send(&self, destination: &Destination, text: &str) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_destination_display() {
        assert_eq!(Destination::team("acme.ssh").to_string(), "acme.ssh");
        assert_eq!(
            Destination::team("acme.ssh").with_channel("ca").to_string(),
            "acme.ssh#ca"
        );
    }

    #[test]
    fn test_inbound_text_constructor() {
        let msg = InboundMessage::text("cabot", "Ack--");
        assert!(msg.is_text());
        assert_eq!(msg.sender, "cabot");
    }

    #[tokio::test]
    async fn test_subscription_reports_closed_when_exhausted() {
        let items = vec![Ok(InboundMessage::text("a", "hi"))];
        let mut sub = Subscription::new(stream::iter(items).boxed());
        assert_eq!(sub.next().await.unwrap().body, "hi");
        assert!(matches!(sub.next().await, Err(ChannelError::Closed)));
    }
}
