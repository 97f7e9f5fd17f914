//! In-process chat channel
//!
//! A [`MemoryHub`] is one shared conversation space backed by a tokio broadcast
//! channel. Every [`MemoryChannel`] endpoint posts under its own identity and
//! every subscriber sees every message, including its own, just like a team
//! chat. The hub keeps a transcript so tests can assert on what was sent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::{ChannelError, ChatChannel, Destination, InboundMessage, Subscription};

/// Default broadcast capacity (messages)
pub const DEFAULT_CAPACITY: usize = 1024;

/// A message as it was posted to the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    pub destination: Destination,
    pub message: InboundMessage,
}

/// Shared in-memory conversation space
#[derive(Clone)]
pub struct MemoryHub {
    tx: broadcast::Sender<Posted>,
    transcript: Arc<Mutex<Vec<Posted>>>,
}

impl MemoryHub {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "MemoryHub::new: called");
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            transcript: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Open an endpoint that posts as `identity`
    pub fn connect(&self, identity: impl Into<String>) -> MemoryChannel {
        let identity = identity.into();
        debug!(%identity, "MemoryHub::connect: called");
        MemoryChannel {
            hub: self.clone(),
            identity,
            reject_sends: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver an arbitrary message, e.g. non-text content or another tenant's traffic
    pub fn inject(&self, destination: &Destination, message: InboundMessage) {
        self.post(Posted {
            destination: destination.clone(),
            message,
        });
    }

    /// Everything posted so far, in posting order
    pub fn transcript(&self) -> Vec<Posted> {
        self.lock_transcript().clone()
    }

    /// Bodies posted by one identity, in posting order
    pub fn sent_by(&self, identity: &str) -> Vec<String> {
        self.lock_transcript()
            .iter()
            .filter(|p| p.message.sender == identity)
            .map(|p| p.message.body.clone())
            .collect()
    }

    fn post(&self, posted: Posted) {
        self.lock_transcript().push(posted.clone());
        // No subscribers is fine: nobody was listening
        let _ = self.tx.send(posted);
    }

    fn lock_transcript(&self) -> MutexGuard<'_, Vec<Posted>> {
        self.transcript.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// One identity's session on a [`MemoryHub`]
#[derive(Clone)]
pub struct MemoryChannel {
    hub: MemoryHub,
    identity: String,
    reject_sends: Arc<AtomicBool>,
}

impl MemoryChannel {
    /// Make subsequent sends fail (or succeed again) to exercise error paths
    pub fn reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatChannel for MemoryChannel {
    async fn subscribe(&self) -> Result<Subscription, ChannelError> {
        debug!(identity = %self.identity, "MemoryChannel::subscribe: called");
        let rx = self.hub.tx.subscribe();
        let messages = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(posted) => return Some((Ok(posted.message), rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "MemoryChannel: subscriber lagged, messages dropped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(Subscription::new(messages.boxed()))
    }

    async fn send(&self, destination: &Destination, text: &str) -> Result<(), ChannelError> {
        debug!(identity = %self.identity, %destination, "MemoryChannel::send: called");
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::Api {
                message: format!("send to {} rejected", destination),
            });
        }
        self.hub.post(Posted {
            destination: destination.clone(),
            message: InboundMessage::text(self.identity.clone(), text),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ContentType;

    #[tokio::test]
    async fn test_subscribers_see_messages_from_every_endpoint() {
        let hub = MemoryHub::default();
        let alice = hub.connect("alice");
        let bot = hub.connect("cabot");
        let dest = Destination::team("acme.ssh");

        let mut sub = alice.subscribe().await.unwrap();
        bot.send(&dest, "hello").await.unwrap();
        alice.send(&dest, "hi back").await.unwrap();

        let first = sub.next().await.unwrap();
        assert_eq!(first, InboundMessage::text("cabot", "hello"));
        let second = sub.next().await.unwrap();
        assert_eq!(second.sender, "alice");
    }

    #[tokio::test]
    async fn test_messages_before_subscribe_are_missed() {
        let hub = MemoryHub::default();
        let alice = hub.connect("alice");
        let bot = hub.connect("cabot");
        let dest = Destination::team("acme.ssh");

        bot.send(&dest, "too early").await.unwrap();
        let mut sub = alice.subscribe().await.unwrap();
        bot.send(&dest, "on time").await.unwrap();

        assert_eq!(sub.next().await.unwrap().body, "on time");
        assert_eq!(hub.sent_by("cabot"), vec!["too early", "on time"]);
    }

    #[tokio::test]
    async fn test_rejected_sends_are_not_posted() {
        let hub = MemoryHub::default();
        let alice = hub.connect("alice");
        alice.reject_sends(true);

        let err = alice.send(&Destination::team("t"), "x").await.unwrap_err();
        assert!(matches!(err, ChannelError::Api { .. }));
        assert!(hub.transcript().is_empty());

        alice.reject_sends(false);
        alice.send(&Destination::team("t"), "y").await.unwrap();
        assert_eq!(hub.sent_by("alice"), vec!["y"]);
    }

    #[tokio::test]
    async fn test_injected_non_text_content() {
        let hub = MemoryHub::default();
        let alice = hub.connect("alice");
        let mut sub = alice.subscribe().await.unwrap();

        hub.inject(
            &Destination::team("t"),
            InboundMessage {
                sender: "cabot".to_string(),
                content_type: ContentType::Other("reaction".to_string()),
                body: String::new(),
            },
        );

        let msg = sub.next().await.unwrap();
        assert!(!msg.is_text());
    }
}
