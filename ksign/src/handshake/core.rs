//! Handshake state machine

use std::sync::Arc;
use std::time::Duration;

use chatproto::{CorrelationId, Frame, Request, Response, encode_request, matches, parse_response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::HandshakeConfig;
use super::error::HandshakeError;
use crate::channel::{ChatChannel, Destination, InboundMessage, Subscription};
use crate::prober::{ProbeSchedule, Prober, ProberHandle};

/// Where a handshake stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    /// Probing, no ack accepted yet
    Probing,
    /// Ack accepted, request sent, waiting for the matching response
    RequestSent,
    Complete,
    TimedOut,
}

/// Runs request/response cycles against an authority over a shared channel
pub struct Handshake {
    channel: Arc<dyn ChatChannel>,
    schedule: ProbeSchedule,
}

impl Handshake {
    pub fn new(channel: Arc<dyn ChatChannel>, config: &HandshakeConfig) -> Self {
        Self {
            channel,
            schedule: config.schedule(),
        }
    }

    /// Send `request` to the authority at `destination` and wait for its answer
    ///
    /// Only messages attributed to `expected_sender` are considered. The
    /// request goes out once, after the first ack. Responses for other
    /// correlation ids are skipped; a response that fails to parse ends the
    /// exchange. Every read is raced against `deadline`, so a silent channel
    /// still times out.
    pub async fn execute<P, R>(
        &self,
        destination: &Destination,
        expected_sender: &str,
        request: &Request<P>,
        deadline: Duration,
    ) -> Result<Response<R>, HandshakeError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let uuid = request.correlation_id();
        debug!(%destination, %expected_sender, %uuid, ?deadline, "Handshake::execute: called");

        let mut subscription = self.channel.subscribe().await.map_err(HandshakeError::Subscribe)?;

        let started = Instant::now();
        let mut exchange = Exchange {
            channel: self.channel.as_ref(),
            destination,
            expected_sender,
            uuid,
            started,
            deadline,
            expires_at: started + deadline,
            state: HandshakeState::Init,
            prober: Some(Prober::start(self.channel.clone(), destination.clone(), self.schedule)),
        };
        exchange.transition(HandshakeState::Probing);

        let result = exchange.run(&mut subscription, request).await;

        // Covers every exit that happens before an ack
        if let Some(prober) = exchange.prober.take() {
            let attempts = prober.stop().await;
            debug!(attempts, "Prober stopped on handshake exit");
        }
        result
    }
}

/// Per-invocation state
struct Exchange<'a> {
    channel: &'a dyn ChatChannel,
    destination: &'a Destination,
    expected_sender: &'a str,
    uuid: CorrelationId,
    started: Instant,
    deadline: Duration,
    expires_at: Instant,
    state: HandshakeState,
    prober: Option<ProberHandle>,
}

impl Exchange<'_> {
    fn transition(&mut self, next: HandshakeState) {
        info!(uuid = %self.uuid, from = ?self.state, to = ?next, "Handshake state change");
        self.state = next;
    }

    async fn run<P, R>(
        &mut self,
        subscription: &mut Subscription,
        request: &Request<P>,
    ) -> Result<Response<R>, HandshakeError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        loop {
            let msg = match tokio::time::timeout_at(self.expires_at, subscription.next()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(e)) => return Err(HandshakeError::Read(e)),
                Err(_) => return Err(self.timed_out()),
            };
            if self.started.elapsed() > self.deadline {
                return Err(self.timed_out());
            }

            if let Some(response) = self.handle(msg, request).await? {
                self.transition(HandshakeState::Complete);
                return Ok(response);
            }
        }
    }

    /// Process one inbound message; `Some` is the matching response
    async fn handle<P, R>(
        &mut self,
        msg: InboundMessage,
        request: &Request<P>,
    ) -> Result<Option<Response<R>>, HandshakeError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if !msg.is_text() || msg.sender != self.expected_sender {
            return Ok(None);
        }

        match Frame::classify(&msg.body) {
            Frame::Ack if self.state == HandshakeState::Probing => {
                self.send_request(request).await?;
                Ok(None)
            }
            Frame::Ack => {
                debug!(uuid = %self.uuid, "Ignoring repeated ack");
                Ok(None)
            }
            Frame::Response(_) => {
                info!(uuid = %self.uuid, "Got a response from the CA");
                let parsed = parse_response::<R>(&msg.body);
                if matches(&parsed, &self.uuid) {
                    return parsed.map(Some).map_err(HandshakeError::Parse);
                }
                match parsed {
                    // The CA answering someone else on the same channel
                    Ok(response) => {
                        debug!(ours = %self.uuid, theirs = %response.correlation_id(), "Skipping foreign response");
                        Ok(None)
                    }
                    Err(e) => {
                        warn!(body = %msg.body, "Failed to parse a message from the CA");
                        Err(HandshakeError::Parse(e))
                    }
                }
            }
            _ => Ok(None),
        }
    }

    async fn send_request<P: Serialize>(&mut self, request: &Request<P>) -> Result<(), HandshakeError> {
        if let Some(prober) = self.prober.take() {
            let attempts = prober.stop().await;
            debug!(attempts, "Prober stopped after ack");
        }
        self.transition(HandshakeState::RequestSent);

        let body = encode_request(request).map_err(HandshakeError::Marshal)?;
        match tokio::time::timeout_at(self.expires_at, self.channel.send(self.destination, &body)).await {
            Ok(sent) => sent.map_err(HandshakeError::Send)?,
            Err(_) => return Err(self.timed_out()),
        }
        info!(uuid = %self.uuid, destination = %self.destination, "Sent request to the CA");
        Ok(())
    }

    fn timed_out(&mut self) -> HandshakeError {
        warn!(uuid = %self.uuid, state = ?self.state, "Handshake deadline exceeded");
        self.transition(HandshakeState::TimedOut);
        HandshakeError::Timeout(self.deadline)
    }
}
