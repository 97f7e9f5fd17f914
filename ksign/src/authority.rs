//! Minimal signing authority
//!
//! Answers probes with acks and framed signature requests with framed
//! responses, using a caller-supplied signer. Backs `ks sign --loopback` and
//! the integration tests; a production CA runs elsewhere.

use std::sync::Arc;

use chatproto::{ACK, Frame, Response, SignatureOutcome, SignatureParams, SignatureRequest, encode_response, parse_request};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, ChatChannel, Destination, Subscription};

/// Decides what to answer for a request
pub type Signer = Arc<dyn Fn(&SignatureParams) -> SignatureOutcome + Send + Sync>;

/// Counters reported when an authority stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorityStats {
    pub acks_sent: u32,
    pub requests_served: u32,
    pub requests_rejected: u32,
}

pub struct Authority {
    channel: Arc<dyn ChatChannel>,
    destination: Destination,
    signer: Signer,
}

impl Authority {
    pub fn new(channel: Arc<dyn ChatChannel>, destination: Destination, signer: Signer) -> Self {
        Self {
            channel,
            destination,
            signer,
        }
    }

    /// Subscribe, then serve in the background
    ///
    /// Probes sent before this returns are not seen.
    pub async fn start(self) -> Result<AuthorityHandle, ChannelError> {
        debug!(destination = %self.destination, "Authority::start: called");
        let subscription = self.channel.subscribe().await?;
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.serve(subscription, stop_rx));
        Ok(AuthorityHandle { stop_tx, task })
    }

    async fn serve(self, mut subscription: Subscription, mut stop_rx: oneshot::Receiver<()>) -> AuthorityStats {
        let mut stats = AuthorityStats::default();
        info!(destination = %self.destination, "Authority listening");

        loop {
            let msg = tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                msg = subscription.next() => msg,
            };
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "Authority lost its subscription");
                    break;
                }
            };
            if !msg.is_text() {
                continue;
            }

            match Frame::classify(&msg.body) {
                Frame::Probe => {
                    if self.reply(ACK).await {
                        stats.acks_sent += 1;
                    }
                }
                Frame::Request(_) => {
                    let request: SignatureRequest = match parse_request(&msg.body) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(sender = %msg.sender, error = %e, "Dropping malformed request");
                            continue;
                        }
                    };
                    let outcome = (self.signer)(request.params());
                    if outcome.error.is_some() {
                        stats.requests_rejected += 1;
                    }
                    let response = Response::new(request.correlation_id(), outcome);
                    match encode_response(&response) {
                        Ok(body) => {
                            if self.reply(&body).await {
                                stats.requests_served += 1;
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to encode response"),
                    }
                }
                _ => {}
            }
        }

        info!(?stats, "Authority stopped");
        stats
    }

    async fn reply(&self, body: &str) -> bool {
        match self.channel.send(&self.destination, body).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Authority failed to send");
                false
            }
        }
    }
}

/// Handle to a running authority
pub struct AuthorityHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<AuthorityStats>,
}

impl AuthorityHandle {
    pub async fn stop(self) -> AuthorityStats {
        let _ = self.stop_tx.send(());
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Authority task ended abnormally");
                AuthorityStats::default()
            }
        }
    }
}

/// Signer that issues a placeholder certificate for any request
pub fn loopback_signer() -> Signer {
    Arc::new(|params: &SignatureParams| {
        let principals = params.principals.clone().unwrap_or_else(|| params.username.clone());
        SignatureOutcome::signed(format!(
            "{} loopback-cert principals={} device={}",
            params.ssh_public_key.trim(),
            principals,
            params.device_name
        ))
    })
}
