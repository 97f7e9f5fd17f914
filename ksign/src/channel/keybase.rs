//! Keybase chat channel driven through the `keybase` CLI
//!
//! - connect: `keybase whoami` proves the client is installed and logged in
//! - subscribe: `keybase chat api-listen` emits one JSON event per line
//! - send: `keybase chat api -m '{"method":"send",...}'`
//!
//! One-shot commands are killed if they outlive the command timeout, so a
//! wedged Keybase service surfaces as [`ChannelError::Timeout`].

use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ChannelError, ChatChannel, ContentType, Destination, InboundMessage, Subscription};

/// Session on Keybase chat as the locally logged-in user
#[derive(Debug, Clone)]
pub struct KeybaseChannel {
    binary: PathBuf,
    username: String,
    command_timeout: Duration,
}

impl KeybaseChannel {
    /// Verify the keybase client works and learn who we are
    pub async fn connect(binary: impl Into<PathBuf>, command_timeout: Duration) -> Result<Self, ChannelError> {
        let binary = binary.into();
        debug!(?binary, ?command_timeout, "KeybaseChannel::connect: called");

        let mut whoami = Command::new(&binary);
        whoami.arg("whoami").stdin(Stdio::null());
        let output = output_within(&mut whoami, command_timeout).await?;

        if !output.status.success() {
            return Err(ChannelError::Api {
                message: format!(
                    "keybase whoami failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let username = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if username.is_empty() {
            return Err(ChannelError::Api {
                message: "keybase is not logged in".to_string(),
            });
        }

        info!(%username, "Connected to Keybase chat");
        Ok(Self {
            binary,
            username,
            command_timeout,
        })
    }

    /// Identity messages from this session are attributed to
    pub fn username(&self) -> &str {
        &self.username
    }
}

#[async_trait]
impl ChatChannel for KeybaseChannel {
    async fn subscribe(&self) -> Result<Subscription, ChannelError> {
        debug!(binary = ?self.binary, "KeybaseChannel::subscribe: called");

        let mut child = Command::new(&self.binary)
            .args(["chat", "api-listen"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(ChannelError::Spawn)?;

        let stdout = child.stdout.take().ok_or(ChannelError::Closed)?;
        let lines = BufReader::new(stdout).lines();

        // The child rides along in the stream state so dropping the
        // subscription kills the listener.
        let messages = stream::unfold((lines, child), |(mut lines, child)| async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(msg) = decode_listen_line(&line) {
                            return Some((Ok(msg), (lines, child)));
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => return Some((Err(ChannelError::Io(e)), (lines, child))),
                }
            }
        });

        Ok(Subscription::new(messages.boxed()))
    }

    async fn send(&self, destination: &Destination, text: &str) -> Result<(), ChannelError> {
        debug!(%destination, "KeybaseChannel::send: called");
        let request = send_request(destination, text).to_string();

        let mut api = Command::new(&self.binary);
        api.args(["chat", "api", "-m", request.as_str()]).stdin(Stdio::null());
        let output = output_within(&mut api, self.command_timeout).await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(message) = api_error(stdout.trim())? {
            return Err(ChannelError::Api { message });
        }
        if !output.status.success() {
            return Err(ChannelError::Api {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Run a command to completion, killing it once `limit` passes
async fn output_within(command: &mut Command, limit: Duration) -> Result<Output, ChannelError> {
    command.kill_on_drop(true);
    match tokio::time::timeout(limit, command.output()).await {
        Ok(output) => output.map_err(ChannelError::Spawn),
        Err(_) => {
            warn!(?limit, "Keybase command timed out");
            Err(ChannelError::Timeout(limit))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListenEvent {
    #[serde(rename = "type")]
    kind: String,
    msg: Option<ListenMsg>,
}

#[derive(Debug, Deserialize)]
struct ListenMsg {
    sender: ListenSender,
    content: ListenContent,
}

#[derive(Debug, Deserialize)]
struct ListenSender {
    username: String,
}

#[derive(Debug, Deserialize)]
struct ListenContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<ListenText>,
}

#[derive(Debug, Deserialize)]
struct ListenText {
    body: String,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Turn one `api-listen` line into a message; non-chat events are skipped
fn decode_listen_line(line: &str) -> Option<InboundMessage> {
    let event: ListenEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable api-listen line");
            return None;
        }
    };
    if event.kind != "chat" {
        return None;
    }
    let msg = event.msg?;
    let (content_type, body) = match (msg.content.kind.as_str(), msg.content.text) {
        ("text", Some(text)) => (ContentType::Text, text.body),
        (other, _) => (ContentType::Other(other.to_string()), String::new()),
    };
    Some(InboundMessage {
        sender: msg.sender.username,
        content_type,
        body,
    })
}

fn send_request(destination: &Destination, text: &str) -> serde_json::Value {
    let mut channel = json!({
        "name": destination.team,
        "members_type": "team",
    });
    if let Some(topic) = &destination.channel {
        channel["topic_name"] = json!(topic);
    }
    json!({
        "method": "send",
        "params": {
            "options": {
                "channel": channel,
                "message": { "body": text },
            }
        }
    })
}

/// Extract the error message from a `chat api` reply, if there is one
fn api_error(stdout: &str) -> Result<Option<String>, ChannelError> {
    if stdout.is_empty() {
        return Ok(None);
    }
    let reply: ApiReply = serde_json::from_str(stdout)?;
    Ok(reply.error.map(|e| e.message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_message() {
        let line = r#"{"type":"chat","source":"remote","msg":{"id":7,"channel":{"name":"acme.ssh","members_type":"team","topic_name":"general"},"sender":{"uid":"abc","username":"cabot","device_name":"server"},"content":{"type":"text","text":{"body":"Ack--"}}}}"#;
        let msg = decode_listen_line(line).unwrap();
        assert_eq!(msg, InboundMessage::text("cabot", "Ack--"));
    }

    #[test]
    fn test_decode_non_text_message() {
        let line = r#"{"type":"chat","msg":{"sender":{"username":"bob"},"content":{"type":"reaction","reaction":{"b":":+1:"}}}}"#;
        let msg = decode_listen_line(line).unwrap();
        assert_eq!(msg.content_type, ContentType::Other("reaction".to_string()));
        assert!(msg.body.is_empty());
    }

    #[test]
    fn test_skip_non_chat_events_and_garbage() {
        assert!(decode_listen_line(r#"{"type":"chat_conv","conv":{}}"#).is_none());
        assert!(decode_listen_line("not json").is_none());
    }

    #[test]
    fn test_send_request_shape() {
        let dest = Destination::team("acme.ssh").with_channel("ca");
        let req = send_request(&dest, "AckRequest--");
        assert_eq!(req["method"], "send");
        assert_eq!(req["params"]["options"]["channel"]["name"], "acme.ssh");
        assert_eq!(req["params"]["options"]["channel"]["topic_name"], "ca");
        assert_eq!(req["params"]["options"]["message"]["body"], "AckRequest--");
    }

    #[test]
    fn test_send_request_without_topic() {
        let req = send_request(&Destination::team("acme.ssh"), "x");
        assert!(req["params"]["options"]["channel"].get("topic_name").is_none());
    }

    #[test]
    fn test_api_error_extraction() {
        assert_eq!(api_error("").unwrap(), None);
        assert_eq!(api_error(r#"{"result":{"message":"message sent"}}"#).unwrap(), None);
        assert_eq!(
            api_error(r#"{"error":{"code":2623,"message":"no conversations matched"}}"#).unwrap(),
            Some("no conversations matched".to_string())
        );
        assert!(matches!(api_error("oops"), Err(ChannelError::Decode(_))));
    }

    #[tokio::test]
    async fn test_connect_missing_binary_is_spawn_error() {
        let err = KeybaseChannel::connect("/nonexistent/keybase-binary", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Spawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wedged_client_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let binary = temp.path().join("keybase");
        std::fs::write(&binary, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let limit = Duration::from_millis(300);
        let start = std::time::Instant::now();
        let err = KeybaseChannel::connect(&binary, limit).await.unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(d) if d == limit));
        assert!(start.elapsed() < Duration::from_secs(10));

        let channel = KeybaseChannel {
            binary,
            username: "alice".to_string(),
            command_timeout: limit,
        };
        let err = channel.send(&Destination::team("acme.ssh"), "AckRequest--").await.unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)));
    }
}
