//! Push channel to the backend
//!
//! One duplex WebSocket carries server-initiated notifications: auto-scrape
//! results and chat replies generated out of band. The connection task runs
//! for the life of the process, reconnecting with exponential backoff; after
//! the configured number of consecutive failures it parks in an offline state
//! until a reconnect request re-arms it.

use crate::config::ReconnectConfig;
use crate::controller::Command;
use crate::events::ConnectionState;
use futures_util::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Timeout for a single connection attempt
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Recognized push notification kinds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum PushMessage {
    /// The backend's polling loop produced a fresh code snapshot
    ScrapeResult { data: ScrapePayload },
    /// An assistant reply pushed outside a request/response exchange
    ChatResponse { content: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ScrapePayload {
    #[serde(default)]
    pub code: String,
}

/// Parse a raw frame. `Ok(None)` means valid JSON of an unrecognized kind,
/// which is ignored without error; invalid JSON is a parse error the caller
/// logs and drops.
pub(crate) fn parse_push_message(raw: &str) -> Result<Option<PushMessage>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    Ok(serde_json::from_value(value).ok())
}

/// Spawn the push connection task.
///
/// Connection state transitions and parsed messages are forwarded to the
/// controller as commands. `reconnect_rx` wakes the task out of the offline
/// state. The task ends when the controller side is gone.
pub(crate) fn spawn_push_task(
    ws_url: url::Url,
    policy: ReconnectConfig,
    cmd_tx: mpsc::Sender<Command>,
    mut reconnect_rx: mpsc::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut attempt: u32 = 0;
        loop {
            let connected = timeout(
                Duration::from_secs(CONNECT_TIMEOUT_SECS),
                connect_async(ws_url.as_str()),
            )
            .await;

            match connected {
                Ok(Ok((mut ws_stream, _response))) => {
                    info!("Push channel connected: {}", ws_url);
                    attempt = 0;
                    if cmd_tx
                        .send(Command::Connection(ConnectionState::Connected))
                        .await
                        .is_err()
                    {
                        return;
                    }

                    read_frames(&mut ws_stream, &cmd_tx).await;

                    warn!("Push channel closed");
                    if cmd_tx
                        .send(Command::Connection(ConnectionState::Lost))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(Err(e)) => {
                    error!("Push channel connection failed: {}", e);
                }
                Err(_) => {
                    error!("Push channel connection attempt timed out");
                }
            }

            attempt += 1;
            if attempt > policy.max_attempts {
                warn!(
                    "Push channel offline after {} failed attempts",
                    policy.max_attempts
                );
                if cmd_tx
                    .send(Command::Connection(ConnectionState::Offline))
                    .await
                    .is_err()
                {
                    return;
                }
                if reconnect_rx.recv().await.is_none() {
                    return;
                }
                info!("Push channel reconnect requested");
                attempt = 0;
                continue;
            }

            let delay = policy.delay_for_attempt(attempt);
            if cmd_tx
                .send(Command::Connection(ConnectionState::Reconnecting {
                    attempt,
                }))
                .await
                .is_err()
            {
                return;
            }
            debug!(
                "Push channel retrying in {}s (attempt {}/{})",
                delay.as_secs(),
                attempt,
                policy.max_attempts
            );
            sleep(delay).await;
        }
    })
}

/// Read frames until the connection drops or the controller goes away
async fn read_frames<S>(ws_stream: &mut S, cmd_tx: &mpsc::Sender<Command>)
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = ws_stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match parse_push_message(&text) {
                Ok(Some(message)) => {
                    if cmd_tx.send(Command::Push(message)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    debug!("Ignoring unrecognized push message: {}", text);
                }
                Err(e) => {
                    warn!("Dropping malformed push message: {} - {}", e, text);
                }
            },
            Ok(Message::Close(_)) => {
                info!("Push channel closed by server");
                return;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(_) => {}
            Err(e) => {
                error!("Push channel receive error: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scrape_result() {
        let raw = r#"{"type":"scrape_result","data":{"code":"def f(): pass"}}"#;
        let message = parse_push_message(raw).unwrap().unwrap();
        assert_eq!(
            message,
            PushMessage::ScrapeResult {
                data: ScrapePayload {
                    code: "def f(): pass".to_string()
                }
            }
        );
    }

    #[test]
    fn test_parse_chat_response() {
        let raw = r#"{"type":"chat_response","content":"Hello"}"#;
        let message = parse_push_message(raw).unwrap().unwrap();
        assert_eq!(
            message,
            PushMessage::ChatResponse {
                content: "Hello".to_string()
            }
        );
    }

    #[test]
    fn test_unrecognized_kind_is_ignored() {
        let raw = r#"{"type":"heartbeat","seq":7}"#;
        assert_eq!(parse_push_message(raw).unwrap(), None);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(parse_push_message("not json at all").is_err());
        assert!(parse_push_message("").is_err());
    }

    #[test]
    fn test_scrape_result_without_code_defaults_empty() {
        let raw = r#"{"type":"scrape_result","data":{"platform":"leetcode"}}"#;
        let message = parse_push_message(raw).unwrap().unwrap();
        assert_eq!(
            message,
            PushMessage::ScrapeResult {
                data: ScrapePayload {
                    code: String::new()
                }
            }
        );
    }
}
