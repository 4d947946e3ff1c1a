//! Realtime websocket client
//!
//! Owns the websocket connection lifecycle for one transcription session.
//!
//! # Connection Flow
//!
//! 1. `fetch_token()` - Exchange the API key for a single-use token
//! 2. `RealtimeSession::connect()` - Websocket handshake, wait for
//!    `session.created`, send configuration
//! 3. `send_audio()` - Stream PCM16 chunks
//! 4. `disconnect()` - Clean shutdown
//!
//! # Retry Strategy
//!
//! Initial connection retries 3 times with exponential backoff (1s, 2s,
//! 4s). Mid-session disconnects do NOT reconnect: the session surfaces
//! `Closed` and the caller decides; already-finalized transcript content is
//! never discarded.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async_with_config, tungstenite::client::IntoClientRequest, tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};

use super::protocol::{ClientMessage, ServerMessage, SessionConfig, REALTIME_API_URL, TOKEN_URL};
use super::{TranscriptionEvent, TransportError};

/// Connection timeout for the initial websocket handshake.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for waiting for the session.created message.
const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum retry attempts for the initial connection.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (doubles each retry).
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Exchange the account API key for a single-use session token.
pub async fn fetch_token(api_key: &str) -> Result<String, TransportError> {
    if api_key.is_empty() {
        return Err(TransportError::MissingToken);
    }

    #[derive(serde::Deserialize)]
    struct TokenResponse {
        token: String,
    }

    let client = reqwest::Client::new();
    let response = client
        .post(TOKEN_URL)
        .header("xi-api-key", api_key)
        .send()
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    match response.status().as_u16() {
        200 => {
            let body: TokenResponse = response
                .json()
                .await
                .map_err(|e| TransportError::Protocol(e.to_string()))?;
            Ok(body.token)
        }
        401 | 403 => Err(TransportError::AuthFailed(
            "API key rejected by token endpoint".to_string(),
        )),
        429 => Err(TransportError::QuotaExceeded(
            "Token endpoint reported quota exhaustion".to_string(),
        )),
        status => Err(TransportError::ConnectionFailed(format!(
            "Token endpoint returned status {}",
            status
        ))),
    }
}

/// Handle to an active realtime transcription session.
///
/// The session owns the websocket write half; incoming traffic is parsed by
/// a background task and surfaced as `TranscriptionEvent`s.
pub struct RealtimeSession {
    write: futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    /// Wrapped in Option so the caller can take it for concurrent
    /// processing.
    events_rx: Option<mpsc::Receiver<TranscriptionEvent>>,
    session_id: String,
    /// Handle to the receiver task (for cleanup on disconnect/drop).
    receiver_task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for RealtimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSession")
            .field("session_id", &self.session_id)
            .field("events_rx", &self.events_rx.is_some())
            .finish_non_exhaustive()
    }
}

impl RealtimeSession {
    /// Connect and configure a session, retrying with backoff.
    pub async fn connect(token: &str, config: SessionConfig) -> Result<Self, TransportError> {
        if token.is_empty() {
            return Err(TransportError::MissingToken);
        }

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                log::info!(
                    "Retrying websocket connection in {:?} (attempt {}/{})",
                    delay,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(delay).await;
            }

            match Self::try_connect(token, config.clone()).await {
                Ok(session) => return Ok(session),
                // Auth and quota failures will not heal on retry.
                Err(e @ TransportError::AuthFailed(_))
                | Err(e @ TransportError::QuotaExceeded(_)) => return Err(e),
                Err(e) => {
                    log::warn!("Connection attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| TransportError::ConnectionFailed("Max retries exceeded".to_string())))
    }

    /// Single connection attempt (no retries).
    async fn try_connect(token: &str, config: SessionConfig) -> Result<Self, TransportError> {
        let url = format!("{}?token={}", REALTIME_API_URL, token);
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        log::info!("Connecting to realtime transcription service...");

        let (ws_stream, _response) = timeout(
            CONNECTION_TIMEOUT,
            connect_async_with_config(request, None, false),
        )
        .await
        .map_err(|_| TransportError::ConnectionFailed("Connection timeout".to_string()))?
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        log::info!("Websocket connected, waiting for session.created...");

        let (mut write, mut read) = ws_stream.split();

        // Wait for session.created before anything else.
        let session_id = timeout(SESSION_TIMEOUT, async {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::SessionCreated { session }) => {
                            log::info!("Session created: {}", session.id);
                            return Ok(session.id);
                        }
                        Ok(ServerMessage::AuthError { error }) => {
                            return Err(TransportError::AuthFailed(error.message));
                        }
                        Ok(ServerMessage::QuotaExceeded { error }) => {
                            return Err(TransportError::QuotaExceeded(error.message));
                        }
                        Ok(ServerMessage::Error { error }) => {
                            return Err(TransportError::Protocol(error.message));
                        }
                        Ok(_) => {
                            log::debug!("Ignoring message while waiting for session.created");
                        }
                        Err(e) => {
                            log::warn!("Failed to parse message: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        return Err(TransportError::Disconnected(
                            "Connection closed before session created".to_string(),
                        ));
                    }
                    Err(e) => {
                        return Err(TransportError::Protocol(e.to_string()));
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }
            Err(TransportError::Disconnected("Stream ended".to_string()))
        })
        .await
        .map_err(|_| TransportError::ConnectionFailed("Session creation timeout".to_string()))??;

        // Configure before any audio flows.
        let configure = serde_json::to_string(&ClientMessage::Configure { session: config })
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        write
            .send(Message::Text(configure.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        // Background task: parse incoming traffic into events.
        let (events_tx, events_rx) = mpsc::channel(100);
        let receiver_task = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            let Some(event) = server_message_to_event(msg) else {
                                continue;
                            };
                            if events_tx.send(event).await.is_err() {
                                log::debug!("Event channel closed");
                                return;
                            }
                        }
                        Err(e) => {
                            log::warn!("Failed to parse message: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        log::info!("Websocket closed by server");
                        break;
                    }
                    Err(e) => {
                        log::warn!("Websocket error: {}", e);
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }
            let _ = events_tx.send(TranscriptionEvent::Closed).await;
            log::debug!("Receiver task exiting");
        });

        Ok(Self {
            write,
            events_rx: Some(events_rx),
            session_id,
            receiver_task,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Take the event receiver for concurrent processing. Returns `None`
    /// after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TranscriptionEvent>> {
        self.events_rx.take()
    }

    /// Stream a chunk of PCM16 audio to the service.
    pub async fn send_audio(&mut self, samples: &[i16]) -> Result<(), TransportError> {
        let msg = serde_json::to_string(&ClientMessage::audio_append(samples))
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.write
            .send(Message::Text(msg.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Close the session cleanly. Errors during shutdown are logged, not
    /// surfaced; the session is gone either way.
    pub async fn disconnect(mut self) {
        let close = serde_json::to_string(&ClientMessage::Close).unwrap_or_default();
        if let Err(e) = self.write.send(Message::Text(close.into())).await {
            log::debug!("Failed to send session.close: {}", e);
        }
        if let Err(e) = self.write.close().await {
            log::debug!("Failed to close websocket: {}", e);
        }
        self.receiver_task.abort();
        log::info!("Realtime session disconnected");
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        self.receiver_task.abort();
    }
}

fn server_message_to_event(msg: ServerMessage) -> Option<TranscriptionEvent> {
    match msg {
        ServerMessage::PartialTranscript { text } => Some(TranscriptionEvent::Partial { text }),
        ServerMessage::CommittedTranscript { text, words } => {
            Some(TranscriptionEvent::Committed {
                text,
                words: words.into_iter().map(Into::into).collect(),
            })
        }
        ServerMessage::AuthError { error } => Some(TranscriptionEvent::AuthError {
            message: error.message,
        }),
        ServerMessage::QuotaExceeded { error } => Some(TranscriptionEvent::QuotaExceeded {
            message: error.message,
        }),
        ServerMessage::Error { error } => Some(TranscriptionEvent::Error {
            message: error.message,
        }),
        ServerMessage::SessionCreated { .. } | ServerMessage::SessionUpdated {} => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::protocol::{ErrorInfo, WireWord};

    fn error_info(message: &str) -> ErrorInfo {
        ErrorInfo {
            error_type: String::new(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_event_mapping_covers_error_taxonomy() {
        let auth = server_message_to_event(ServerMessage::AuthError {
            error: error_info("bad token"),
        });
        assert!(matches!(
            auth,
            Some(TranscriptionEvent::AuthError { message }) if message == "bad token"
        ));

        let quota = server_message_to_event(ServerMessage::QuotaExceeded {
            error: error_info("limit"),
        });
        assert!(matches!(
            quota,
            Some(TranscriptionEvent::QuotaExceeded { .. })
        ));

        let generic = server_message_to_event(ServerMessage::Error {
            error: error_info("oops"),
        });
        assert!(matches!(generic, Some(TranscriptionEvent::Error { .. })));
    }

    #[test]
    fn test_committed_maps_words() {
        let event = server_message_to_event(ServerMessage::CommittedTranscript {
            text: "hi".to_string(),
            words: vec![WireWord {
                text: "hi".to_string(),
                start: 0.2,
                speaker_id: Some("speaker_1".to_string()),
            }],
        });
        match event {
            Some(TranscriptionEvent::Committed { text, words }) => {
                assert_eq!(text, "hi");
                assert_eq!(words[0].speaker_id.as_deref(), Some("speaker_1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_lifecycle_messages_produce_no_event() {
        let event = server_message_to_event(ServerMessage::SessionUpdated {});
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn test_fetch_token_rejects_empty_key() {
        let err = fetch_token("").await.unwrap_err();
        assert!(matches!(err, TransportError::MissingToken));
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_token() {
        let err = RealtimeSession::connect("", SessionConfig::new("en"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::MissingToken));
    }
}
