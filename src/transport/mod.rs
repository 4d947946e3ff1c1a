//! Speech transcription transport
//!
//! The session consumes transcription through a narrow contract: a stream
//! of `TranscriptionEvent`s plus `connect`/`disconnect` on the adapter. The
//! default adapter speaks the realtime websocket protocol in
//! `protocol`/`realtime`; the core never depends on wire details beyond
//! that module boundary.
//!
//! # Architecture
//!
//! ```text
//! Sampler tap (PCM16) ──channel──▶ AudioStreamer ──▶ RealtimeSession (WS)
//!                                                          │
//!                                  session event loop ◀────┘
//!                                  (TranscriptionEvent)
//! ```

pub mod protocol;
mod realtime;
mod streamer;

pub use realtime::{fetch_token, RealtimeSession};
pub use streamer::{connect_streamer, downsample, AudioStreamer, StreamerConfig};

use crate::transcript::TranscriptWord;

/// Receiver for transcription events from an active session.
pub type TranscriptionEventReceiver = tokio::sync::mpsc::Receiver<TranscriptionEvent>;

/// Everything the core consumes from the transcription service.
#[derive(Debug, Clone)]
pub enum TranscriptionEvent {
    /// In-flight, still-revisable text for the current utterance.
    Partial { text: String },
    /// A finalized segment the service will not revise further.
    Committed {
        text: String,
        words: Vec<TranscriptWord>,
    },
    AuthError { message: String },
    QuotaExceeded { message: String },
    Error { message: String },
    /// The connection ended (clean or not).
    Closed,
}

/// Errors that can occur while talking to the transcription service.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// No access token available for the connection.
    MissingToken,
    /// Failed to establish the websocket connection.
    ConnectionFailed(String),
    /// The service rejected our credentials.
    AuthFailed(String),
    /// The account is out of quota.
    QuotaExceeded(String),
    /// Malformed or unexpected wire traffic.
    Protocol(String),
    /// Connection closed unexpectedly.
    Disconnected(String),
    /// Failed to send audio data.
    SendFailed(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::MissingToken => {
                write!(f, "No transcription token. Set SCRIBE_API_KEY and retry.")
            }
            TransportError::ConnectionFailed(e) => {
                write!(f, "Failed to connect to transcription service: {}", e)
            }
            TransportError::AuthFailed(e) => write!(f, "Authentication failed: {}", e),
            TransportError::QuotaExceeded(e) => write!(f, "Quota exceeded: {}", e),
            TransportError::Protocol(e) => write!(f, "Websocket protocol error: {}", e),
            TransportError::Disconnected(e) => write!(f, "Websocket disconnected: {}", e),
            TransportError::SendFailed(e) => write!(f, "Failed to send audio: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::MissingToken;
        assert!(err.to_string().contains("SCRIBE_API_KEY"));

        let err = TransportError::ConnectionFailed("timeout".to_string());
        assert!(err.to_string().contains("timeout"));

        let err = TransportError::QuotaExceeded("plan limit".to_string());
        assert!(err.to_string().contains("plan limit"));
    }
}
