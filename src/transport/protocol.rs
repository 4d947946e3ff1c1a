//! Realtime transcription wire protocol
//!
//! JSON message types for the websocket transcription service.
//!
//! # Protocol Overview
//!
//! 1. Fetch a single-use token over HTTPS with the account API key
//! 2. Connect to the websocket endpoint with the token
//! 3. Receive `session.created`
//! 4. Send `session.configure` with model/language/VAD settings
//! 5. Stream base64 PCM16 via `audio.append`
//! 6. Receive `transcript.partial` while speaking and
//!    `transcript.committed` (with word timings and speaker tags) per
//!    utterance

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::transcript::TranscriptWord;

/// Websocket endpoint for realtime transcription.
pub const REALTIME_API_URL: &str = "wss://api.elevenlabs.io/v1/speech-to-text/realtime";

/// HTTPS endpoint that exchanges an API key for a single-use session token.
pub const TOKEN_URL: &str = "https://api.elevenlabs.io/v1/speech-to-text/realtime/token";

/// Transcription model used for every session.
pub const MODEL_ID: &str = "scribe_v2_realtime";

/// PCM sample rate the service expects.
pub const SERVICE_SAMPLE_RATE: u32 = 16_000;

/// Session configuration sent after connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub model_id: String,
    pub language_code: String,
    /// Word-level timestamps are required for de-duplication keys and
    /// speaker attribution.
    pub include_timestamps: bool,
    /// VAD tuning: higher threshold rejects quiet non-speech.
    pub vad_threshold: f32,
    pub min_speech_duration_ms: u32,
    pub min_silence_duration_ms: u32,
    /// Input format, e.g. "pcm_16000".
    pub audio_format: String,
}

impl SessionConfig {
    pub fn new(language_code: &str) -> Self {
        Self {
            model_id: MODEL_ID.to_string(),
            language_code: language_code.to_string(),
            include_timestamps: true,
            vad_threshold: 0.6,
            min_speech_duration_ms: 250,
            min_silence_duration_ms: 500,
            audio_format: format!("pcm_{}", SERVICE_SAMPLE_RATE),
        }
    }
}

/// Session information returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub id: String,

    #[serde(default)]
    pub model_id: String,
}

/// Error information from the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", default)]
    pub error_type: String,

    #[serde(default)]
    pub message: String,
}

/// One word of a committed transcript, as sent on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct WireWord {
    #[serde(default)]
    pub text: String,
    /// Seconds from utterance start.
    pub start: f64,
    #[serde(default)]
    pub speaker_id: Option<String>,
}

impl From<WireWord> for TranscriptWord {
    fn from(w: WireWord) -> Self {
        TranscriptWord {
            text: w.text,
            start: w.start,
            speaker_id: w.speaker_id,
        }
    }
}

// ============================================================================
// Client Messages (sent TO the service)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Configure the freshly created session.
    #[serde(rename = "session.configure")]
    Configure { session: SessionConfig },

    /// Append audio to the input stream.
    #[serde(rename = "audio.append")]
    AudioAppend {
        /// Base64-encoded PCM16 little-endian audio.
        audio: String,
    },

    /// Ask the service to finalize and close the session.
    #[serde(rename = "session.close")]
    Close,
}

impl ClientMessage {
    /// Build an audio append message from raw PCM16 samples.
    pub fn audio_append(samples: &[i16]) -> Self {
        let bytes: Vec<u8> = samples.iter().flat_map(|&s| s.to_le_bytes()).collect();
        Self::AudioAppend {
            audio: STANDARD.encode(&bytes),
        }
    }
}

// ============================================================================
// Server Messages (received FROM the service)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session.created")]
    SessionCreated { session: SessionInfo },

    #[serde(rename = "session.updated")]
    SessionUpdated {},

    /// Still-revisable text for the current utterance.
    #[serde(rename = "transcript.partial")]
    PartialTranscript { text: String },

    /// Finalized text the service will not revise further.
    #[serde(rename = "transcript.committed")]
    CommittedTranscript {
        text: String,
        #[serde(default)]
        words: Vec<WireWord>,
    },

    #[serde(rename = "auth.error")]
    AuthError { error: ErrorInfo },

    #[serde(rename = "quota.exceeded")]
    QuotaExceeded { error: ErrorInfo },

    #[serde(rename = "error")]
    Error { error: ErrorInfo },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_append_encodes_base64_le() {
        let msg = ClientMessage::audio_append(&[0x0102, -1]);
        match msg {
            ClientMessage::AudioAppend { audio } => {
                let bytes = STANDARD.decode(audio).expect("valid base64");
                assert_eq!(bytes, vec![0x02, 0x01, 0xFF, 0xFF]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_client_message_tags() {
        let json = serde_json::to_string(&ClientMessage::Close).expect("serialize");
        assert!(json.contains("\"session.close\""));

        let config = ClientMessage::Configure {
            session: SessionConfig::new("en"),
        };
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(json.contains("\"session.configure\""));
        assert!(json.contains("scribe_v2_realtime"));
        assert!(json.contains("pcm_16000"));
    }

    #[test]
    fn test_committed_transcript_parses_words() {
        let json = r#"{
            "type": "transcript.committed",
            "text": "hello world",
            "words": [
                {"text": "hello", "start": 0.12, "speaker_id": "speaker_0"},
                {"text": "world", "start": 0.48}
            ]
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).expect("parse");
        match msg {
            ServerMessage::CommittedTranscript { text, words } => {
                assert_eq!(text, "hello world");
                assert_eq!(words.len(), 2);
                assert_eq!(words[0].speaker_id.as_deref(), Some("speaker_0"));
                assert_eq!(words[1].speaker_id, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_committed_without_words_defaults_empty() {
        let json = r#"{"type": "transcript.committed", "text": "ok"}"#;
        let msg: ServerMessage = serde_json::from_str(json).expect("parse");
        match msg {
            ServerMessage::CommittedTranscript { words, .. } => assert!(words.is_empty()),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
