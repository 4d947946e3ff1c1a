//! Finalized-segment assembly with de-duplication
//!
//! The transport can deliver the same finalized event through more than one
//! callback path, and a pause followed quickly by a stop must not commit
//! the same pending text twice. A key set derived from
//! `(text, first-word-timestamp-or-now)` is the sole guard; it is checked
//! before every append.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One word of a finalized event, as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptWord {
    #[serde(default)]
    pub text: String,
    /// Start offset in seconds from utterance start.
    pub start: f64,
    #[serde(default)]
    pub speaker_id: Option<String>,
}

/// A finalized transcript segment. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub speaker_id: Option<String>,
}

/// Which boundary is forcing the pending partial to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitBoundary {
    /// An interrupted thought: unpunctuated text gets an ellipsis marker.
    Pause,
    Stop,
}

impl CommitBoundary {
    fn key_suffix(self) -> &'static str {
        match self {
            CommitBoundary::Pause => "pause",
            CommitBoundary::Stop => "stop",
        }
    }
}

#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    segments: Vec<TranscriptSegment>,
    /// Speaker ids in first-seen order.
    speakers: Vec<String>,
    seen_keys: HashSet<String>,
    /// In-flight, still-revisable text for the current utterance.
    partial: String,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a finalized speech event. Idempotent: re-delivery of the
    /// same (text, first-word-timestamp) pair is discarded.
    pub fn on_finalized_segment(&mut self, text: &str, words: &[TranscriptWord]) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let timestamp = words
            .first()
            .map(|w| format!("{}", w.start))
            .unwrap_or_else(|| now_millis().to_string());
        let key = format!("{}-{}", text, timestamp);
        if !self.seen_keys.insert(key) {
            log::debug!("Dropping duplicate finalized segment: {:.40}", text);
            return;
        }

        let speaker_id = dominant_speaker(words);
        if let Some(id) = &speaker_id {
            if !self.speakers.iter().any(|s| s == id) {
                self.speakers.push(id.clone());
            }
        }

        self.segments.push(TranscriptSegment {
            text: text.to_string(),
            speaker_id,
        });
    }

    /// Track the current partial transcript (replaces the previous value).
    pub fn on_partial(&mut self, text: &str) {
        self.partial = text.to_string();
    }

    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Force-commit the pending partial at a pause/stop boundary. Returns
    /// the committed text, if any. The boundary-specific key suffix keeps
    /// this from colliding with a genuine finalize event for the same text.
    pub fn commit_pending(&mut self, boundary: CommitBoundary) -> Option<String> {
        let pending = self.partial.trim().to_string();
        if pending.is_empty() {
            return None;
        }

        let text = match boundary {
            CommitBoundary::Pause if !ends_with_terminal_punctuation(&pending) => {
                format!("{}...", pending)
            }
            _ => pending.clone(),
        };

        let key = format!("{}-{}-{}", pending, boundary.key_suffix(), now_millis());
        if !self.seen_keys.insert(key) {
            return None;
        }

        self.segments.push(TranscriptSegment {
            text: text.clone(),
            speaker_id: None,
        });
        self.partial.clear();
        Some(text)
    }

    /// Full transcript: segment texts joined with single spaces.
    pub fn transcript(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.segments
    }

    pub fn speaker_ids(&self) -> &[String] {
        &self.speakers
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.partial.is_empty()
    }

    /// Drop all content and de-dup state. Must run before a new recording
    /// session when prior content exists, so stale keys cannot suppress the
    /// new session's events.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.speakers.clear();
        self.seen_keys.clear();
        self.partial.clear();
    }
}

fn ends_with_terminal_punctuation(text: &str) -> bool {
    matches!(text.chars().last(), Some('.') | Some('!') | Some('?'))
}

/// Majority vote across word speaker tags; ties go to the speaker
/// encountered first.
fn dominant_speaker(words: &[TranscriptWord]) -> Option<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for word in words {
        if let Some(id) = &word.speaker_id {
            match counts.iter_mut().find(|(s, _)| s == id) {
                Some((_, c)) => *c += 1,
                None => counts.push((id.clone(), 1)),
            }
        }
    }

    let mut best: Option<(String, usize)> = None;
    for (id, count) in counts {
        let better = match &best {
            Some((_, best_count)) => count > *best_count,
            None => true,
        };
        if better {
            best = Some((id, count));
        }
    }
    best.map(|(id, _)| id)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(start: f64, speaker: Option<&str>) -> TranscriptWord {
        TranscriptWord {
            text: String::new(),
            start,
            speaker_id: speaker.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_duplicate_delivery_stores_one_segment() {
        let mut assembler = TranscriptAssembler::new();
        let words = vec![word(1.25, None)];
        assembler.on_finalized_segment("Hello there.", &words);
        assembler.on_finalized_segment("Hello there.", &words);
        assert_eq!(assembler.segments().len(), 1);
    }

    #[test]
    fn test_same_text_different_timestamp_is_kept() {
        let mut assembler = TranscriptAssembler::new();
        assembler.on_finalized_segment("Okay.", &[word(1.0, None)]);
        assembler.on_finalized_segment("Okay.", &[word(7.5, None)]);
        assert_eq!(assembler.segments().len(), 2);
    }

    #[test]
    fn test_empty_text_is_ignored() {
        let mut assembler = TranscriptAssembler::new();
        assembler.on_finalized_segment("   ", &[]);
        assert!(assembler.segments().is_empty());
    }

    #[test]
    fn test_majority_vote_picks_dominant_speaker() {
        let mut assembler = TranscriptAssembler::new();
        let words = vec![
            word(0.0, Some("a")),
            word(0.5, Some("b")),
            word(1.0, Some("b")),
        ];
        assembler.on_finalized_segment("Two against one.", &words);
        assert_eq!(assembler.segments()[0].speaker_id.as_deref(), Some("b"));
        assert_eq!(assembler.speaker_ids(), &["b".to_string()]);
    }

    #[test]
    fn test_tie_goes_to_first_encountered() {
        let mut assembler = TranscriptAssembler::new();
        let words = vec![
            word(0.0, Some("b")),
            word(0.5, Some("a")),
            word(1.0, Some("a")),
            word(1.5, Some("b")),
        ];
        assembler.on_finalized_segment("Even split.", &words);
        assert_eq!(assembler.segments()[0].speaker_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_no_tags_means_no_speaker() {
        let mut assembler = TranscriptAssembler::new();
        assembler.on_finalized_segment("Untagged.", &[word(0.0, None)]);
        assert_eq!(assembler.segments()[0].speaker_id, None);
        assert!(assembler.speaker_ids().is_empty());
    }

    #[test]
    fn test_pause_commit_adds_ellipsis_to_unpunctuated_text() {
        let mut assembler = TranscriptAssembler::new();
        assembler.on_partial("hello world");
        let committed = assembler.commit_pending(CommitBoundary::Pause);
        assert_eq!(committed.as_deref(), Some("hello world..."));
        assert_eq!(assembler.segments()[0].text, "hello world...");
        assert_eq!(assembler.segments()[0].speaker_id, None);
        assert!(assembler.partial().is_empty());
    }

    #[test]
    fn test_pause_commit_keeps_punctuated_text_unchanged() {
        let mut assembler = TranscriptAssembler::new();
        assembler.on_partial("hello world.");
        let committed = assembler.commit_pending(CommitBoundary::Pause);
        assert_eq!(committed.as_deref(), Some("hello world."));
    }

    #[test]
    fn test_stop_commit_never_adds_ellipsis() {
        let mut assembler = TranscriptAssembler::new();
        assembler.on_partial("trailing thought");
        let committed = assembler.commit_pending(CommitBoundary::Stop);
        assert_eq!(committed.as_deref(), Some("trailing thought"));
    }

    #[test]
    fn test_commit_with_no_partial_is_a_noop() {
        let mut assembler = TranscriptAssembler::new();
        assert_eq!(assembler.commit_pending(CommitBoundary::Stop), None);
        assert!(assembler.segments().is_empty());
    }

    #[test]
    fn test_transcript_joins_segments_in_order() {
        let mut assembler = TranscriptAssembler::new();
        assembler.on_finalized_segment("Hi there.", &[word(0.0, None)]);
        assembler.on_finalized_segment("How are you?", &[word(2.0, None)]);
        assembler.on_finalized_segment("Doing well thanks.", &[word(4.0, None)]);
        assert_eq!(
            assembler.transcript(),
            "Hi there. How are you? Doing well thanks."
        );
    }

    #[test]
    fn test_clear_resets_dedup_state() {
        let mut assembler = TranscriptAssembler::new();
        let words = vec![word(3.0, None)];
        assembler.on_finalized_segment("Same words.", &words);
        assembler.clear();
        assert!(assembler.is_empty());

        // After clear, the identical event must be accepted again.
        assembler.on_finalized_segment("Same words.", &words);
        assert_eq!(assembler.segments().len(), 1);
    }
}
