use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transcript::{SpeakerInfo, TranscriptSegment};

/// Built-in category tags. Users can add their own on top.
pub const DEFAULT_CATEGORIES: [&str; 7] = [
    "Note",
    "Message",
    "Rant",
    "Idea",
    "Meeting",
    "Conversation",
    "Task",
];

/// A finalized, persisted recording.
///
/// `id` and `created_at` are set once at archive time and never change.
/// `text` is derived from the segments; after archiving, only `title`,
/// `category`, and `is_important` are user-mutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedTranscript {
    pub id: String,
    pub title: String,
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub speakers: Vec<SpeakerInfo>,
    pub category: String,
    pub is_important: bool,
    pub has_consent: bool,
    /// Unix milliseconds at archive time.
    pub created_at: i64,
}

impl ArchivedTranscript {
    pub fn new(
        title: &str,
        segments: Vec<TranscriptSegment>,
        speakers: Vec<SpeakerInfo>,
        category: &str,
        is_important: bool,
        has_consent: bool,
    ) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let title = if title.trim().is_empty() {
            "Untitled Recording".to_string()
        } else {
            title.trim().to_string()
        };
        let category = if category.trim().is_empty() {
            "Note".to_string()
        } else {
            category.trim().to_string()
        };

        Self {
            id: Uuid::new_v4().to_string(),
            title,
            text,
            segments,
            speakers,
            category,
            is_important,
            has_consent,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str) -> TranscriptSegment {
        TranscriptSegment {
            text: text.to_string(),
            speaker_id: None,
        }
    }

    #[test]
    fn test_text_is_derived_from_segments() {
        let record = ArchivedTranscript::new(
            "Standup",
            vec![segment("Hi there."), segment("How are you?")],
            vec![],
            "Meeting",
            false,
            true,
        );
        assert_eq!(record.text, "Hi there. How are you?");
        assert_eq!(record.segments.len(), 2);
    }

    #[test]
    fn test_blank_title_and_category_get_defaults() {
        let record = ArchivedTranscript::new("  ", vec![segment("x")], vec![], "", false, false);
        assert_eq!(record.title, "Untitled Recording");
        assert_eq!(record.category, "Note");
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ArchivedTranscript::new("a", vec![segment("x")], vec![], "Note", false, false);
        let b = ArchivedTranscript::new("b", vec![segment("y")], vec![], "Note", false, false);
        assert_ne!(a.id, b.id);
    }
}
