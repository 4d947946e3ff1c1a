//! Paragraph grouping
//!
//! Pure derived views over the segment list; nothing here is persisted.
//! Break rule: a paragraph ends after 5 accumulated sentence-ends or once
//! its text grows past 500 characters. Text with no punctuation at all
//! falls back to fixed 75-word chunks.

use super::TranscriptSegment;

/// Sentence-ends accumulated before a paragraph break.
const SENTENCES_PER_PARAGRAPH: usize = 5;

/// Paragraph length ceiling in characters.
const PARAGRAPH_CHAR_LIMIT: usize = 500;

/// Fallback chunk size for punctuation-free text.
const WORDS_PER_PARAGRAPH: usize = 75;

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Count runs of sentence-ending punctuation ("Really?!" counts once).
fn sentence_end_runs(text: &str) -> usize {
    let mut runs = 0;
    let mut in_run = false;
    for c in text.chars() {
        if is_sentence_end(c) {
            if !in_run {
                runs += 1;
                in_run = true;
            }
        } else {
            in_run = false;
        }
    }
    runs
}

/// Group consecutive segments into display paragraphs.
///
/// Each segment contributes at least one sentence to the count even when
/// it carries no punctuation, so unpunctuated dictation still breaks.
pub fn group_segments(segments: &[TranscriptSegment]) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut sentence_count = 0;

    for segment in segments {
        current.push(&segment.text);
        sentence_count += sentence_end_runs(&segment.text).max(1);

        let paragraph_text = current.join(" ");
        if sentence_count >= SENTENCES_PER_PARAGRAPH || paragraph_text.len() > PARAGRAPH_CHAR_LIMIT
        {
            paragraphs.push(paragraph_text);
            current.clear();
            sentence_count = 0;
        }
    }

    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs
}

/// Group a flat transcript string into paragraphs.
///
/// Splits on sentence boundaries when punctuation exists; otherwise chunks
/// by word count.
pub fn group_text(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.chars().any(is_sentence_end) {
        let sentences = split_sentences(trimmed);
        let mut paragraphs = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for sentence in sentences {
            current.push(sentence);
            if current.len() >= SENTENCES_PER_PARAGRAPH
                || current.join(" ").len() > PARAGRAPH_CHAR_LIMIT
            {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        }
        if !current.is_empty() {
            paragraphs.push(current.join(" "));
        }
        paragraphs
    } else {
        let words: Vec<&str> = trimmed.split_whitespace().collect();
        let mut paragraphs: Vec<String> = words
            .chunks(WORDS_PER_PARAGRAPH)
            .map(|chunk| chunk.join(" "))
            .collect();
        if paragraphs.is_empty() {
            paragraphs.push(trimmed.to_string());
        }
        paragraphs
    }
}

/// Split after sentence-ending punctuation followed by whitespace, keeping
/// the punctuation with the preceding sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev_was_end = false;

    for (idx, c) in text.char_indices() {
        if prev_was_end && c.is_whitespace() {
            sentences.push(text[start..idx].trim());
            start = idx;
        }
        prev_was_end = is_sentence_end(c);
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}
