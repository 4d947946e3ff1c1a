//! Transcript assembly
//!
//! Turns the transport's stream of finalized speech events into an ordered,
//! de-duplicated, speaker-aware transcript, with pause/stop commits for
//! in-flight partial text and a derived paragraph view for display.

mod assembler;
mod paragraphs;
mod speakers;

pub use assembler::{CommitBoundary, TranscriptAssembler, TranscriptSegment, TranscriptWord};
pub use paragraphs::{group_segments, group_text};
pub use speakers::{SpeakerInfo, SpeakerRegistry};
