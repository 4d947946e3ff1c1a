//! Transcript archive
//!
//! Finalized recordings persist as rows of a CSV file under the
//! application data directory. The whole archive is read into memory at
//! startup and treated as the source of truth; every mutation rewrites the
//! file in full. Archive sizes are small enough that delta writes are not
//! worth their complexity.

mod csv;
mod record;
mod store;

pub use csv::{export_csv, from_csv, to_csv};
pub use record::{ArchivedTranscript, DEFAULT_CATEGORIES};
pub use store::{ArchiveStore, ArchiveUpdate, FileBackend, MemoryBackend, StorageBackend};

/// Errors from archive persistence and parsing.
#[derive(Debug, Clone)]
pub enum ArchiveError {
    /// Reading or writing the backing store failed.
    Persistence(String),
    /// A persisted record could not be understood.
    Parse(String),
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::Persistence(e) => write!(f, "Archive persistence failed: {}", e),
            ArchiveError::Parse(e) => write!(f, "Malformed archive record: {}", e),
        }
    }
}

impl std::error::Error for ArchiveError {}
