//! Archive store
//!
//! Load-all-into-memory store over a pluggable storage backend. Mutations
//! are optimistic: memory updates first, then the whole archive is
//! rewritten. A failed write leaves the store marked dirty; the next
//! successful mutation persists everything, and callers surface the error
//! to the user in the meantime.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::platform::PlatformCapabilities;

use super::csv::{export_csv, from_csv, to_csv};
use super::record::DEFAULT_CATEGORIES;
use super::{ArchiveError, ArchivedTranscript};

const ARCHIVE_FILE_NAME: &str = "memoscribe-archive.csv";
const CATEGORIES_FILE_NAME: &str = "memoscribe-categories.json";

/// Storage for one named document.
pub trait StorageBackend: Send + Sync {
    /// Read the full document; `None` when it has never been written.
    fn load(&self) -> Result<Option<String>, ArchiveError>;
    /// Replace the full document.
    fn save(&self, contents: &str) -> Result<(), ArchiveError>;
}

/// File-backed storage under the platform data directory.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> Result<Option<String>, ArchiveError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArchiveError::Persistence(format!(
                "read {:?}: {}",
                self.path, e
            ))),
        }
    }

    fn save(&self, contents: &str) -> Result<(), ArchiveError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ArchiveError::Persistence(format!("create {:?}: {}", parent, e))
            })?;
        }
        std::fs::write(&self.path, contents)
            .map_err(|e| ArchiveError::Persistence(format!("write {:?}: {}", self.path, e)))
    }
}

/// In-memory storage for ephemeral hosts and tests.
#[derive(Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> Result<Option<String>, ArchiveError> {
        Ok(self.contents.lock().unwrap().clone())
    }

    fn save(&self, contents: &str) -> Result<(), ArchiveError> {
        *self.contents.lock().unwrap() = Some(contents.to_string());
        Ok(())
    }
}

/// Fields a user may change after archiving. `None` keeps the current
/// value.
#[derive(Debug, Clone, Default)]
pub struct ArchiveUpdate {
    pub title: Option<String>,
    pub category: Option<String>,
    pub is_important: Option<bool>,
}

pub struct ArchiveStore {
    backend: Box<dyn StorageBackend>,
    categories_backend: Box<dyn StorageBackend>,
    /// Newest first.
    transcripts: Vec<ArchivedTranscript>,
    custom_categories: Vec<String>,
    /// Memory and disk diverged after a failed write.
    dirty: bool,
}

impl ArchiveStore {
    /// Open the store appropriate for the host: file-backed on a native
    /// host, purely in-memory otherwise.
    pub fn open(caps: &PlatformCapabilities) -> Result<Self, ArchiveError> {
        match caps.data_dir() {
            Some(dir) => Self::with_backends(
                Box::new(FileBackend::new(dir.join(ARCHIVE_FILE_NAME))),
                Box::new(FileBackend::new(dir.join(CATEGORIES_FILE_NAME))),
            ),
            None => Self::with_backends(
                Box::new(MemoryBackend::new()),
                Box::new(MemoryBackend::new()),
            ),
        }
    }

    /// Open over explicit backends, reading everything into memory.
    pub fn with_backends(
        backend: Box<dyn StorageBackend>,
        categories_backend: Box<dyn StorageBackend>,
    ) -> Result<Self, ArchiveError> {
        let mut transcripts = match backend.load()? {
            Some(csv) => from_csv(&csv),
            None => Vec::new(),
        };
        transcripts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        log::info!("Archive loaded: {} transcripts", transcripts.len());

        let custom_categories = match categories_backend.load()? {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed category list: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        Ok(Self {
            backend,
            categories_backend,
            transcripts,
            custom_categories,
            dirty: false,
        })
    }

    pub fn all(&self) -> &[ArchivedTranscript] {
        &self.transcripts
    }

    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ArchivedTranscript> {
        self.transcripts.iter().find(|t| t.id == id)
    }

    /// Memory and disk are out of sync after a failed write.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Insert a new record at the front (newest first) and persist.
    ///
    /// On a persistence error the in-memory insert stays; the store is
    /// marked dirty and the error is returned for user notification.
    pub fn archive(&mut self, record: ArchivedTranscript) -> Result<(), ArchiveError> {
        self.transcripts.insert(0, record);
        self.persist()
    }

    /// Apply user edits to the mutable fields of a record.
    pub fn update(&mut self, id: &str, update: ArchiveUpdate) -> Result<(), ArchiveError> {
        let Some(record) = self.transcripts.iter_mut().find(|t| t.id == id) else {
            return Err(ArchiveError::Persistence(format!("no record with id {}", id)));
        };
        if let Some(title) = update.title {
            record.title = title;
        }
        if let Some(category) = update.category {
            record.category = category;
        }
        if let Some(important) = update.is_important {
            record.is_important = important;
        }
        self.persist()
    }

    pub fn remove(&mut self, id: &str) -> Result<(), ArchiveError> {
        let before = self.transcripts.len();
        self.transcripts.retain(|t| t.id != id);
        if self.transcripts.len() == before {
            return Err(ArchiveError::Persistence(format!("no record with id {}", id)));
        }
        self.persist()
    }

    /// All category tags: the defaults followed by user-defined ones.
    pub fn categories(&self) -> Vec<String> {
        let mut all: Vec<String> = DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect();
        for custom in &self.custom_categories {
            if !all.iter().any(|c| c == custom) {
                all.push(custom.clone());
            }
        }
        all
    }

    /// Register a user-defined category and persist the list.
    pub fn add_category(&mut self, name: &str) -> Result<(), ArchiveError> {
        let name = name.trim();
        if name.is_empty() || self.categories().iter().any(|c| c == name) {
            return Ok(());
        }
        self.custom_categories.push(name.to_string());
        let json = serde_json::to_string(&self.custom_categories)
            .map_err(|e| ArchiveError::Persistence(e.to_string()))?;
        self.categories_backend.save(&json)
    }

    /// Simplified user-facing CSV of the whole archive.
    pub fn export(&self) -> String {
        export_csv(&self.transcripts)
    }

    fn persist(&mut self) -> Result<(), ArchiveError> {
        let csv = to_csv(&self.transcripts)?;
        match self.backend.save(&csv) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                // Memory keeps the mutation; flag the divergence and let the
                // next successful write reconcile.
                self.dirty = true;
                log::error!("Archive write failed, store marked dirty: {}", e);
                Err(e)
            }
        }
    }
}
