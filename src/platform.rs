//! Host-capability selection
//!
//! The surrounding application decides once, at startup, what the host can
//! do (durable data directory, clipboard) and passes the result down.
//! Components never sniff the runtime environment themselves.

use std::path::PathBuf;

const DATA_DIR_NAME: &str = "memoscribe";

/// Capabilities of the host the application was started on.
///
/// `NativeHost` gets a durable data directory and clipboard access;
/// `Ephemeral` keeps everything in memory (used for tests and for running
/// without a writable home directory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCapabilities {
    NativeHost {
        /// Directory for the archive CSV and category list.
        data_dir: PathBuf,
        clipboard: bool,
    },
    Ephemeral,
}

impl PlatformCapabilities {
    /// Detect capabilities once at startup.
    pub fn detect() -> Self {
        match dirs::data_dir() {
            Some(base) => PlatformCapabilities::NativeHost {
                data_dir: base.join(DATA_DIR_NAME),
                clipboard: true,
            },
            None => {
                log::warn!("No data directory available, running ephemeral");
                PlatformCapabilities::Ephemeral
            }
        }
    }

    pub fn data_dir(&self) -> Option<&PathBuf> {
        match self {
            PlatformCapabilities::NativeHost { data_dir, .. } => Some(data_dir),
            PlatformCapabilities::Ephemeral => None,
        }
    }

    pub fn has_clipboard(&self) -> bool {
        matches!(
            self,
            PlatformCapabilities::NativeHost {
                clipboard: true,
                ..
            }
        )
    }
}
