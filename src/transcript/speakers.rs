//! Per-session speaker naming
//!
//! Diarization ids from the service are opaque ("speaker_0", ...). The
//! registry assigns each one a stable, deterministic display name for the
//! lifetime of a recording session. State lives in this object, owned by
//! the session; `reset()` runs at every session start so names never bleed
//! across recordings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const ADJECTIVES: [&str; 16] = [
    "Sparkly", "Cosmic", "Fuzzy", "Wobbly", "Snazzy", "Zippy", "Glittery", "Bouncy", "Toasty",
    "Squishy", "Dapper", "Peppy", "Mellow", "Twinkly", "Swooshy", "Wiggly",
];

const ANIMALS: [&str; 16] = [
    "Axolotl", "Quokka", "Narwhal", "Pangolin", "Tardigrade", "Blobfish", "Platypus", "Wombat",
    "Fennec", "Tapir", "Okapi", "Manatee", "Kiwi", "Puffin", "Chinchilla", "Gecko",
];

/// A speaker as stored alongside an archived transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerInfo {
    pub id: String,
    pub name: String,
}

/// Deterministic whimsical name for a speaker id. The same id and index
/// always produce the same name.
fn whimsical_name(speaker_id: &str, index: usize) -> String {
    let mut hash: i32 = 0;
    for b in speaker_id.bytes() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(b as i32);
    }
    let adj = (hash.wrapping_add(index as i32)).unsigned_abs() as usize % ADJECTIVES.len();
    let animal = (hash.wrapping_mul(7).wrapping_add(index as i32 * 3)).unsigned_abs() as usize
        % ANIMALS.len();
    format!("{} {}", ADJECTIVES[adj], ANIMALS[animal])
}

/// Session-scoped speaker name cache.
#[derive(Debug, Default)]
pub struct SpeakerRegistry {
    names: HashMap<String, String>,
    /// Ids in first-seen order.
    order: Vec<String>,
}

impl SpeakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name for a speaker id, assigning one on first sight.
    pub fn name_of(&mut self, speaker_id: &str) -> String {
        if let Some(name) = self.names.get(speaker_id) {
            return name.clone();
        }
        let name = whimsical_name(speaker_id, self.order.len());
        self.names.insert(speaker_id.to_string(), name.clone());
        self.order.push(speaker_id.to_string());
        name
    }

    /// All known speakers in first-seen order.
    pub fn known(&self) -> Vec<SpeakerInfo> {
        self.order
            .iter()
            .map(|id| SpeakerInfo {
                id: id.clone(),
                name: self.names[id].clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Forget everything. Called at the start of each recording session.
    pub fn reset(&mut self) {
        self.names.clear();
        self.order.clear();
    }
}
