//! The incremental cache: maps a node's fingerprint to the result it produced.
//!
//! Entries are keyed by node name and fingerprint together, so a stale entry
//! can never answer for a node whose inputs have changed: the changed inputs
//! produce a different key.

use crate::db;
use crate::error::Result;
use crate::hash::Fingerprint;
use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::path::Path;
use std::sync::Arc;

/// The result of executing a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    /// Opaque reference to what the node produced, e.g. an output path.
    pub artifact: Option<String>,
    pub error: Option<String>,
}

impl Outcome {
    pub fn succeeded() -> Self {
        Outcome {
            success: true,
            artifact: None,
            error: None,
        }
    }

    pub fn with_artifact(artifact: impl Into<String>) -> Self {
        Outcome {
            artifact: Some(artifact.into()),
            ..Outcome::succeeded()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Outcome {
            success: false,
            artifact: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    node: String,
    fingerprint: Fingerprint,
}

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Safe to share between workers: lookups and records from different
/// threads only contend when they land on the same shard.
#[derive(Default)]
pub struct Cache {
    entries: DashMap<CacheKey, Arc<Outcome>, FxBuildHasher>,
}

impl Cache {
    pub fn new() -> Self {
        Cache::default()
    }

    /// Returns the recorded result for this node at this fingerprint, if it
    /// succeeded.  Failed results are never hits.
    pub fn lookup(&self, node: &str, fingerprint: Fingerprint) -> Option<Arc<Outcome>> {
        let key = CacheKey {
            node: node.to_owned(),
            fingerprint,
        };
        self.entries
            .get(&key)
            .filter(|entry| entry.success)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Records a result, replacing any earlier one for the same key.
    pub fn record(&self, node: &str, fingerprint: Fingerprint, outcome: Arc<Outcome>) {
        let key = CacheKey {
            node: node.to_owned(),
            fingerprint,
        };
        self.entries.insert(key, outcome);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Persists successful entries to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        db::save(self, path.as_ref())
    }

    /// Loads a cache saved by `save`; a missing file gives an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Result<Cache> {
        db::load(path.as_ref())
    }

    /// Successful entries, sorted by node name then fingerprint.
    pub(crate) fn successes(&self) -> Vec<(String, Fingerprint, Arc<Outcome>)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.value().success)
            .map(|entry| {
                let key = entry.key();
                (key.node.clone(), key.fingerprint, Arc::clone(entry.value()))
            })
            .collect();
        out.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        out
    }
}
