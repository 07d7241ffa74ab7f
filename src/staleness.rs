//! Rebuild decisions for derived artifacts.
//!
//! Each artifact name maps to the instant it was last built. The timestamps
//! drive staleness only; they never affect artifact content.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::SyncError;
use crate::transport::fs::{read_json, write_json_atomic};
use crate::types::ArtifactName;

/// Decide whether an artifact with recorded build time `recorded` must be rebuilt.
///
/// Missing artifact or missing record always rebuilds. With a cutoff, a record
/// strictly before it rebuilds. Without a cutoff, any record is fresh.
pub fn needs_rebuild(
    artifact_exists: bool,
    recorded: Option<DateTime<Utc>>,
    cutoff: Option<DateTime<Utc>>,
) -> bool {
    if !artifact_exists {
        return true;
    }
    let Some(recorded) = recorded else {
        return true;
    };
    match cutoff {
        Some(cutoff) => recorded < cutoff,
        None => false,
    }
}

/// Persisted map of artifact name to last build time, plus the caller's cutoff.
#[derive(Debug)]
pub struct BuildTimestamps {
    path: PathBuf,
    cutoff: Option<DateTime<Utc>>,
    entries: BTreeMap<ArtifactName, DateTime<Utc>>,
}

impl BuildTimestamps {
    /// Load the map stored at `path` (empty when absent).
    pub fn load(path: impl Into<PathBuf>, cutoff: Option<DateTime<Utc>>) -> Result<Self, SyncError> {
        let path = path.into();
        let entries = read_json(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            cutoff,
            entries,
        })
    }

    /// Recorded build time for `name`.
    pub fn recorded(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries.get(name).copied()
    }

    /// True when the artifact at `artifact` (recorded as `name`) must be rebuilt.
    pub fn check_overwrite(&self, artifact: &Path, name: &str) -> bool {
        let rebuild = needs_rebuild(artifact.exists(), self.recorded(name), self.cutoff);
        debug!(
            "[spending_sync:staleness] {} rebuild={} recorded={:?} cutoff={:?}",
            name,
            rebuild,
            self.recorded(name),
            self.cutoff
        );
        rebuild
    }

    /// Record a successful rebuild of `name` at `now` and persist the map.
    pub fn record_build(&mut self, name: &str, now: DateTime<Utc>) -> Result<(), SyncError> {
        self.entries.insert(name.to_string(), now);
        write_json_atomic(&self.path, &self.entries)
    }

    /// Drop the record for `name` and persist the map.
    pub fn forget(&mut self, name: &str) -> Result<(), SyncError> {
        if self.entries.remove(name).is_none() {
            return Ok(());
        }
        write_json_atomic(&self.path, &self.entries)
    }
}
