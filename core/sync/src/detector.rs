//! Change detection by modification time.
//!
//! A pair's files are compared against the timestamps stored at its last
//! successful sync. Content is never read, so touching a file without
//! editing it counts as a modification, and an edit that lands within the
//! filesystem's timestamp resolution of the last sync goes unnoticed.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

use docsync_common::{DocName, Result, Timestamp};
use docsync_storage::DocumentRoot;

use crate::conflict::Side;
use crate::registry::{Registry, TrackedPair};

/// What changed for a pair since its last successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClassification {
    Unchanged,
    LocalModified,
    RemoteModified,
    BothModified,
    LocalMissing,
    RemoteMissing,
    NewUntrackedLocal,
    /// Remote document with no pair and no local counterpart; only
    /// discovered when remote import is enabled.
    NewUntrackedRemote,
}

impl fmt::Display for ChangeClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeClassification::Unchanged => "unchanged",
            ChangeClassification::LocalModified => "local-modified",
            ChangeClassification::RemoteModified => "remote-modified",
            ChangeClassification::BothModified => "both-modified",
            ChangeClassification::LocalMissing => "local-missing",
            ChangeClassification::RemoteMissing => "remote-missing",
            ChangeClassification::NewUntrackedLocal => "new-untracked-local",
            ChangeClassification::NewUntrackedRemote => "new-untracked-remote",
        };
        f.write_str(s)
    }
}

/// Classify a tracked pair from its current and last-synced timestamps.
///
/// Returns the classification and whether the pair is stale (both files
/// gone).
pub fn classify(
    local_now: Option<Timestamp>,
    remote_now: Option<Timestamp>,
    pair: &TrackedPair,
) -> (ChangeClassification, bool) {
    match (local_now, remote_now) {
        (None, None) => (ChangeClassification::Unchanged, true),
        (None, Some(_)) => (ChangeClassification::LocalMissing, false),
        (Some(_), None) => (ChangeClassification::RemoteMissing, false),
        (Some(local), Some(remote)) => {
            let local_modified = local > pair.last_synced_local;
            let remote_modified = remote > pair.last_synced_remote;
            let classification = match (local_modified, remote_modified) {
                (false, false) => ChangeClassification::Unchanged,
                (true, false) => ChangeClassification::LocalModified,
                (false, true) => ChangeClassification::RemoteModified,
                (true, true) => ChangeClassification::BothModified,
            };
            (classification, false)
        }
    }
}

/// Classification of one pair, with the timestamps it was based on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub local_path: DocName,
    pub remote_path: DocName,
    pub classification: ChangeClassification,
    /// Local modification time when inspected; `None` if absent.
    pub local_modified: Option<Timestamp>,
    /// Remote modification time when inspected; `None` if absent.
    pub remote_modified: Option<Timestamp>,
    /// Both files are gone; the pair should be dropped.
    pub stale: bool,
    /// The remote file changed so recently that the external client may
    /// still be writing it.
    pub possibly_incomplete: bool,
}

/// A document with no tracked pair, named on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Untracked {
    pub local_path: DocName,
    pub remote_path: DocName,
    /// Side the document was found on.
    pub origin: Side,
}

impl Untracked {
    fn in_scope(&self, scope: Option<&DocName>) -> bool {
        scope.map_or(true, |s| s == &self.local_path || s == &self.remote_path)
    }
}

/// Compares file timestamps against the registry.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    settle_window: Duration,
    import_remote: bool,
}

impl ChangeDetector {
    /// Create a detector that flags remote files modified within
    /// `settle_window` of the inspection time.
    pub fn new(settle_window: Duration) -> Self {
        Self {
            settle_window,
            import_remote: false,
        }
    }

    /// Also discover remote documents that have no local counterpart.
    pub fn with_remote_import(mut self, enabled: bool) -> Self {
        self.import_remote = enabled;
        self
    }

    /// Classify one tracked pair.
    ///
    /// Missing files are classifications, not errors.
    pub async fn detect_pair(
        &self,
        pair: &TrackedPair,
        local: &DocumentRoot,
        remote: &DocumentRoot,
        now: Timestamp,
    ) -> Result<Detection> {
        let local_modified = local.modified(&pair.local_path).await?;
        let remote_modified = remote.modified(&pair.remote_path).await?;
        let (classification, stale) = classify(local_modified, remote_modified, pair);

        let detection = Detection {
            local_path: pair.local_path.clone(),
            remote_path: pair.remote_path.clone(),
            classification,
            local_modified,
            remote_modified,
            stale,
            possibly_incomplete: self.is_settling(remote_modified, now),
        };
        self.log(&detection);
        Ok(detection)
    }

    /// List documents in scope that have no tracked pair.
    ///
    /// Local documents of the registry's local format come first. With
    /// remote import enabled, remote documents of the remote format whose
    /// local counterpart does not exist follow. Each list is sorted.
    ///
    /// # Errors
    /// - I/O errors while listing either root
    pub async fn discover_untracked(
        &self,
        registry: &Registry,
        local: &DocumentRoot,
        remote: &DocumentRoot,
        scope: Option<&DocName>,
    ) -> Result<Vec<Untracked>> {
        let local_names = local.list_documents(registry.local_format).await?;
        let mut found: Vec<Untracked> = local_names
            .iter()
            .filter(|name| registry.find_by_local(name).is_none())
            .map(|name| Untracked {
                local_path: name.clone(),
                remote_path: registry.remote_name_for(name),
                origin: Side::Local,
            })
            .collect();

        if self.import_remote {
            let claimed: HashSet<DocName> = found.iter().map(|u| u.remote_path.clone()).collect();
            for name in remote.list_documents(registry.remote_format).await? {
                if registry.find_by_remote(&name).is_some() || claimed.contains(&name) {
                    continue;
                }
                let local_path = registry.local_name_for(&name);
                if local_names.contains(&local_path) {
                    continue;
                }
                found.push(Untracked {
                    local_path,
                    remote_path: name,
                    origin: Side::Remote,
                });
            }
        }

        found.retain(|u| u.in_scope(scope));
        Ok(found)
    }

    /// Inspect one untracked document.
    pub async fn detect_untracked(
        &self,
        untracked: &Untracked,
        local: &DocumentRoot,
        remote: &DocumentRoot,
        now: Timestamp,
    ) -> Result<Detection> {
        let local_modified = local.modified(&untracked.local_path).await?;
        let remote_modified = remote.modified(&untracked.remote_path).await?;
        let classification = match untracked.origin {
            Side::Local => ChangeClassification::NewUntrackedLocal,
            Side::Remote => ChangeClassification::NewUntrackedRemote,
        };

        let detection = Detection {
            local_path: untracked.local_path.clone(),
            remote_path: untracked.remote_path.clone(),
            classification,
            local_modified,
            remote_modified,
            stale: false,
            possibly_incomplete: self.is_settling(remote_modified, now),
        };
        self.log(&detection);
        Ok(detection)
    }

    /// Classify every tracked pair in scope, then every untracked document
    /// in scope.
    pub async fn detect_all(
        &self,
        registry: &Registry,
        local: &DocumentRoot,
        remote: &DocumentRoot,
        scope: Option<&DocName>,
        now: Timestamp,
    ) -> Result<Vec<Detection>> {
        let mut detections = Vec::new();
        for pair in registry.pairs().iter().filter(|p| in_scope(p, scope)) {
            detections.push(self.detect_pair(pair, local, remote, now).await?);
        }
        for untracked in self
            .discover_untracked(registry, local, remote, scope)
            .await?
        {
            detections.push(self.detect_untracked(&untracked, local, remote, now).await?);
        }
        Ok(detections)
    }

    fn is_settling(&self, remote_modified: Option<Timestamp>, now: Timestamp) -> bool {
        remote_modified.is_some_and(|t| t > now - self.settle_window)
    }

    fn log(&self, detection: &Detection) {
        debug!(
            "{} <-> {}: {}",
            detection.local_path, detection.remote_path, detection.classification
        );
        if detection.possibly_incomplete {
            warn!(
                "{} was modified moments ago and may still be replicating; reading it as final",
                detection.remote_path
            );
        }
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(Duration::seconds(2))
    }
}

/// Whether a pair is selected by an optional single-document scope.
pub fn in_scope(pair: &TrackedPair, scope: Option<&DocName>) -> bool {
    match scope {
        None => true,
        Some(name) => &pair.local_path == name || &pair.remote_path == name,
    }
}
