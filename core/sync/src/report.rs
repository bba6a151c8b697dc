//! Per-pass summary.

use serde::{Deserialize, Serialize};
use std::fmt;

use docsync_common::{DocName, Timestamp};

use crate::conflict::Side;
use crate::detector::ChangeClassification;

/// What happened to one pair during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PairOutcome {
    SyncedLocalToRemote,
    SyncedRemoteToLocal,
    Unchanged,
    ConflictResolved { winner: Side },
    /// Both files were gone; the pair was dropped from the registry.
    Removed,
    /// The pass was aborted before this pair was reached.
    Skipped,
    Failed { reason: String },
}

impl PairOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PairOutcome::Failed { .. })
    }
}

impl fmt::Display for PairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairOutcome::SyncedLocalToRemote => f.write_str("synced-local-to-remote"),
            PairOutcome::SyncedRemoteToLocal => f.write_str("synced-remote-to-local"),
            PairOutcome::Unchanged => f.write_str("unchanged"),
            PairOutcome::ConflictResolved { winner } => write!(f, "conflict-resolved({})", winner),
            PairOutcome::Removed => f.write_str("removed"),
            PairOutcome::Skipped => f.write_str("skipped"),
            PairOutcome::Failed { reason } => write!(f, "error({})", reason),
        }
    }
}

/// Result for a single pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairReport {
    pub local_path: DocName,
    pub remote_path: DocName,
    /// Classification the outcome was based on; `None` if detection failed.
    pub classification: Option<ChangeClassification>,
    pub outcome: PairOutcome,
    /// The remote file may have been read mid-replication.
    #[serde(default)]
    pub possibly_incomplete: bool,
}

/// Summary of one sync pass, covering every pair in scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub started_at: Timestamp,
    pub completed_at: Timestamp,
    pub pairs: Vec<PairReport>,
    /// An abort was requested and honoured between pairs.
    pub aborted: bool,
}

impl PassReport {
    pub fn new(started_at: Timestamp) -> Self {
        Self {
            started_at,
            completed_at: started_at,
            pairs: Vec::new(),
            aborted: false,
        }
    }

    /// Look up the report for a document by either side's name.
    pub fn get(&self, name: &DocName) -> Option<&PairReport> {
        self.pairs
            .iter()
            .find(|p| &p.local_path == name || &p.remote_path == name)
    }

    /// Pairs whose content was propagated, conflicts included.
    pub fn synced(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| {
                matches!(
                    p.outcome,
                    PairOutcome::SyncedLocalToRemote
                        | PairOutcome::SyncedRemoteToLocal
                        | PairOutcome::ConflictResolved { .. }
                )
            })
            .count()
    }

    pub fn conflicts(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| matches!(p.outcome, PairOutcome::ConflictResolved { .. }))
            .count()
    }

    pub fn unchanged(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| p.outcome == PairOutcome::Unchanged)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.pairs.iter().filter(|p| p.outcome.is_failure()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}
