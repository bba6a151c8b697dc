//! Conflict resolution for pairs edited on both sides.

use serde::{Deserialize, Serialize};
use std::fmt;

use docsync_common::{Error, Result, Timestamp};

use crate::detector::{ChangeClassification, Detection};

/// Side of a tracked pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}

/// Conflict resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Newer modification time wins; exact ties go to local.
    #[default]
    LastWriteWins,
    /// Local always overwrites remote.
    PreferLocal,
    /// Remote always overwrites local.
    PreferRemote,
}

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Side whose content is propagated.
    pub winner: Side,
    pub local_modified: Timestamp,
    pub remote_modified: Timestamp,
}

impl Resolution {
    pub fn loser(&self) -> Side {
        match self.winner {
            Side::Local => Side::Remote,
            Side::Remote => Side::Local,
        }
    }
}

/// Picks the winning side of a pair modified on both sides.
///
/// The losing side is overwritten by the caller after conversion and no
/// copy of it is kept. Callers that need the losing edit must archive it
/// before resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    /// Create a new conflict resolver with the given strategy.
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Compare absolute modification times; strictly later wins, a tie
    /// goes to local.
    pub fn last_write_wins(local_modified: Timestamp, remote_modified: Timestamp) -> Side {
        if remote_modified > local_modified {
            Side::Remote
        } else {
            Side::Local
        }
    }

    /// Resolve a `BothModified` detection.
    ///
    /// # Errors
    /// - `InvalidInput` for any other classification, or if a timestamp is
    ///   missing
    pub fn resolve(&self, detection: &Detection) -> Result<Resolution> {
        if detection.classification != ChangeClassification::BothModified {
            return Err(Error::InvalidInput(format!(
                "{} is {}, not in conflict",
                detection.local_path, detection.classification
            )));
        }
        let (Some(local_modified), Some(remote_modified)) =
            (detection.local_modified, detection.remote_modified)
        else {
            return Err(Error::InvalidInput(format!(
                "{} is missing a timestamp",
                detection.local_path
            )));
        };

        let winner = match self.strategy {
            ConflictStrategy::LastWriteWins => {
                Self::last_write_wins(local_modified, remote_modified)
            }
            ConflictStrategy::PreferLocal => Side::Local,
            ConflictStrategy::PreferRemote => Side::Remote,
        };

        Ok(Resolution {
            winner,
            local_modified,
            remote_modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use docsync_common::DocName;

    fn ts(secs: i64, nanos: u32) -> Timestamp {
        Utc.timestamp_opt(secs, nanos).unwrap()
    }

    fn conflict(local: Timestamp, remote: Timestamp) -> Detection {
        Detection {
            local_path: DocName::parse("notes.md").unwrap(),
            remote_path: DocName::parse("notes.docx").unwrap(),
            classification: ChangeClassification::BothModified,
            local_modified: Some(local),
            remote_modified: Some(remote),
            stale: false,
            possibly_incomplete: false,
        }
    }

    #[test]
    fn test_newer_side_wins() {
        let resolver = ConflictResolver::default();
        let local_newer = resolver.resolve(&conflict(ts(200, 0), ts(100, 0))).unwrap();
        assert_eq!(local_newer.winner, Side::Local);
        assert_eq!(local_newer.loser(), Side::Remote);

        let remote_newer = resolver.resolve(&conflict(ts(100, 0), ts(100, 1))).unwrap();
        assert_eq!(remote_newer.winner, Side::Remote);
    }

    #[test]
    fn test_tie_goes_to_local_every_time() {
        let resolver = ConflictResolver::default();
        let tied = conflict(ts(500, 42), ts(500, 42));
        for _ in 0..10 {
            assert_eq!(resolver.resolve(&tied).unwrap().winner, Side::Local);
        }
    }

    #[test]
    fn test_fixed_strategies() {
        let detection = conflict(ts(100, 0), ts(200, 0));
        assert_eq!(
            ConflictResolver::new(ConflictStrategy::PreferLocal)
                .resolve(&detection)
                .unwrap()
                .winner,
            Side::Local
        );
        assert_eq!(
            ConflictResolver::new(ConflictStrategy::PreferRemote)
                .resolve(&conflict(ts(300, 0), ts(200, 0)))
                .unwrap()
                .winner,
            Side::Remote
        );
    }

    #[test]
    fn test_rejects_non_conflicts() {
        let mut detection = conflict(ts(1, 0), ts(1, 0));
        detection.classification = ChangeClassification::LocalModified;
        let err = ConflictResolver::default().resolve(&detection).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
