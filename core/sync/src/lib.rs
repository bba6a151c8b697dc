//! docsync sync engine
//!
//! This module keeps a flat directory of local documents convergent with a
//! mirrored directory of converted documents:
//! - Registry of tracked pairs, persisted atomically once per pass
//! - Change detection by modification time
//! - Last-write-wins conflict resolution
//! - A sequential orchestrator that converts, writes and records each pair

pub mod conflict;
pub mod detector;
pub mod engine;
pub mod registry;
pub mod report;

// Re-export main types
pub use conflict::{ConflictResolver, ConflictStrategy, Resolution, Side};
pub use detector::{classify, ChangeClassification, ChangeDetector, Detection, Untracked};
pub use engine::{AbortHandle, InitOptions, SyncEngine, SyncOptions};
pub use registry::{
    Registry, SyncDirection, TrackedPair, LOCK_FILE_NAME, REGISTRY_FILE_NAME, SCHEMA_VERSION,
};
pub use report::{PairOutcome, PairReport, PassReport};
