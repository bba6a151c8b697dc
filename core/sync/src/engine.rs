//! Sync orchestrator driving one pass over every tracked pair.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tracing::{debug, info, warn};

use docsync_common::{DocFormat, DocName, Error, Result};
use docsync_convert::Converter;
use docsync_storage::DocumentRoot;

use crate::conflict::{ConflictResolver, ConflictStrategy, Side};
use crate::detector::{in_scope, ChangeClassification, ChangeDetector, Detection};
use crate::registry::{Registry, SyncDirection, TrackedPair};
use crate::report::{PairOutcome, PairReport, PassReport};

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Remote files modified within this many seconds of the pass start are
    /// reported as possibly still replicating.
    pub settle_window_secs: u64,
    /// Conflict resolution strategy.
    pub conflict_strategy: ConflictStrategy,
    /// Start tracking remote documents that have no local counterpart and
    /// convert them into the local root.
    #[serde(default)]
    pub import_remote: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            settle_window_secs: 2,
            conflict_strategy: ConflictStrategy::LastWriteWins,
            import_remote: false,
        }
    }
}

/// Parameters for starting to track a pair of roots.
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub local_root: PathBuf,
    pub remote_root: PathBuf,
    pub local_format: DocFormat,
    pub remote_format: DocFormat,
    /// Replace an existing registry.
    pub force: bool,
}

impl InitOptions {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: impl Into<PathBuf>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            local_format: DocFormat::Markdown,
            remote_format: DocFormat::Docx,
            force: false,
        }
    }
}

/// Cooperative abort flag, honoured only between pairs.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Roots {
    local: DocumentRoot,
    remote: DocumentRoot,
    local_format: DocFormat,
    remote_format: DocFormat,
}

/// A pair queued for processing, with its detection or the error that
/// prevented it.
struct Pending {
    local_path: DocName,
    remote_path: DocName,
    detection: Result<Detection>,
}

/// Main sync engine.
///
/// Processes pairs one at a time. The registry passed into a pass is the
/// only live copy; it is returned afterwards for the caller to persist.
pub struct SyncEngine<C: Converter + ?Sized> {
    converter: Arc<C>,
    detector: ChangeDetector,
    resolver: ConflictResolver,
    options: SyncOptions,
    abort: AbortHandle,
}

impl<C: Converter + 'static> SyncEngine<C> {
    /// Create a new sync engine.
    pub fn new(converter: C, options: SyncOptions) -> Self {
        Self::from_arc(Arc::new(converter), options)
    }
}

impl<C: Converter + ?Sized> SyncEngine<C> {
    /// Create a new sync engine from an Arc-wrapped converter.
    pub fn from_arc(converter: Arc<C>, options: SyncOptions) -> Self {
        // Capped at a day so subtracting it from "now" cannot overflow.
        let settle = chrono::Duration::seconds(options.settle_window_secs.min(86_400) as i64);
        Self {
            converter,
            detector: ChangeDetector::new(settle).with_remote_import(options.import_remote),
            resolver: ConflictResolver::new(options.conflict_strategy),
            options,
            abort: AbortHandle::default(),
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Handle for requesting an abort at the next pair boundary.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Start tracking between a local root and a remote root.
    ///
    /// # Errors
    /// - `MissingRoot` if either directory is absent
    /// - `AlreadyInitialized` if a registry exists and `force` is not set
    pub async fn initialize(&self, registry_path: &Path, init: &InitOptions) -> Result<Registry> {
        DocumentRoot::open(&init.local_root).await?;
        DocumentRoot::open(&init.remote_root).await?;

        if !init.force && fs::try_exists(registry_path).await? {
            return Err(Error::AlreadyInitialized(registry_path.to_path_buf()));
        }

        let registry = Registry::new(
            &init.local_root,
            &init.remote_root,
            init.local_format,
            init.remote_format,
        );
        registry.save(registry_path).await?;
        info!(
            "Tracking {} ({}) <-> {} ({})",
            init.local_root.display(),
            init.local_format,
            init.remote_root.display(),
            init.remote_format
        );
        Ok(registry)
    }

    /// Classify everything in scope without acting on it.
    pub async fn plan(&self, registry: &Registry, scope: Option<&DocName>) -> Result<Vec<Detection>> {
        let roots = Self::open_roots(registry).await?;
        self.detector
            .detect_all(registry, &roots.local, &roots.remote, scope, Utc::now())
            .await
    }

    /// Load the registry, run one pass, and persist the registry once.
    ///
    /// # Errors
    /// - `NotInitialized` if no registry exists at `registry_path`
    /// - Any structural error from [`SyncEngine::run_pass`]; the persisted
    ///   registry is left untouched
    pub async fn sync(&self, registry_path: &Path, scope: Option<&DocName>) -> Result<PassReport> {
        let registry = Registry::load(registry_path)
            .await?
            .ok_or_else(|| Error::NotInitialized(registry_path.to_path_buf()))?;

        let (registry, report) = self.run_pass(registry, scope).await?;
        registry.save(registry_path).await?;
        Ok(report)
    }

    /// Run one pass over `registry`, returning the updated registry and the
    /// per-pair report. Nothing is persisted here.
    ///
    /// `last_synced_at` is set to the pass completion time only if a pair
    /// was added, updated or dropped, so a no-op pass leaves the registry
    /// unchanged.
    ///
    /// # Errors
    /// - `MissingRoot` before any pair is touched
    /// - I/O errors while listing either root; errors inspecting a single
    ///   document are reported on its row instead
    pub async fn run_pass(
        &self,
        registry: Registry,
        scope: Option<&DocName>,
    ) -> Result<(Registry, PassReport)> {
        let start = Instant::now();
        let started_at = Utc::now();
        let roots = Self::open_roots(&registry).await?;

        info!(
            "Starting sync pass over {} tracked pairs{}",
            registry.len(),
            scope.map(|s| format!(" (scope: {})", s)).unwrap_or_default()
        );

        let queue = self.collect(&registry, &roots, scope, started_at).await?;

        let before = registry.pairs().to_vec();
        let mut work = registry;
        let mut report = PassReport::new(started_at);

        for pending in queue {
            if report.aborted || self.abort.is_aborted() {
                if !report.aborted {
                    warn!("Abort requested; stopping before {}", pending.local_path);
                }
                report.aborted = true;
                report.pairs.push(PairReport {
                    local_path: pending.local_path,
                    remote_path: pending.remote_path,
                    classification: None,
                    outcome: PairOutcome::Skipped,
                    possibly_incomplete: false,
                });
                continue;
            }

            let pair_report = match pending.detection {
                Ok(detection) => self.process(&mut work, &roots, detection).await,
                Err(e) => {
                    warn!("Could not inspect {}: {}", pending.local_path, e);
                    PairReport {
                        local_path: pending.local_path,
                        remote_path: pending.remote_path,
                        classification: None,
                        outcome: PairOutcome::Failed {
                            reason: e.to_string(),
                        },
                        possibly_incomplete: false,
                    }
                }
            };
            report.pairs.push(pair_report);
        }

        report.completed_at = Utc::now();
        if work.pairs() != before.as_slice() {
            work.last_synced_at = Some(report.completed_at);
        }
        info!(
            "Sync pass completed in {:?}: {} synced, {} unchanged, {} conflicts, {} failed",
            start.elapsed(),
            report.synced(),
            report.unchanged(),
            report.conflicts(),
            report.failed()
        );

        Ok((work, report))
    }

    async fn open_roots(registry: &Registry) -> Result<Roots> {
        Ok(Roots {
            local: DocumentRoot::open(&registry.local_root).await?,
            remote: DocumentRoot::open(&registry.remote_root).await?,
            local_format: registry.local_format,
            remote_format: registry.remote_format,
        })
    }

    /// Classify tracked pairs and discover untracked documents up front.
    async fn collect(
        &self,
        registry: &Registry,
        roots: &Roots,
        scope: Option<&DocName>,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<Pending>> {
        let mut queue = Vec::new();

        for pair in registry.pairs().iter().filter(|p| in_scope(p, scope)) {
            queue.push(Pending {
                local_path: pair.local_path.clone(),
                remote_path: pair.remote_path.clone(),
                detection: self
                    .detector
                    .detect_pair(pair, &roots.local, &roots.remote, now)
                    .await,
            });
        }

        let untracked = self
            .detector
            .discover_untracked(registry, &roots.local, &roots.remote, scope)
            .await?;
        for candidate in untracked {
            let detection = self
                .detector
                .detect_untracked(&candidate, &roots.local, &roots.remote, now)
                .await;
            queue.push(Pending {
                local_path: candidate.local_path,
                remote_path: candidate.remote_path,
                detection,
            });
        }

        Ok(queue)
    }

    async fn process(&self, work: &mut Registry, roots: &Roots, detection: Detection) -> PairReport {
        let outcome = match self.apply(work, roots, &detection).await {
            Ok(outcome) => {
                match &outcome {
                    PairOutcome::Unchanged => debug!("{}: unchanged", detection.local_path),
                    other => info!("{}: {}", detection.local_path, other),
                }
                outcome
            }
            Err(e) => {
                warn!("{} left unresolved: {}", detection.local_path, e);
                PairOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        PairReport {
            local_path: detection.local_path,
            remote_path: detection.remote_path,
            classification: Some(detection.classification),
            outcome,
            possibly_incomplete: detection.possibly_incomplete,
        }
    }

    async fn apply(
        &self,
        work: &mut Registry,
        roots: &Roots,
        detection: &Detection,
    ) -> Result<PairOutcome> {
        match detection.classification {
            ChangeClassification::Unchanged if detection.stale => {
                work.remove_pair(&detection.local_path);
                info!(
                    "{} and {} are both gone; dropping pair",
                    detection.local_path, detection.remote_path
                );
                Ok(PairOutcome::Removed)
            }
            ChangeClassification::Unchanged => {
                Self::refresh(work, detection)?;
                Ok(PairOutcome::Unchanged)
            }
            ChangeClassification::LocalModified
            | ChangeClassification::RemoteMissing
            | ChangeClassification::NewUntrackedLocal => {
                self.propagate(work, roots, detection, Side::Local).await?;
                Ok(PairOutcome::SyncedLocalToRemote)
            }
            ChangeClassification::RemoteModified
            | ChangeClassification::LocalMissing
            | ChangeClassification::NewUntrackedRemote => {
                self.propagate(work, roots, detection, Side::Remote).await?;
                Ok(PairOutcome::SyncedRemoteToLocal)
            }
            ChangeClassification::BothModified => {
                let resolution = self.resolver.resolve(detection)?;
                info!(
                    "{} edited on both sides; {} wins, {} edit will be overwritten",
                    detection.local_path,
                    resolution.winner,
                    resolution.loser()
                );
                self.propagate(work, roots, detection, resolution.winner)
                    .await?;
                Ok(PairOutcome::ConflictResolved {
                    winner: resolution.winner,
                })
            }
        }
    }

    /// Store the observed timestamps of an unchanged pair.
    fn refresh(work: &mut Registry, detection: &Detection) -> Result<()> {
        let (Some(local), Some(remote)) = (detection.local_modified, detection.remote_modified)
        else {
            return Ok(());
        };
        if let Some(mut pair) = work.find_by_local(&detection.local_path).cloned() {
            pair.last_synced_local = local;
            pair.last_synced_remote = remote;
            work.upsert_pair(pair)?;
        }
        Ok(())
    }

    /// Convert the `source` side over the other side and record the pair.
    ///
    /// The converter writes into a hidden staging file beside the target,
    /// which is renamed into place only after conversion succeeds.
    async fn propagate(
        &self,
        work: &mut Registry,
        roots: &Roots,
        detection: &Detection,
        source: Side,
    ) -> Result<()> {
        work.check_collision(&detection.local_path, &detection.remote_path)?;

        let (src_root, src_name, src_format, dst_root, dst_name, dst_format, direction) =
            match source {
                Side::Local => (
                    &roots.local,
                    &detection.local_path,
                    roots.local_format,
                    &roots.remote,
                    &detection.remote_path,
                    roots.remote_format,
                    SyncDirection::LocalToRemote,
                ),
                Side::Remote => (
                    &roots.remote,
                    &detection.remote_path,
                    roots.remote_format,
                    &roots.local,
                    &detection.local_path,
                    roots.local_format,
                    SyncDirection::RemoteToLocal,
                ),
            };

        let staged = dst_root.staging_path(dst_name);
        let converted = self
            .converter
            .convert(&src_root.path_of(src_name), src_format, dst_format, &staged)
            .await;
        let committed = match converted {
            Ok(output) => dst_root.commit_staged(&output, dst_name).await,
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            dst_root.discard_staged(&staged).await;
            return Err(e);
        }

        let local_modified = roots
            .local
            .modified(&detection.local_path)
            .await?
            .ok_or_else(|| Error::NotFound(detection.local_path.to_string()))?;
        let remote_modified = roots
            .remote
            .modified(&detection.remote_path)
            .await?
            .ok_or_else(|| Error::NotFound(detection.remote_path.to_string()))?;

        work.upsert_pair(TrackedPair::new(
            detection.local_path.clone(),
            detection.remote_path.clone(),
            local_modified,
            remote_modified,
            direction,
        ))
    }
}
