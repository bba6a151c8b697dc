//! Tracked pair registry and its persistence.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use docsync_common::{DocFormat, DocName, Error, Result, Timestamp};
use docsync_storage::replace_file;

/// Current registry schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// File name of the registry inside the local root.
pub const REGISTRY_FILE_NAME: &str = ".docsync.json";

/// File name of the lock guarding the registry during a pass.
pub const LOCK_FILE_NAME: &str = ".docsync.lock";

/// Last action taken for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    LocalToRemote,
    RemoteToLocal,
    #[default]
    None,
}

/// One local document and its mirrored remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPair {
    /// Local document name; identity key.
    pub local_path: DocName,
    /// Remote document name.
    pub remote_path: DocName,
    /// Local modification time as of the last successful sync.
    pub last_synced_local: Timestamp,
    /// Remote modification time as of the last successful sync.
    pub last_synced_remote: Timestamp,
    /// Last action taken, for diagnostics.
    #[serde(default)]
    pub last_sync_direction: SyncDirection,
}

impl TrackedPair {
    pub fn new(
        local_path: DocName,
        remote_path: DocName,
        last_synced_local: Timestamp,
        last_synced_remote: Timestamp,
        last_sync_direction: SyncDirection,
    ) -> Self {
        Self {
            local_path,
            remote_path,
            last_synced_local,
            last_synced_remote,
            last_sync_direction,
        }
    }
}

fn default_local_format() -> DocFormat {
    DocFormat::Markdown
}

fn default_remote_format() -> DocFormat {
    DocFormat::Docx
}

/// Persisted mapping of tracked pairs plus the roots they live in.
///
/// The registry is the single source of truth for sync state between runs.
/// All mutation is in memory; nothing reaches disk until [`Registry::save`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Schema version the registry was written with.
    pub schema_version: u32,
    /// Directory holding the plain-text documents.
    pub local_root: PathBuf,
    /// Directory mirrored by the external sync client.
    pub remote_root: PathBuf,
    /// Format of documents in the local root.
    #[serde(default = "default_local_format")]
    pub local_format: DocFormat,
    /// Format of documents in the remote root.
    #[serde(default = "default_remote_format")]
    pub remote_format: DocFormat,
    /// Completion time of the last pass that changed any pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<Timestamp>,
    /// Tracked pairs in registration order.
    #[serde(default)]
    pairs: Vec<TrackedPair>,
}

impl Registry {
    /// Create an empty registry for the given roots and formats.
    pub fn new(
        local_root: impl Into<PathBuf>,
        remote_root: impl Into<PathBuf>,
        local_format: DocFormat,
        remote_format: DocFormat,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            local_format,
            remote_format,
            last_synced_at: None,
            pairs: Vec::new(),
        }
    }

    /// Default registry location for a local root.
    pub fn default_path(local_root: impl AsRef<Path>) -> PathBuf {
        local_root.as_ref().join(REGISTRY_FILE_NAME)
    }

    /// Load a registry from `path`.
    ///
    /// Returns `Ok(None)` when no state file exists yet.
    ///
    /// # Errors
    /// - `CorruptRegistry` if the file is unreadable as JSON or fails validation
    /// - `UnsupportedSchema` if it was written by a newer schema
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No registry at {}", path.display());
                return Ok(None);
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(Error::CorruptRegistry(format!("{}: {}", path.display(), e)));
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&content).map(Some)
    }

    /// Load a registry, or start an empty one for the given roots when no
    /// state file exists.
    pub async fn load_or_empty(
        path: impl AsRef<Path>,
        local_root: impl Into<PathBuf>,
        remote_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        match Self::load(path).await? {
            Some(registry) => Ok(registry),
            None => Ok(Self::new(
                local_root,
                remote_root,
                default_local_format(),
                default_remote_format(),
            )),
        }
    }

    /// Atomically persist the registry to `path`.
    ///
    /// The previous file is only replaced once the new content is fully
    /// written, so an interrupted save leaves the old registry intact.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json()?;
        replace_file(path.as_ref(), json.as_bytes()).await?;
        debug!("Saved registry with {} pairs", self.pairs.len());
        Ok(())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        let mut json =
            serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize and validate from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::CorruptRegistry(e.to_string()))?;

        let version = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| Error::CorruptRegistry("missing schema_version".to_string()))?;
        if version == 0 {
            return Err(Error::CorruptRegistry("schema_version 0 is invalid".to_string()));
        }
        if version > u64::from(SCHEMA_VERSION) {
            return Err(Error::UnsupportedSchema {
                found: u32::try_from(version).unwrap_or(u32::MAX),
                supported: SCHEMA_VERSION,
            });
        }

        let mut registry: Self =
            serde_json::from_value(value).map_err(|e| Error::CorruptRegistry(e.to_string()))?;
        registry.validate()?;
        registry.schema_version = SCHEMA_VERSION;
        Ok(registry)
    }

    /// Check every pair's shape and the uniqueness of both path columns.
    pub fn validate(&self) -> Result<()> {
        let mut locals = HashSet::new();
        let mut remotes = HashSet::new();
        for pair in &self.pairs {
            self.check_shape(pair)
                .map_err(|e| Error::CorruptRegistry(e.to_string()))?;
            if !locals.insert(&pair.local_path) {
                return Err(Error::CorruptRegistry(format!(
                    "duplicate local path {}",
                    pair.local_path
                )));
            }
            if !remotes.insert(&pair.remote_path) {
                return Err(Error::CorruptRegistry(format!(
                    "duplicate remote path {}",
                    pair.remote_path
                )));
            }
        }
        Ok(())
    }

    /// Remote document name that mirrors `local`.
    pub fn remote_name_for(&self, local: &DocName) -> DocName {
        local.with_format(self.remote_format)
    }

    /// Local document name that mirrors `remote`.
    pub fn local_name_for(&self, remote: &DocName) -> DocName {
        remote.with_format(self.local_format)
    }

    /// Get the pair owning a local document.
    pub fn find_by_local(&self, local: &DocName) -> Option<&TrackedPair> {
        self.pairs.iter().find(|p| &p.local_path == local)
    }

    /// Get the pair owning a remote document.
    pub fn find_by_remote(&self, remote: &DocName) -> Option<&TrackedPair> {
        self.pairs.iter().find(|p| &p.remote_path == remote)
    }

    /// Get the pair matching either side's name.
    pub fn find(&self, name: &DocName) -> Option<&TrackedPair> {
        self.find_by_local(name).or_else(|| self.find_by_remote(name))
    }

    /// Verify that `local`/`remote` could be registered without sharing a
    /// path with a different pair.
    pub fn check_collision(&self, local: &DocName, remote: &DocName) -> Result<()> {
        if let Some(owner) = self.find_by_remote(remote) {
            if &owner.local_path != local {
                return Err(Error::PathCollision(format!(
                    "{} is already mirrored by {}",
                    remote, owner.local_path
                )));
            }
        }
        if let Some(owner) = self.find_by_local(local) {
            if &owner.remote_path != remote {
                return Err(Error::PathCollision(format!(
                    "{} is already paired with {}",
                    local, owner.remote_path
                )));
            }
        }
        Ok(())
    }

    /// Insert a pair, or replace the pair with the same local and remote
    /// paths.
    ///
    /// # Errors
    /// - `InvalidInput` if the names do not share a base name or have the
    ///   wrong suffixes
    /// - `PathCollision` if either path belongs to a different pair; the
    ///   registry is left unchanged
    pub fn upsert_pair(&mut self, pair: TrackedPair) -> Result<()> {
        self.check_shape(&pair)?;
        self.check_collision(&pair.local_path, &pair.remote_path)?;

        match self
            .pairs
            .iter_mut()
            .find(|p| p.local_path == pair.local_path)
        {
            Some(existing) => *existing = pair,
            None => self.pairs.push(pair),
        }
        Ok(())
    }

    /// Remove the pair owning a local document.
    pub fn remove_pair(&mut self, local: &DocName) -> Option<TrackedPair> {
        let idx = self.pairs.iter().position(|p| &p.local_path == local)?;
        Some(self.pairs.remove(idx))
    }

    /// All tracked pairs in registration order.
    pub fn pairs(&self) -> &[TrackedPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn check_shape(&self, pair: &TrackedPair) -> Result<()> {
        if pair.local_path.stem() != pair.remote_path.stem() {
            return Err(Error::InvalidInput(format!(
                "{} and {} do not share a base name",
                pair.local_path, pair.remote_path
            )));
        }
        if !pair.local_path.has_format(self.local_format) {
            return Err(Error::InvalidInput(format!(
                "{} is not a {} document",
                pair.local_path, self.local_format
            )));
        }
        if !pair.remote_path.has_format(self.remote_format) {
            return Err(Error::InvalidInput(format!(
                "{} is not a {} document",
                pair.remote_path, self.remote_format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn name(s: &str) -> DocName {
        DocName::parse(s).unwrap()
    }

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 123_456_789).unwrap()
    }

    fn registry() -> Registry {
        Registry::new("/notes", "/drive", DocFormat::Markdown, DocFormat::Docx)
    }

    fn pair(stem: &str) -> TrackedPair {
        TrackedPair::new(
            name(&format!("{}.md", stem)),
            name(&format!("{}.docx", stem)),
            ts(100),
            ts(200),
            SyncDirection::LocalToRemote,
        )
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let loaded = Registry::load(temp.path().join(REGISTRY_FILE_NAME))
            .await
            .unwrap();
        assert!(loaded.is_none());

        let empty = Registry::load_or_empty(temp.path().join(REGISTRY_FILE_NAME), "/a", "/b")
            .await
            .unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.schema_version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(REGISTRY_FILE_NAME);

        let mut reg = registry();
        reg.upsert_pair(pair("notes")).unwrap();
        reg.upsert_pair(pair("todo")).unwrap();
        reg.save(&path).await.unwrap();

        let loaded = Registry::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, reg);
        assert_eq!(loaded.pairs()[0].last_synced_local, ts(100));
        assert_eq!(loaded.pairs()[1].local_path, name("todo.md"));
    }

    #[tokio::test]
    async fn test_save_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(REGISTRY_FILE_NAME);

        let mut reg = registry();
        reg.upsert_pair(pair("notes")).unwrap();
        reg.save(&path).await.unwrap();
        let first = fs::read(&path).await.unwrap();

        let reloaded = Registry::load(&path).await.unwrap().unwrap();
        reloaded.save(&path).await.unwrap();
        assert_eq!(first, fs::read(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_registry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(REGISTRY_FILE_NAME);
        fs::write(&path, "{ not json").await.unwrap();

        let err = Registry::load(&path).await.unwrap_err();
        assert!(matches!(err, Error::CorruptRegistry(_)));
    }

    #[test]
    fn test_missing_schema_version_is_corrupt() {
        let err = Registry::from_json(r#"{"local_root": "/a", "remote_root": "/b"}"#).unwrap_err();
        assert!(matches!(err, Error::CorruptRegistry(_)));
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let json = r#"{"schema_version": 7, "local_root": "/a", "remote_root": "/b", "pairs": []}"#;
        let err = Registry::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedSchema {
                found: 7,
                supported: SCHEMA_VERSION
            }
        ));
    }

    #[test]
    fn test_minimal_registry_fills_defaults() {
        let json = r#"{
            "schema_version": 1,
            "local_root": "/a",
            "remote_root": "/b",
            "pairs": [{
                "local_path": "notes.md",
                "remote_path": "notes.docx",
                "last_synced_local": "2024-01-01T00:00:00Z",
                "last_synced_remote": "2024-01-01T00:00:01Z"
            }]
        }"#;
        let reg = Registry::from_json(json).unwrap();
        assert_eq!(reg.local_format, DocFormat::Markdown);
        assert_eq!(reg.remote_format, DocFormat::Docx);
        assert_eq!(reg.pairs()[0].last_sync_direction, SyncDirection::None);
        assert!(reg.last_synced_at.is_none());
    }

    #[test]
    fn test_last_synced_at_is_optional() {
        let mut reg = registry();
        assert!(!reg.to_json().unwrap().contains("last_synced_at"));

        reg.last_synced_at = Some(ts(900));
        let restored = Registry::from_json(&reg.to_json().unwrap()).unwrap();
        assert_eq!(restored.last_synced_at, Some(ts(900)));
    }

    #[test]
    fn test_name_mapping_both_ways() {
        let reg = registry();
        assert_eq!(reg.remote_name_for(&name("notes.md")), name("notes.docx"));
        assert_eq!(reg.local_name_for(&name("notes.docx")), name("notes.md"));
    }

    #[test]
    fn test_invalid_pair_is_corrupt() {
        let json = r#"{
            "schema_version": 1,
            "local_root": "/a",
            "remote_root": "/b",
            "pairs": [{
                "local_path": "notes.md",
                "remote_path": "other.docx",
                "last_synced_local": "2024-01-01T00:00:00Z",
                "last_synced_remote": "2024-01-01T00:00:01Z"
            }]
        }"#;
        assert!(matches!(
            Registry::from_json(json).unwrap_err(),
            Error::CorruptRegistry(_)
        ));

        let nested = json.replace("other.docx", "sub/notes.docx");
        assert!(matches!(
            Registry::from_json(&nested).unwrap_err(),
            Error::CorruptRegistry(_)
        ));
    }

    #[test]
    fn test_duplicate_pairs_are_corrupt() {
        let mut reg = registry();
        reg.pairs.push(pair("notes"));
        reg.pairs.push(pair("notes"));
        let json = serde_json::to_string(&reg).unwrap();
        assert!(matches!(
            Registry::from_json(&json).unwrap_err(),
            Error::CorruptRegistry(_)
        ));
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut reg = registry();
        reg.upsert_pair(pair("notes")).unwrap();

        let mut updated = pair("notes");
        updated.last_synced_local = ts(500);
        updated.last_sync_direction = SyncDirection::RemoteToLocal;
        reg.upsert_pair(updated.clone()).unwrap();

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.find_by_local(&name("notes.md")), Some(&updated));
        assert_eq!(reg.find_by_remote(&name("notes.docx")), Some(&updated));
    }

    #[test]
    fn test_upsert_rejects_collision() {
        let mut reg = registry();
        reg.upsert_pair(pair("notes")).unwrap();

        // Same stem through an alternate markdown suffix maps onto the same
        // remote document.
        let clash = TrackedPair::new(
            name("notes.markdown"),
            name("notes.docx"),
            ts(1),
            ts(1),
            SyncDirection::None,
        );
        let err = reg.upsert_pair(clash).unwrap_err();
        assert!(matches!(err, Error::PathCollision(_)));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.pairs()[0], pair("notes"));
    }

    #[test]
    fn test_upsert_rejects_mismatched_names() {
        let mut reg = registry();
        let bad = TrackedPair::new(
            name("a.md"),
            name("b.docx"),
            ts(1),
            ts(1),
            SyncDirection::None,
        );
        assert!(matches!(
            reg.upsert_pair(bad).unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_pair() {
        let mut reg = registry();
        reg.upsert_pair(pair("a")).unwrap();
        reg.upsert_pair(pair("b")).unwrap();

        let removed = reg.remove_pair(&name("a.md")).unwrap();
        assert_eq!(removed.local_path, name("a.md"));
        assert!(reg.remove_pair(&name("a.md")).is_none());
        assert_eq!(reg.len(), 1);
        assert!(reg.find(&name("b.docx")).is_some());
    }
}
