//! Best-effort storage of conversion results.
//!
//! The orchestrator consults a [`UserPreferenceLookup`] and then hands the
//! result to a [`PersistenceGateway`]. Neither can fail a conversion: every
//! error here is logged and recorded in the report, and the caller still gets
//! the converted bytes.
//!
//! [`LocalDirectoryGateway`] stores blobs under a root directory with a JSON
//! metadata sidecar next to each one. Object stores plug in behind the same
//! trait.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::PersistenceError;

// ── Metadata ─────────────────────────────────────────────────────────────────

/// What produced a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingType {
    #[serde(rename = "conversion")]
    Conversion,
    #[serde(rename = "merge")]
    Merge,
    #[serde(rename = "image-to-pdf")]
    ImageToPdf,
    /// The uploaded source itself, kept alongside its conversion.
    #[serde(rename = "original")]
    OriginalSource,
}

impl ProcessingType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingType::Conversion => "conversion",
            ProcessingType::Merge => "merge",
            ProcessingType::ImageToPdf => "image-to-pdf",
            ProcessingType::OriginalSource => "original",
        }
    }
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata recorded with every stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub user_id: String,
    pub original_name: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: usize,
    pub processing_type: ProcessingType,
    pub created_at: DateTime<Utc>,
}

impl FileMetadata {
    /// `{user_id}/{processing_type}/{unix millis}-{file_name}`, with path
    /// separators stripped from the user-controlled parts.
    pub fn storage_key(&self) -> String {
        format!(
            "{}/{}/{}-{}",
            sanitize_segment(&self.user_id),
            self.processing_type,
            self.created_at.timestamp_millis(),
            sanitize_segment(&self.file_name)
        )
    }
}

fn sanitize_segment(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        t => t.to_string(),
    }
}

/// Where a stored object ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLocation {
    pub key: String,
    pub uri: String,
}

// ── Collaborator seams ───────────────────────────────────────────────────────

/// Durable storage for results.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn store(&self, bytes: &[u8], metadata: &FileMetadata) -> Result<StoredLocation, PersistenceError>;
}

/// Whether a user has opted in to storage.
#[async_trait]
pub trait UserPreferenceLookup: Send + Sync {
    async fn should_persist(&self, user_id: &str) -> Result<bool, PersistenceError>;
}

/// Same answer for every user.
#[derive(Debug, Clone, Copy)]
pub struct StaticPreference(pub bool);

#[async_trait]
impl UserPreferenceLookup for StaticPreference {
    async fn should_persist(&self, _user_id: &str) -> Result<bool, PersistenceError> {
        Ok(self.0)
    }
}

// ── Local directory ──────────────────────────────────────────────────────────

/// Stores each blob at `<root>/<storage key>` plus `<…>.json` metadata.
#[derive(Debug, Clone)]
pub struct LocalDirectoryGateway {
    root: PathBuf,
}

impl LocalDirectoryGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Write to a uniquely named `<path>.<uuid>.tmp`, then rename over `path`.
/// Concurrent writers to the same key each rename a complete file; the last
/// rename wins.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}

#[async_trait]
impl PersistenceGateway for LocalDirectoryGateway {
    async fn store(&self, bytes: &[u8], metadata: &FileMetadata) -> Result<StoredLocation, PersistenceError> {
        let key = metadata.storage_key();
        let path = self.root.join(&key);

        let sidecar = serde_json::to_vec_pretty(metadata).map_err(|e| PersistenceError::Encode(e.to_string()))?;
        write_atomic(&path, bytes).await?;
        let mut meta_path = path.as_os_str().to_owned();
        meta_path.push(".json");
        write_atomic(Path::new(&meta_path), &sidecar).await?;

        debug!(key = %key, size = bytes.len(), "Stored result in local directory");
        Ok(StoredLocation {
            uri: format!("file://{}", path.display()),
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta(user: &str, name: &str) -> FileMetadata {
        FileMetadata {
            user_id: user.into(),
            original_name: "in.pdf".into(),
            file_name: name.into(),
            mime_type: "application/pdf".into(),
            size: 3,
            processing_type: ProcessingType::Merge,
            created_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        }
    }

    #[test]
    fn storage_key_layout() {
        assert_eq!(meta("u1", "merged.pdf").storage_key(), "u1/merge/1700000000000-merged.pdf");
    }

    #[test]
    fn storage_key_strips_separators() {
        assert_eq!(meta("../etc", "a/b.pdf").storage_key(), ".._etc/merge/1700000000000-a_b.pdf");
        assert_eq!(meta("..", "x.pdf").storage_key(), "_/merge/1700000000000-x.pdf");
    }

    #[test]
    fn processing_type_names() {
        assert_eq!(serde_json::to_string(&ProcessingType::ImageToPdf).unwrap(), "\"image-to-pdf\"");
        assert_eq!(ProcessingType::OriginalSource.to_string(), "original");
    }

    #[tokio::test]
    async fn local_gateway_writes_blob_and_sidecar() {
        let root = tempfile::TempDir::new().unwrap();
        let gw = LocalDirectoryGateway::new(root.path());
        let m = meta("u1", "merged.pdf");
        let loc = gw.store(b"pdf", &m).await.unwrap();

        let blob = root.path().join(&loc.key);
        assert_eq!(std::fs::read(&blob).unwrap(), b"pdf");
        let sidecar: FileMetadata =
            serde_json::from_slice(&std::fs::read(root.path().join(format!("{}.json", loc.key))).unwrap()).unwrap();
        assert_eq!(sidecar, m);
        assert!(loc.uri.starts_with("file://"));
        assert!(leftover_temp_files(root.path()).is_empty());
    }

    fn leftover_temp_files(root: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut dirs = vec![root.to_path_buf()];
        while let Some(dir) = dirs.pop() {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    dirs.push(path);
                } else if path.extension().is_some_and(|e| e == "tmp") {
                    found.push(path);
                }
            }
        }
        found
    }

    #[tokio::test]
    async fn same_millisecond_stores_do_not_clobber_temp_files() {
        let root = tempfile::TempDir::new().unwrap();
        let gw = LocalDirectoryGateway::new(root.path());
        let m = meta("u1", "merged.pdf");
        let (a, b) = tokio::join!(gw.store(b"first", &m), gw.store(b"second", &m));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.key, b.key);

        let blob = std::fs::read(root.path().join(&a.key)).unwrap();
        assert!(blob == b"first" || blob == b"second", "torn write: {blob:?}");
        assert!(leftover_temp_files(root.path()).is_empty());
    }

    #[tokio::test]
    async fn unwritable_root_is_io_error() {
        let root = tempfile::TempDir::new().unwrap();
        let file_root = root.path().join("not-a-dir");
        std::fs::write(&file_root, b"x").unwrap();
        let gw = LocalDirectoryGateway::new(&file_root);
        let err = gw.store(b"pdf", &meta("u1", "a.pdf")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
    }

    #[test]
    fn static_preference() {
        assert!(tokio_test::block_on(StaticPreference(true).should_persist("u")).unwrap());
        assert!(!tokio_test::block_on(StaticPreference(false).should_persist("u")).unwrap());
    }
}
