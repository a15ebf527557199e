//! Scoped temporary artifacts: files, directories, and byte buffers that live
//! for one strategy attempt.
//!
//! Files and directories come from [`tempfile`], so the OS object is removed
//! when the handle is released or dropped, including on panic unwinds. Every
//! artifact name carries the request id as a prefix, so concurrent requests
//! sharing one root never collide.
//!
//! [`ArtifactHandle::release`] is idempotent. Release failures (the file was
//! already removed from under us, permissions changed) are logged and
//! swallowed; they never replace a conversion result or error.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, warn};

use crate::error::ArtifactError;

/// Counters shared by a manager and every handle it issued.
#[derive(Debug, Default)]
pub struct ArtifactStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
    release_failures: AtomicUsize,
}

impl ArtifactStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Releases whose cleanup reported an error (still counted as released).
    pub fn release_failures(&self) -> usize {
        self.release_failures.load(Ordering::SeqCst)
    }

    /// Acquired but not yet released.
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

/// What an artifact wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    File,
    Directory,
    Buffer,
}

enum Resource {
    File(NamedTempFile),
    Dir(TempDir),
    Buffer(Vec<u8>),
}

/// Issues request-scoped artifacts under one root directory.
#[derive(Debug, Clone)]
pub struct TemporaryArtifactManager {
    root: PathBuf,
    stats: Arc<ArtifactStats>,
}

impl TemporaryArtifactManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stats: Arc::new(ArtifactStats::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> Arc<ArtifactStats> {
        Arc::clone(&self.stats)
    }

    fn prefix(namespace: &str) -> String {
        format!("mtc-{namespace}-")
    }

    /// Empty temporary file whose name ends in `suffix` (e.g. `".pdf"`).
    pub fn acquire_file(&self, namespace: &str, suffix: &str) -> Result<ArtifactHandle, ArtifactError> {
        let file = tempfile::Builder::new()
            .prefix(&Self::prefix(namespace))
            .suffix(suffix)
            .tempfile_in(&self.root)
            .map_err(|source| ArtifactError::Create {
                what: "file",
                root: self.root.clone(),
                source,
            })?;
        let path = file.path().to_path_buf();
        Ok(self.issue(namespace, ArtifactKind::File, Some(path), Resource::File(file)))
    }

    /// Temporary file pre-filled with `bytes`.
    pub fn acquire_file_with(
        &self,
        namespace: &str,
        suffix: &str,
        bytes: &[u8],
    ) -> Result<ArtifactHandle, ArtifactError> {
        let handle = self.acquire_file(namespace, suffix)?;
        handle.write_all(bytes)?;
        Ok(handle)
    }

    /// [`acquire_file_with`](Self::acquire_file_with) on the blocking pool,
    /// for callers on an async worker thread.
    pub async fn stage_file(
        &self,
        namespace: &str,
        suffix: &str,
        bytes: Bytes,
    ) -> Result<ArtifactHandle, ArtifactError> {
        let manager = self.clone();
        let namespace = namespace.to_string();
        let suffix = suffix.to_string();
        tokio::task::spawn_blocking(move || manager.acquire_file_with(&namespace, &suffix, &bytes))
            .await
            .map_err(|e| ArtifactError::Staging(e.to_string()))?
    }

    /// Empty temporary directory.
    pub fn acquire_dir(&self, namespace: &str) -> Result<ArtifactHandle, ArtifactError> {
        let dir = tempfile::Builder::new()
            .prefix(&Self::prefix(namespace))
            .tempdir_in(&self.root)
            .map_err(|source| ArtifactError::Create {
                what: "directory",
                root: self.root.clone(),
                source,
            })?;
        let path = dir.path().to_path_buf();
        Ok(self.issue(namespace, ArtifactKind::Directory, Some(path), Resource::Dir(dir)))
    }

    /// In-memory scratch buffer.
    pub fn acquire_buffer(&self, namespace: &str, capacity: usize) -> ArtifactHandle {
        self.issue(
            namespace,
            ArtifactKind::Buffer,
            None,
            Resource::Buffer(Vec::with_capacity(capacity)),
        )
    }

    /// Release through the manager. Same as [`ArtifactHandle::release`].
    pub fn release(&self, handle: &ArtifactHandle) {
        handle.release();
    }

    fn issue(
        &self,
        namespace: &str,
        kind: ArtifactKind,
        path: Option<PathBuf>,
        resource: Resource,
    ) -> ArtifactHandle {
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(namespace, ?kind, path = ?path, "Artifact acquired");
        ArtifactHandle {
            namespace: namespace.to_string(),
            kind,
            path,
            resource: Mutex::new(Some(resource)),
            released: AtomicBool::new(false),
            stats: Arc::clone(&self.stats),
        }
    }
}

/// One live temporary artifact. Released exactly once, on the first of
/// [`release`](Self::release) or drop.
pub struct ArtifactHandle {
    namespace: String,
    kind: ArtifactKind,
    path: Option<PathBuf>,
    resource: Mutex<Option<Resource>>,
    released: AtomicBool,
    stats: Arc<ArtifactStats>,
}

impl std::fmt::Debug for ArtifactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactHandle")
            .field("namespace", &self.namespace)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("released", &self.is_released())
            .finish()
    }
}

impl ArtifactHandle {
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Filesystem path for file and directory artifacts.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Append bytes to a file or buffer artifact.
    pub fn write_all(&self, bytes: &[u8]) -> Result<(), ArtifactError> {
        let mut guard = self.resource.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_mut() {
            Some(Resource::File(file)) => {
                let f = file.as_file_mut();
                f.write_all(bytes).map_err(ArtifactError::Write)?;
                f.flush().map_err(ArtifactError::Write)
            }
            Some(Resource::Buffer(buf)) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            Some(Resource::Dir(_)) => Err(ArtifactError::Write(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot write bytes into a directory artifact",
            ))),
            None => Err(ArtifactError::Released),
        }
    }

    /// Contents of a buffer artifact, or of a file artifact read from disk.
    pub fn contents(&self) -> Result<Vec<u8>, ArtifactError> {
        let guard = self.resource.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(Resource::Buffer(buf)) => Ok(buf.clone()),
            Some(Resource::File(file)) => std::fs::read(file.path()).map_err(ArtifactError::Write),
            Some(Resource::Dir(_)) => Err(ArtifactError::Write(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "a directory artifact has no contents",
            ))),
            None => Err(ArtifactError::Released),
        }
    }

    /// Release the artifact. Safe to call any number of times.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let resource = self
            .resource
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();

        let outcome = match resource {
            Some(Resource::File(file)) => file.close(),
            Some(Resource::Dir(dir)) => dir.close(),
            Some(Resource::Buffer(_)) | None => Ok(()),
        };

        self.stats.released.fetch_add(1, Ordering::SeqCst);
        match outcome {
            Ok(()) => debug!(namespace = %self.namespace, kind = ?self.kind, "Artifact released"),
            Err(e) => {
                self.stats.release_failures.fetch_add(1, Ordering::SeqCst);
                warn!(
                    namespace = %self.namespace,
                    kind = ?self.kind,
                    path = ?self.path,
                    error = %e,
                    "Failed to clean up temporary artifact"
                );
            }
        }
    }
}

impl Drop for ArtifactHandle {
    fn drop(&mut self) {
        self.release();
    }
}
