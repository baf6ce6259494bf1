// src/storage/local.rs

//! Local filesystem storage

use super::{validate_location, FileInfo, Storage};
use crate::error::{Error, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

/// Repository rooted at a local directory
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never sees a partially written index document.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    staging_dir: Option<PathBuf>,
    name: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            name: format!("file://{}", root.display()),
            root,
            staging_dir: None,
        }
    }

    /// Stage writes in `dir` instead of next to the target file
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, location: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_location(location)?))
    }

    fn unavailable(&self, action: &str, path: &Path, e: std::io::Error) -> Error {
        if e.kind() == ErrorKind::NotFound {
            Error::NotFoundError(path.display().to_string())
        } else {
            Error::StorageUnavailable(format!(
                "Failed to {} {}: {}",
                action,
                path.display(),
                e
            ))
        }
    }

    fn stage(&self, target_dir: &Path) -> Result<NamedTempFile> {
        let dir = self.staging_dir.as_deref().unwrap_or(target_dir);
        fs::create_dir_all(dir).map_err(|e| self.unavailable("create", dir, e))?;
        NamedTempFile::new_in(dir).map_err(|e| self.unavailable("stage in", dir, e))
    }
}

impl Storage for LocalStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self, prefix: &str) -> Result<Vec<FileInfo>> {
        if !self.root.is_dir() {
            return Err(Error::StorageUnavailable(format!(
                "Repository directory doesn't exist: {}",
                self.root.display()
            )));
        }

        // walk the deepest directory fully named by the prefix
        let prefix = prefix.trim_start_matches('/');
        let base = match prefix.rfind('/') {
            Some(pos) => self.root.join(&prefix[..pos]),
            None => self.root.clone(),
        };
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&base).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                Error::StorageUnavailable(format!("Failed to list {}: {}", base.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let location = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !location.starts_with(prefix) {
                continue;
            }

            let metadata = entry
                .metadata()
                .map_err(|e| Error::StorageUnavailable(format!("Failed to stat {}: {}", location, e)))?;
            let modified_at = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            files.push(FileInfo {
                location,
                modified_at,
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(files)
    }

    fn read(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.resolve(location)?;
        fs::read(&path).map_err(|e| self.unavailable("read", &path, e))
    }

    fn write(&self, location: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(location)?;
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent).map_err(|e| self.unavailable("create", &parent, e))?;

        let mut staged = self.stage(&parent)?;
        staged
            .write_all(data)
            .and_then(|_| staged.flush())
            .map_err(|e| self.unavailable("write", staged.path(), e))?;

        if let Err(e) = staged.persist(&path) {
            // staging dir on another filesystem
            debug!("Rename into {} failed ({}), copying", path.display(), e.error);
            fs::copy(e.file.path(), &path).map_err(|err| self.unavailable("write", &path, err))?;
        }

        debug!("Wrote {} ({} bytes)", location, data.len());
        Ok(())
    }

    fn delete(&self, location: &str) -> Result<()> {
        let path = self.resolve(location)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.unavailable("delete", &path, e)),
        }
    }
}
