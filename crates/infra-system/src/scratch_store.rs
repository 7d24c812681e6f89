// Filesystem scratch store
// Layout: <root>/<run_id>/... one directory per run
use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};

use pyrunner_core::domain::ScratchFile;
use pyrunner_core::error::{AppError, Result};
use pyrunner_core::port::scratch_store::{is_valid_run_id, ScratchStore};

/// ScratchStore backed by a directory on the local filesystem
pub struct FsScratchStore {
    root: PathBuf,
    max_download_bytes: u64,
}

impl FsScratchStore {
    /// Create a store rooted at `root` (created lazily on first run)
    ///
    /// # Arguments
    /// * `root` - Parent directory of all run directories
    /// * `max_download_bytes` - Largest file `read_file` will return
    pub fn new(root: impl Into<PathBuf>, max_download_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_download_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        if !is_valid_run_id(run_id) {
            return Err(AppError::Validation(format!("Invalid run id: {:?}", run_id)));
        }
        Ok(self.root.join(run_id))
    }
}

/// Map NotFound to AppError::NotFound, anything else to AppError::Io
fn map_io(e: io::Error, what: impl FnOnce() -> String) -> AppError {
    if e.kind() == io::ErrorKind::NotFound {
        AppError::NotFound(what())
    } else {
        AppError::Io(e)
    }
}

/// Relative path made only of normal components, e.g. `out/data.csv`
fn validate_relative(relative_path: &str) -> Result<&Path> {
    let path = Path::new(relative_path);
    let well_formed = !relative_path.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !well_formed {
        return Err(AppError::Validation(format!(
            "Invalid file path: {:?}",
            relative_path
        )));
    }
    Ok(path)
}

#[async_trait]
impl ScratchStore for FsScratchStore {
    async fn create(&self, run_id: &str) -> Result<PathBuf> {
        let dir = self.run_dir(run_id)?;
        fs::create_dir_all(&dir).await?;
        // Canonical form so the interpreter's realpath checks agree with ours
        let dir = fs::canonicalize(&dir).await?;
        debug!(run_id = %run_id, path = %dir.display(), "Scratch directory created");
        Ok(dir)
    }

    async fn list_files(&self, run_id: &str) -> Result<Vec<ScratchFile>> {
        let dir = self.run_dir(run_id)?;
        let mut files = Vec::new();
        let mut pending = vec![(dir, String::new())];

        while let Some((current, prefix)) = pending.pop() {
            let mut entries = fs::read_dir(&current)
                .await
                .map_err(|e| map_io(e, || format!("Run {} not found", run_id)))?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let relative = if prefix.is_empty() {
                    name
                } else {
                    format!("{}/{}", prefix, name)
                };

                // DirEntry::file_type does not follow symlinks; links are skipped
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), relative));
                } else if file_type.is_file() {
                    let size_bytes = entry.metadata().await?.len();
                    files.push(ScratchFile {
                        path: relative,
                        size_bytes,
                    });
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn read_file(&self, run_id: &str, relative_path: &str) -> Result<Vec<u8>> {
        let dir = self.run_dir(run_id)?;
        let relative = validate_relative(relative_path)?;
        let not_found = || format!("File {} not found in run {}", relative_path, run_id);

        let run_root = fs::canonicalize(&dir)
            .await
            .map_err(|e| map_io(e, || format!("Run {} not found", run_id)))?;
        let target = fs::canonicalize(dir.join(relative))
            .await
            .map_err(|e| map_io(e, not_found))?;

        if !target.starts_with(&run_root) {
            warn!(run_id = %run_id, path = %relative_path, "Download escapes scratch directory");
            return Err(AppError::Validation(format!(
                "File path escapes the run directory: {:?}",
                relative_path
            )));
        }

        let metadata = fs::metadata(&target).await?;
        if !metadata.is_file() {
            return Err(AppError::NotFound(not_found()));
        }
        if metadata.len() > self.max_download_bytes {
            return Err(AppError::Validation(format!(
                "File {} is {} bytes (limit {} bytes)",
                relative_path,
                metadata.len(),
                self.max_download_bytes
            )));
        }

        Ok(fs::read(&target).await?)
    }

    async fn purge_older_than(&self, max_age: Duration) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_dir() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot stat scratch entry");
                    continue;
                }
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            match fs::remove_dir_all(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to purge scratch directory"),
            }
        }

        if removed > 0 {
            info!(removed = removed, "Purged stale scratch directories");
        }
        Ok(removed)
    }
}
