// Scratch Store Port
// Per-run scratch directories: write-allow root during a run, download source after it

use crate::domain::ScratchFile;
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Scratch directory management
#[async_trait]
pub trait ScratchStore: Send + Sync {
    /// Create the scratch directory for `run_id` and return its absolute path
    ///
    /// # Errors
    /// - AppError::Validation if `run_id` is not `[A-Za-z0-9-]+`
    /// - AppError::Io if the directory cannot be created
    async fn create(&self, run_id: &str) -> Result<PathBuf>;

    /// List regular files under the run's directory, sorted by path
    ///
    /// # Errors
    /// - AppError::NotFound if the run has no scratch directory
    async fn list_files(&self, run_id: &str) -> Result<Vec<ScratchFile>>;

    /// Read one file produced by a run
    ///
    /// # Arguments
    /// * `run_id` - Run that produced the file
    /// * `relative_path` - Path as reported by `list_files`
    ///
    /// # Errors
    /// - AppError::Validation for absolute paths, `..` or paths escaping the run directory
    /// - AppError::NotFound if the file does not exist
    async fn read_file(&self, run_id: &str, relative_path: &str) -> Result<Vec<u8>>;

    /// Remove run directories not modified within `max_age`
    ///
    /// # Returns
    /// Number of run directories removed
    async fn purge_older_than(&self, max_age: Duration) -> Result<usize>;
}

/// Check that a run ID is safe to use as a single path component
pub fn is_valid_run_id(run_id: &str) -> bool {
    !run_id.is_empty()
        && run_id.len() <= 64
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory ScratchStore; files are injected with `put_file`
    #[derive(Default)]
    pub struct InMemoryScratchStore {
        runs: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    }

    impl InMemoryScratchStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_file(&self, run_id: &str, path: &str, content: &[u8]) {
            self.runs
                .lock()
                .unwrap()
                .entry(run_id.to_string())
                .or_default()
                .insert(path.to_string(), content.to_vec());
        }

        pub fn run_count(&self) -> usize {
            self.runs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ScratchStore for InMemoryScratchStore {
        async fn create(&self, run_id: &str) -> Result<PathBuf> {
            if !is_valid_run_id(run_id) {
                return Err(AppError::Validation(format!("Invalid run id: {}", run_id)));
            }
            self.runs
                .lock()
                .unwrap()
                .entry(run_id.to_string())
                .or_default();
            Ok(PathBuf::from("/scratch").join(run_id))
        }

        async fn list_files(&self, run_id: &str) -> Result<Vec<ScratchFile>> {
            let runs = self.runs.lock().unwrap();
            let files = runs
                .get(run_id)
                .ok_or_else(|| AppError::NotFound(format!("Run {} not found", run_id)))?;
            Ok(files
                .iter()
                .map(|(path, content)| ScratchFile {
                    path: path.clone(),
                    size_bytes: content.len() as u64,
                })
                .collect())
        }

        async fn read_file(&self, run_id: &str, relative_path: &str) -> Result<Vec<u8>> {
            let runs = self.runs.lock().unwrap();
            runs.get(run_id)
                .and_then(|files| files.get(relative_path))
                .cloned()
                .ok_or_else(|| {
                    AppError::NotFound(format!("File {} not found in run {}", relative_path, run_id))
                })
        }

        async fn purge_older_than(&self, _max_age: Duration) -> Result<usize> {
            let mut runs = self.runs.lock().unwrap();
            let count = runs.len();
            runs.clear();
            Ok(count)
        }
    }
}
