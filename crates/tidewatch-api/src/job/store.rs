//! Job persistence store.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::definition::Job;
use crate::error::JobError;

/// Durable, named partitions of jobs.
///
/// A store is saved as a whole: `save_store` replaces every job previously
/// held by that store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load every job held by `store`; empty if the store does not exist.
    async fn load_store(&self, store: &str) -> Result<Vec<Job>, JobError>;

    /// Replace the contents of `store`.
    async fn save_store(&self, store: &str, jobs: &[Job]) -> Result<(), JobError>;

    /// Names of every known store.
    async fn store_names(&self) -> Result<Vec<String>, JobError>;

    /// Load all jobs from all stores. Unreadable stores are skipped.
    async fn load_all(&self) -> Result<Vec<Job>, JobError> {
        let mut jobs = Vec::new();
        for name in self.store_names().await? {
            match self.load_store(&name).await {
                Ok(loaded) => jobs.extend(loaded),
                Err(e) => warn!(store = %name, error = %e, "Skipping unreadable job store"),
            }
        }
        Ok(jobs)
    }
}

/// In-memory job store for testing.
pub struct MemoryJobStore {
    stores: RwLock<HashMap<String, Vec<Job>>>,
}

impl MemoryJobStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn load_store(&self, store: &str) -> Result<Vec<Job>, JobError> {
        let stores = self.stores.read().await;
        Ok(stores.get(store).cloned().unwrap_or_default())
    }

    async fn save_store(&self, store: &str, jobs: &[Job]) -> Result<(), JobError> {
        let mut stores = self.stores.write().await;
        stores.insert(store.to_string(), jobs.to_vec());
        Ok(())
    }

    async fn store_names(&self) -> Result<Vec<String>, JobError> {
        let stores = self.stores.read().await;
        let mut names: Vec<String> = stores.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// One JSON file per store under a directory.
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    /// Create a file-based store rooted at `dir`, creating it if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, JobError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| JobError::Store(format!("Failed to create jobs directory: {}", e)))?;

        debug!("FileJobStore initialized at {:?}", dir);
        Ok(Self { dir })
    }

    fn store_path(&self, store: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::sanitize_id(store)))
    }

    fn sanitize_id(id: &str) -> String {
        id.chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn load_store(&self, store: &str) -> Result<Vec<Job>, JobError> {
        let path = self.store_path(store);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(JobError::Store(format!(
                    "Failed to read job store {:?}: {}",
                    path, e
                )));
            }
        };

        serde_json::from_str(&content)
            .map_err(|e| JobError::Store(format!("Failed to parse job store {:?}: {}", path, e)))
    }

    async fn save_store(&self, store: &str, jobs: &[Job]) -> Result<(), JobError> {
        let path = self.store_path(store);
        let tmp = self
            .dir
            .join(format!(".{}.json.tmp", Self::sanitize_id(store)));

        let content = serde_json::to_string_pretty(jobs)
            .map_err(|e| JobError::Store(format!("Failed to serialize job store: {}", e)))?;

        fs::write(&tmp, content)
            .await
            .map_err(|e| JobError::Store(format!("Failed to write job store: {}", e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| JobError::Store(format!("Failed to replace job store: {}", e)))?;

        debug!(store = %store, count = jobs.len(), "Saved job store to {:?}", path);
        Ok(())
    }

    async fn store_names(&self) -> Result<Vec<String>, JobError> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => {
                return Err(JobError::Store(format!(
                    "Failed to read jobs directory: {}",
                    e
                )));
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| JobError::Store(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !stem.starts_with('.') {
                        names.push(stem.to_string());
                    }
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
