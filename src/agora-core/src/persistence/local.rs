//! Directory-backed key-value store.
//!
//! Each key is one JSON file in the data directory. Writes land in a temporary
//! file first and are renamed into place. The async history methods move the
//! file I/O onto tokio's blocking pool.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{HISTORY_KEY, HistoryStore};
use crate::error::DebateError;
use crate::model::DebateRecord;

const EMPTY_HISTORY: &str = "[]";

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read a key; `None` when it was never written.
    pub fn get(&self, key: &str) -> Result<Option<String>, DebateError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), DebateError> {
        fs::create_dir_all(&self.dir)?;
        let final_path = self.path_for(key);
        let tmp_path = self.dir.join(format!("{key}.json.tmp"));

        fs::write(&tmp_path, value)?;
        if let Err(rename_err) = fs::rename(&tmp_path, &final_path) {
            if final_path.exists() {
                fs::remove_file(&final_path)?;
                fs::rename(&tmp_path, &final_path)?;
            } else {
                return Err(rename_err.into());
            }
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), DebateError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Run filesystem work off the async runtime.
    async fn blocking<T, F>(&self, work: F) -> Result<T, DebateError>
    where
        T: Send + 'static,
        F: FnOnce(LocalStore) -> Result<T, DebateError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || work(store))
            .await
            .map_err(|e| DebateError::Storage(io::Error::other(e)))?
    }
}

#[async_trait]
impl HistoryStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    /// A missing history key is written as an empty list on first read.
    async fn load(&self) -> Result<Vec<DebateRecord>, DebateError> {
        let content = self.blocking(|store| store.get(HISTORY_KEY)).await?;
        match content {
            Some(content) if !content.trim().is_empty() => Ok(serde_json::from_str(&content)?),
            _ => {
                if let Err(e) = self.blocking(|store| store.set(HISTORY_KEY, EMPTY_HISTORY)).await {
                    tracing::warn!("Could not initialize local history: {}", e);
                }
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, history: &[DebateRecord]) -> Result<(), DebateError> {
        let json = serde_json::to_string(history)?;
        self.blocking(move |store| store.set(HISTORY_KEY, &json)).await
    }

    async fn discard_corrupt(&self) -> Result<(), DebateError> {
        self.blocking(|store| store.set(HISTORY_KEY, EMPTY_HISTORY)).await
    }
}
