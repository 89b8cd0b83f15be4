//! Persistence adapter.
//!
//! The active session always lives in the local store. History lives in the
//! local store until a remote store is attached (after sign-in), and goes back
//! to the local store when the remote is detached. Reads never fail: missing
//! or corrupt data comes back as absent or empty. Writes log their failures
//! and return.

mod drive;
mod local;

pub use drive::{DriveHistoryStore, HISTORY_FILE_NAME};
pub use local::LocalStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DebateError;
use crate::model::{DebateRecord, DebateState};

pub const ACTIVE_SESSION_KEY: &str = "agora-ai-debate";
pub const HISTORY_KEY: &str = "agora-ai-history";

/// Somewhere a full history list can be read and replaced.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Vec<DebateRecord>, DebateError>;

    async fn save(&self, history: &[DebateRecord]) -> Result<(), DebateError>;

    /// Drop content that failed to parse. Stores that are overwritten
    /// wholesale on the next save can leave it in place.
    async fn discard_corrupt(&self) -> Result<(), DebateError> {
        Ok(())
    }
}

pub struct Persistence {
    local: LocalStore,
    remote: Option<Arc<dyn HistoryStore>>,
}

impl Persistence {
    pub fn new(local: LocalStore) -> Self {
        Self { local, remote: None }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Route history to `remote`, or back to the local store with `None`.
    pub fn set_remote(&mut self, remote: Option<Arc<dyn HistoryStore>>) {
        match &remote {
            Some(store) => tracing::info!(store = store.name(), "History now stored remotely"),
            None if self.remote.is_some() => tracing::info!("History now stored locally"),
            None => {}
        }
        self.remote = remote;
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    fn history_store(&self) -> &dyn HistoryStore {
        match &self.remote {
            Some(remote) => remote.as_ref(),
            None => &self.local,
        }
    }

    pub fn load_active_session(&self) -> Option<DebateState> {
        let content = match self.local.get(ACTIVE_SESSION_KEY) {
            Ok(Some(content)) => content,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Could not read the saved debate: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<DebateState>(&content) {
            Ok(state) => Some(state.normalize()),
            Err(e) => {
                tracing::warn!("Saved debate is corrupt, discarding it: {}", e);
                if let Err(e) = self.local.remove(ACTIVE_SESSION_KEY) {
                    tracing::warn!("Could not clear the corrupt saved debate: {}", e);
                }
                None
            }
        }
    }

    /// Write the active session, or clear it with `None`.
    pub fn save_active_session(&self, state: Option<&DebateState>) {
        let result = match state {
            Some(state) => serde_json::to_string(state)
                .map_err(DebateError::from)
                .and_then(|json| self.local.set(ACTIVE_SESSION_KEY, &json)),
            None => self.local.remove(ACTIVE_SESSION_KEY),
        };
        if let Err(e) = result {
            tracing::error!("Failed to save the active debate: {}", e);
        }
    }

    pub async fn load_history(&self) -> Vec<DebateRecord> {
        let store = self.history_store();
        match store.load().await {
            Ok(history) => {
                tracing::debug!(store = store.name(), records = history.len(), "Loaded history");
                history.into_iter().map(DebateRecord::normalize).collect()
            }
            Err(DebateError::Serialization(e)) => {
                tracing::warn!(store = store.name(), "Stored history is corrupt, treating it as empty: {}", e);
                if let Err(e) = store.discard_corrupt().await {
                    tracing::warn!(store = store.name(), "Could not clear the corrupt history: {}", e);
                }
                Vec::new()
            }
            Err(e) => {
                tracing::error!(store = store.name(), "Failed to load history: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn save_history(&self, history: &[DebateRecord]) {
        let store = self.history_store();
        if let Err(e) = store.save(history).await {
            tracing::error!(store = store.name(), "Failed to save history: {}", e);
        }
    }
}
