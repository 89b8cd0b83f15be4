//! Test doubles shared by unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{ChatBackend, ChatReply, ChatRequest};
use crate::error::DebateError;
use crate::model::DebateRecord;
use crate::persistence::HistoryStore;

/// Backend that answers from a script and records every request.
pub struct ScriptedBackend {
    replies: Mutex<Vec<Result<ChatReply, DebateError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<ChatReply, DebateError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn text(text: &str) -> Result<ChatReply, DebateError> {
        Ok(ChatReply { text: text.to_string(), citations: Vec::new() })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, DebateError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(DebateError::InvalidResponse("script exhausted".to_string()));
        }
        replies.remove(0)
    }
}

/// History store kept in memory, standing in for a remote store.
#[derive(Default)]
pub struct MemoryStore {
    pub history: Mutex<Vec<DebateRecord>>,
}

impl MemoryStore {
    pub fn with(history: Vec<DebateRecord>) -> Arc<Self> {
        Arc::new(Self { history: Mutex::new(history) })
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Vec<DebateRecord>, DebateError> {
        Ok(self.history.lock().unwrap().clone())
    }

    async fn save(&self, history: &[DebateRecord]) -> Result<(), DebateError> {
        *self.history.lock().unwrap() = history.to_vec();
        Ok(())
    }
}
