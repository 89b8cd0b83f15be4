//! History stored as a single JSON file in the Google Drive application-data folder.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::HistoryStore;
use crate::backend::{check_status, with_retries};
use crate::config::{GoogleConfig, PolicyConfig};
use crate::error::DebateError;
use crate::model::DebateRecord;

pub const HISTORY_FILE_NAME: &str = "agora-ai-history.json";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
}

/// Remote history file scoped to one signed-in user's access token.
pub struct DriveHistoryStore {
    http: reqwest::Client,
    access_token: String,
    api_base: String,
    upload_base: String,
    policy: PolicyConfig,
    file_id: Mutex<Option<String>>,
}

impl DriveHistoryStore {
    pub fn new(
        http: reqwest::Client,
        access_token: impl Into<String>,
        google: &GoogleConfig,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            http,
            access_token: access_token.into(),
            api_base: google.drive_api_base.trim_end_matches('/').to_string(),
            upload_base: google.drive_upload_base.trim_end_matches('/').to_string(),
            policy,
            file_id: Mutex::new(None),
        }
    }

    /// Find the history file, creating it on first use. The id is cached.
    async fn file_id(&self) -> Result<String, DebateError> {
        let mut cached = self.file_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match self.find_file().await? {
            Some(id) => id,
            None => self.create_file().await?,
        };
        tracing::debug!(file_id = %id, "resolved drive history file");
        *cached = Some(id.clone());
        Ok(id)
    }

    async fn find_file(&self) -> Result<Option<String>, DebateError> {
        let list: FileList = with_retries(&self.policy, "drive files.list", || async {
            let response = self
                .http
                .get(format!("{}/files", self.api_base))
                .bearer_auth(&self.access_token)
                .query(&[("spaces", "appDataFolder"), ("fields", "files(id, name)")])
                .send()
                .await?;
            Ok(check_status(response).await?.json::<FileList>().await?)
        })
        .await?;

        Ok(list
            .files
            .into_iter()
            .find(|f| f.name == HISTORY_FILE_NAME)
            .map(|f| f.id))
    }

    async fn create_file(&self) -> Result<String, DebateError> {
        let metadata = serde_json::json!({
            "name": HISTORY_FILE_NAME,
            "parents": ["appDataFolder"],
            "mimeType": "application/json",
        });

        let file: DriveFile = with_retries(&self.policy, "drive files.create", || async {
            let response = self
                .http
                .post(format!("{}/files", self.api_base))
                .bearer_auth(&self.access_token)
                .query(&[("fields", "id")])
                .json(&metadata)
                .send()
                .await?;
            Ok(check_status(response).await?.json::<DriveFile>().await?)
        })
        .await?;

        tracing::info!("Created {} in drive appDataFolder", HISTORY_FILE_NAME);
        Ok(file.id)
    }
}

#[async_trait]
impl HistoryStore for DriveHistoryStore {
    fn name(&self) -> &str {
        "drive"
    }

    async fn load(&self) -> Result<Vec<DebateRecord>, DebateError> {
        let id = self.file_id().await?;

        let body = with_retries(&self.policy, "drive files.get", || async {
            let response = self
                .http
                .get(format!("{}/files/{}", self.api_base, id))
                .bearer_auth(&self.access_token)
                .query(&[("alt", "media")])
                .send()
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(String::new());
            }
            Ok(check_status(response).await?.text().await?)
        })
        .await?;

        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn save(&self, history: &[DebateRecord]) -> Result<(), DebateError> {
        let id = self.file_id().await?;
        let content = serde_json::to_string_pretty(history)?;

        with_retries(&self.policy, "drive files.update", || async {
            let response = self
                .http
                .patch(format!("{}/files/{}", self.upload_base, id))
                .bearer_auth(&self.access_token)
                .query(&[("uploadType", "media")])
                .header("content-type", "application/json")
                .body(content.clone())
                .send()
                .await?;
            check_status(response).await?;
            Ok(())
        })
        .await
    }
}
