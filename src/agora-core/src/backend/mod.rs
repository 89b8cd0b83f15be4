//! Chat API backends shared by the debate engine and the judge.

mod gemini;
mod openai;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AgoraConfig, BackendKind, PolicyConfig};
use crate::error::DebateError;

pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;

/// Speaker of a turn in a backend conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: TurnRole::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: TurnRole::Model, text: text.into() }
    }
}

/// A single request to a chat backend.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub turns: Vec<ChatTurn>,
    /// Ask the backend to ground its answer with web search.
    pub web_search: bool,
    /// Constrain the answer to JSON matching this schema.
    pub response_schema: Option<serde_json::Value>,
}

/// A citation as returned by a backend, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCitation {
    pub uri: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub citations: Vec<RawCitation>,
}

/// A generative chat API.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run one request to completion.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, DebateError>;
}

/// Build the backend selected by the configuration.
pub fn from_config(config: &AgoraConfig) -> Result<Arc<dyn ChatBackend>, DebateError> {
    let api_key = config.chat.api_key.clone().unwrap_or_default();
    match config.chat.backend {
        BackendKind::Gemini => {
            let mut backend = GeminiBackend::new(
                api_key,
                config.chat.model().to_string(),
                config.policy.clone(),
            )?
            .with_max_output_tokens(config.chat.max_output_tokens);
            if let Some(base) = &config.chat.api_base {
                backend = backend.with_api_base(base.clone());
            }
            Ok(Arc::new(backend))
        }
        BackendKind::Openai => {
            let api_base = config
                .chat
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            let backend = OpenAiBackend::new(
                api_base,
                api_key,
                config.chat.model().to_string(),
                config.policy.clone(),
            )?
            .with_max_output_tokens(config.chat.max_output_tokens);
            Ok(Arc::new(backend))
        }
    }
}

/// Turn a non-success HTTP response into [`DebateError::Api`].
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DebateError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    Err(DebateError::Api { status: status.as_u16(), body })
}

/// Run `op` under the call policy, retrying transient failures with
/// exponential backoff.
pub async fn with_retries<T, F, Fut>(
    policy: &PolicyConfig,
    label: &str,
    mut op: F,
) -> Result<T, DebateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DebateError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    label,
                    e,
                    attempt,
                    policy.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> PolicyConfig {
        PolicyConfig {
            max_retries,
            backoff_base_ms: 1,
            ..PolicyConfig::default()
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&fast_policy(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DebateError::Api { status: 503, body: "busy".into() })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(&fast_policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DebateError::Api { status: 400, body: "bad".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(&fast_policy(2), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DebateError::Api { status: 500, body: "down".into() }) }
        })
        .await;
        assert!(matches!(result, Err(DebateError::Api { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
