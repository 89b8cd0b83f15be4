//! Google Gemini `generateContent` backend.
//!
//! https://ai.google.dev/api/generate-content

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatBackend, ChatReply, ChatRequest, RawCitation, TurnRole, check_status, with_retries};
use crate::config::PolicyConfig;
use crate::error::DebateError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    max_output_tokens: Option<u32>,
    policy: PolicyConfig,
}

impl GeminiBackend {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        policy: PolicyConfig,
    ) -> Result<Self, DebateError> {
        Ok(Self {
            client: policy.http_client()?,
            api_base: GEMINI_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_output_tokens: None,
            policy,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    fn build_request(&self, request: &ChatRequest) -> GeminiRequest {
        let contents = request
            .turns
            .iter()
            .map(|turn| GeminiContent {
                role: Some(match turn.role {
                    TurnRole::User => "user".to_string(),
                    TurnRole::Model => "model".to_string(),
                }),
                parts: vec![GeminiPart { text: Some(turn.text.clone()) }],
            })
            .collect();

        let tools = request
            .web_search
            .then(|| vec![GeminiTool { google_search: serde_json::json!({}) }]);

        let generation_config = GeminiGenerationConfig {
            max_output_tokens: self.max_output_tokens,
            response_mime_type: request
                .response_schema
                .as_ref()
                .map(|_| "application/json".to_string()),
            response_schema: request.response_schema.clone(),
        };

        GeminiRequest {
            contents,
            system_instruction: request.system.as_ref().map(|s| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: Some(s.clone()) }],
            }),
            tools,
            generation_config: Some(generation_config),
        }
    }

    async fn post(&self, payload: &GeminiRequest) -> Result<GeminiResponse, DebateError> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(payload)
            .send()
            .await?;

        Ok(check_status(response).await?.json::<GeminiResponse>().await?)
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, DebateError> {
        let payload = self.build_request(request);
        tracing::debug!(model = %self.model, turns = request.turns.len(), "gemini generateContent");

        let body = with_retries(&self.policy, "gemini generateContent", || self.post(&payload)).await?;
        to_chat_reply(body)
    }
}

fn to_chat_reply(body: GeminiResponse) -> Result<ChatReply, DebateError> {
    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| DebateError::InvalidResponse("gemini returned no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    let citations = candidate
        .grounding_metadata
        .map(|meta| {
            meta.grounding_chunks
                .into_iter()
                .map(|chunk| {
                    let web = chunk.web.unwrap_or_default();
                    RawCitation { uri: web.uri, title: web.title }
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatReply { text, citations })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    google_search: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    grounding_metadata: Option<GeminiGroundingMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GeminiGroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GeminiGroundingChunk {
    web: Option<GeminiWebChunk>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiWebChunk {
    uri: Option<String>,
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatTurn;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> GeminiBackend {
        let policy = PolicyConfig {
            max_retries: 1,
            backoff_base_ms: 1,
            ..PolicyConfig::default()
        };
        GeminiBackend::new("test-key", "gemini-2.5-flash", policy)
            .unwrap()
            .with_api_base(server.uri())
    }

    #[test]
    fn test_build_request_shape() {
        let backend = GeminiBackend::new("k", "m", PolicyConfig::default()).unwrap();
        let request = ChatRequest {
            system: Some("be brief".to_string()),
            turns: vec![ChatTurn::user("hi"), ChatTurn::model("hello")],
            web_search: true,
            response_schema: None,
        };
        let value = serde_json::to_value(backend.build_request(&request)).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(value["systemInstruction"].get("role").is_none());
        assert_eq!(value["contents"][1]["role"], "model");
        assert!(value["tools"][0]["googleSearch"].is_object());
        assert!(value["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_build_request_with_schema() {
        let backend = GeminiBackend::new("k", "m", PolicyConfig::default()).unwrap();
        let request = ChatRequest {
            turns: vec![ChatTurn::user("judge")],
            response_schema: Some(serde_json::json!({"type": "OBJECT"})),
            ..ChatRequest::default()
        };
        let value = serde_json::to_value(backend.build_request(&request)).unwrap();

        assert!(value.get("tools").is_none());
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(value["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[tokio::test]
    async fn test_complete_extracts_text_and_citations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there."}]},
                    "groundingMetadata": {
                        "groundingChunks": [
                            {"web": {"uri": "https://a.example", "title": "A"}},
                            {"web": {"uri": "https://b.example"}}
                        ]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let reply = backend(&server)
            .complete(&ChatRequest {
                turns: vec![ChatTurn::user("hi")],
                ..ChatRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(reply.text, "Hello there.");
        assert_eq!(reply.citations.len(), 2);
        assert_eq!(reply.citations[0].title.as_deref(), Some("A"));
        assert!(reply.citations[1].title.is_none());
    }

    #[tokio::test]
    async fn test_complete_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(2)
            .mount(&server)
            .await;

        let err = backend(&server)
            .complete(&ChatRequest {
                turns: vec![ChatTurn::user("hi")],
                ..ChatRequest::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DebateError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = backend(&server)
            .complete(&ChatRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::InvalidResponse(_)));
    }
}
