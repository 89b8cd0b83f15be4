//! OpenAI-compatible chat-completions backend.
//!
//! Works with any server speaking the chat-completions protocol (OpenAI,
//! Ollama, llama.cpp, vLLM...). These servers return no grounding metadata, so
//! replies never carry citations, and JSON output is requested through the
//! prompt rather than a response schema.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;

use super::{ChatBackend, ChatReply, ChatRequest, TurnRole, with_retries};
use crate::config::PolicyConfig;
use crate::error::DebateError;

pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
    max_output_tokens: u32,
    policy: PolicyConfig,
}

impl OpenAiBackend {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        policy: PolicyConfig,
    ) -> Result<Self, DebateError> {
        let config = OpenAIConfig::new()
            .with_api_key(api_key.into())
            .with_api_base(api_base.into());

        let client = Client::with_config(config).with_http_client(policy.http_client()?);

        Ok(Self {
            client,
            model: model.into(),
            max_output_tokens: 1024,
            policy,
        })
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn build_messages(request: &ChatRequest) -> Vec<ChatCompletionRequestMessage> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);

        let system = match (&request.system, &request.response_schema) {
            (Some(system), Some(schema)) => Some(format!("{}\n\n{}", system, json_instruction(schema))),
            (Some(system), None) => Some(system.clone()),
            (None, Some(schema)) => Some(json_instruction(schema)),
            (None, None) => None,
        };

        if let Some(system) = system {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: system.into(),
                    name: None,
                },
            ));
        }

        for turn in &request.turns {
            let message = match turn.role {
                TurnRole::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: turn.text.clone().into(),
                    name: None,
                }),
                TurnRole::Model => {
                    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                        content: Some(turn.text.clone().into()),
                        name: None,
                        tool_calls: None,
                        refusal: None,
                        audio: None,
                        function_call: None,
                    })
                }
            };
            messages.push(message);
        }

        messages
    }

    async fn create(&self, request: &ChatRequest) -> Result<String, DebateError> {
        let completion = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(self.max_output_tokens)
            .messages(Self::build_messages(request))
            .build()?;

        let response = self.client.chat().create(completion).await?;
        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(content)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, DebateError> {
        tracing::debug!(model = %self.model, turns = request.turns.len(), "chat completion");
        let text = with_retries(&self.policy, "chat completion", || self.create(request)).await?;
        Ok(ChatReply { text, citations: Vec::new() })
    }
}

fn json_instruction(schema: &serde_json::Value) -> String {
    format!(
        "Respond with a single JSON object and nothing else. It must match this JSON schema:\n{}",
        schema
    )
}
