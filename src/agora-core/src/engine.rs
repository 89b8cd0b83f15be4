//! Debate engine: the AI opponent's side of a debate.
//!
//! A [`Conversation`] is the stateful handle for one debate. It carries the
//! system instruction fixed at open time and the turn history, and never fails:
//! backend errors turn into an apology reply so the debate can continue.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::backend::{ChatBackend, ChatRequest, ChatTurn, RawCitation};
use crate::config::PromptsConfig;
use crate::model::{DebateSettings, DebateState, GroundingSource, Sender, Stance};

/// Reply used when the backend cannot be reached.
pub const APOLOGY_TEXT: &str =
    "I apologize, but I encountered an error and cannot continue the debate at this moment.";

/// An AI turn ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiReply {
    pub text: String,
    pub sources: Vec<GroundingSource>,
}

/// Opens conversations against a chat backend.
#[derive(Clone)]
pub struct DebateEngine {
    backend: Arc<dyn ChatBackend>,
    prompts: PromptsConfig,
}

impl DebateEngine {
    pub fn new(backend: Arc<dyn ChatBackend>, prompts: PromptsConfig) -> Self {
        Self { backend, prompts }
    }

    /// Open a fresh conversation for a debate.
    pub fn open(&self, settings: &DebateSettings, ai_stance: Stance) -> Conversation {
        Conversation {
            backend: Arc::clone(&self.backend),
            system_instruction: self.prompts.debate_prompt(settings, ai_stance),
            opening_instruction: self.prompts.opening_instruction.clone(),
            history: Vec::new(),
        }
    }

    /// Rebuild the conversation for a persisted debate.
    pub fn resume(&self, state: &DebateState) -> Conversation {
        let mut conversation = self.open(&state.settings, state.ai_stance());
        if state.messages.is_empty() {
            return conversation;
        }

        // The stored transcript starts with the AI's opening, which answered
        // the synthesized opening instruction.
        if state.messages[0].sender == Sender::Ai {
            conversation
                .history
                .push(ChatTurn::user(conversation.opening_instruction.clone()));
        }
        for message in &state.messages {
            conversation.history.push(match message.sender {
                Sender::User => ChatTurn::user(message.text.clone()),
                Sender::Ai => ChatTurn::model(message.text.clone()),
            });
        }
        conversation
    }
}

/// Stateful conversation handle for one debate.
pub struct Conversation {
    backend: Arc<dyn ChatBackend>,
    system_instruction: String,
    opening_instruction: String,
    history: Vec<ChatTurn>,
}

impl Conversation {
    /// Ask the AI for its opening statement.
    pub async fn opening_statement(&mut self) -> AiReply {
        let instruction = self.opening_instruction.clone();
        self.send(&instruction).await
    }

    /// Send one turn and wait for the AI's answer.
    ///
    /// The turn is committed to the history only when the backend answers.
    pub async fn send(&mut self, text: &str) -> AiReply {
        let mut turns = self.history.clone();
        turns.push(ChatTurn::user(text));

        let request = ChatRequest {
            system: Some(self.system_instruction.clone()),
            turns,
            web_search: true,
            response_schema: None,
        };

        match self.backend.complete(&request).await {
            Ok(reply) => {
                let answer = sanitize_response(&reply.text);
                let sources = dedupe_sources(reply.citations);
                self.history.push(ChatTurn::user(text));
                self.history.push(ChatTurn::model(answer.clone()));
                AiReply { text: answer, sources }
            }
            Err(e) => {
                tracing::error!(backend = self.backend.name(), "Error sending message to chat backend: {}", e);
                AiReply {
                    text: APOLOGY_TEXT.to_string(),
                    sources: Vec::new(),
                }
            }
        }
    }

    /// Number of committed turns.
    pub fn turn_count(&self) -> usize {
        self.history.len()
    }
}

/// Drop citations without a uri or title, then keep the first entry per uri.
pub fn dedupe_sources(citations: Vec<RawCitation>) -> Vec<GroundingSource> {
    let mut seen = HashSet::new();
    citations
        .into_iter()
        .filter_map(|c| match (c.uri, c.title) {
            (Some(uri), Some(title)) if !uri.is_empty() && !title.is_empty() => {
                Some(GroundingSource { uri, title })
            }
            _ => None,
        })
        .filter(|s| seen.insert(s.uri.clone()))
        .collect()
}

static REASONING_TAGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "reasoning",
        "thought",
        "scratchpad",
    ]
    .iter()
    .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag)).ok())
    .collect()
});

static EXTRA_BLANK_LINES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n{3,}").ok());

/// Strip model reasoning blocks like `<think>...</think>` from a reply.
fn sanitize_response(response: &str) -> String {
    let mut result = response.to_string();

    for re in REASONING_TAGS.iter() {
        result = re.replace_all(&result, "").to_string();
    }

    if let Some(re) = EXTRA_BLANK_LINES.as_ref() {
        result = re.replace_all(&result, "\n\n").to_string();
    }

    result.trim().to_string()
}
