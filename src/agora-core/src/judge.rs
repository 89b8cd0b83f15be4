//! Post-debate judging.

use std::sync::Arc;

use serde::Deserialize;

use crate::backend::{ChatBackend, ChatRequest, ChatTurn};
use crate::config::PromptsConfig;
use crate::error::DebateError;
use crate::model::{Message, Verdict, Winner};

/// Justification used when the judge names a winner outside user/ai/draw.
pub const UNCLEAR_JUDGEMENT: &str = "The judge's decision was unclear, resulting in a draw.";

/// Justification used when judging fails outright.
pub const FAILED_JUDGEMENT: &str = "An error occurred during the judging process.";

#[derive(Debug, Deserialize)]
struct RawVerdict {
    winner: String,
    judgement: String,
}

/// Scores a finished transcript through a chat backend.
#[derive(Clone)]
pub struct Judge {
    backend: Arc<dyn ChatBackend>,
    prompts: PromptsConfig,
}

impl Judge {
    pub fn new(backend: Arc<dyn ChatBackend>, prompts: PromptsConfig) -> Self {
        Self { backend, prompts }
    }

    /// Judge a transcript. Never fails.
    ///
    /// Failures come back as a draw with [`FAILED_JUDGEMENT`], which is the
    /// same winner a judge can legitimately declare; only the justification
    /// text tells the two apart.
    pub async fn judge(&self, messages: &[Message]) -> Verdict {
        match self.try_judge(messages).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!("Error determining debate winner, recording a draw: {}", e);
                Verdict {
                    winner: Winner::Draw,
                    judgement: FAILED_JUDGEMENT.to_string(),
                }
            }
        }
    }

    async fn try_judge(&self, messages: &[Message]) -> Result<Verdict, DebateError> {
        let prompt = self.prompts.judge_prompt(&transcript(messages));
        let request = ChatRequest {
            system: None,
            turns: vec![ChatTurn::user(prompt)],
            web_search: false,
            response_schema: Some(verdict_schema()),
        };

        let reply = self.backend.complete(&request).await?;
        parse_verdict(&reply.text)
    }
}

/// Render messages as `SENDER: text` blocks separated by blank lines.
pub fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.sender.transcript_tag(), m.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn verdict_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "winner": {
                "type": "STRING",
                "description": "The winner of the debate. Must be one of: 'user', 'ai', or 'draw'."
            },
            "judgement": {
                "type": "STRING",
                "description": "A brief justification for the decision, explaining the reasoning."
            }
        },
        "required": ["winner", "judgement"]
    })
}

fn parse_verdict(text: &str) -> Result<Verdict, DebateError> {
    let raw: RawVerdict = serde_json::from_str(strip_code_fence(text))?;

    match Winner::from_token(&raw.winner) {
        Some(winner) => Ok(Verdict { winner, judgement: raw.judgement }),
        None => {
            tracing::warn!(winner = %raw.winner, "Judge returned an unrecognized winner");
            Ok(Verdict {
                winner: Winner::Draw,
                judgement: UNCLEAR_JUDGEMENT.to_string(),
            })
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
