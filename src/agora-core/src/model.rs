//! Debate data model.
//!
//! These types are persisted as JSON, so their serialized shape is part of the
//! storage format shared by the local store and the remote history file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DebateError;

/// The side a participant argues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Stance {
    /// Arguing in favor of the topic.
    For,
    /// Arguing against the topic.
    Against,
}

impl Stance {
    /// The opposing stance.
    pub fn opposite(self) -> Self {
        match self {
            Stance::For => Stance::Against,
            Stance::Against => Stance::For,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Stance::For => "For",
            Stance::Against => "Against",
        }
    }

    /// Parse user input such as `for`, `pro`, `against` or `con`.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "for" | "pro" | "f" => Some(Stance::For),
            "against" | "con" | "a" => Some(Stance::Against),
            _ => None,
        }
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    /// Tag used for this sender in judge transcripts.
    pub fn transcript_tag(&self) -> &str {
        match self {
            Sender::User => "USER",
            Sender::Ai => "AI",
        }
    }
}

/// Outcome of a judged debate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    User,
    Ai,
    Draw,
}

impl Winner {
    /// Case-insensitive match against the accepted verdict tokens.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "user" => Some(Winner::User),
            "ai" => Some(Winner::Ai),
            "draw" => Some(Winner::Draw),
            _ => None,
        }
    }

    /// Result badge from the user's point of view.
    pub fn badge(&self) -> &str {
        match self {
            Winner::User => "Win",
            Winner::Ai => "Loss",
            Winner::Draw => "Draw",
        }
    }
}

/// A citation attached to an AI reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundingSource {
    pub uri: String,
    pub title: String,
}

/// A single chat message in a debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<GroundingSource>>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            sender: Sender::User,
            sources: None,
        }
    }

    pub fn ai(text: impl Into<String>, sources: Vec<GroundingSource>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            sender: Sender::Ai,
            sources: Some(sources),
        }
    }

    /// Sources of this message, empty when none were attached.
    pub fn sources(&self) -> &[GroundingSource] {
        self.sources.as_deref().unwrap_or_default()
    }
}

/// Settings chosen on the setup screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DebateSettings {
    pub topic: String,
    pub user_stance: Stance,
    pub ai_persona: String,
}

impl DebateSettings {
    pub fn new(topic: impl Into<String>, user_stance: Stance, ai_persona: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            user_stance,
            ai_persona: ai_persona.into(),
        }
    }

    /// Reject settings that cannot start a debate.
    pub fn validate(&self) -> Result<(), DebateError> {
        if self.topic.trim().is_empty() {
            return Err(DebateError::InvalidSettings("topic must not be empty".to_string()));
        }
        if self.ai_persona.trim().is_empty() {
            return Err(DebateError::InvalidSettings("persona must not be empty".to_string()));
        }
        Ok(())
    }
}

/// The in-progress debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebateState {
    pub settings: DebateSettings,
    pub messages: Vec<Message>,
    ai_stance: Stance,
    pub is_ai_typing: bool,
}

impl DebateState {
    /// Create an empty session; the AI stance is derived from the user's.
    pub fn new(settings: DebateSettings) -> Self {
        let ai_stance = settings.user_stance.opposite();
        Self {
            settings,
            messages: Vec::new(),
            ai_stance,
            is_ai_typing: false,
        }
    }

    pub fn ai_stance(&self) -> Stance {
        self.ai_stance
    }

    /// Restore the stance invariant on data read back from storage.
    pub(crate) fn normalize(mut self) -> Self {
        self.ai_stance = self.settings.user_stance.opposite();
        self
    }

    pub fn last_ai_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.sender == Sender::Ai)
    }
}

/// A finished debate kept in history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebateRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub debate: DebateState,
    pub winner: Winner,
    pub judgement: String,
}

impl DebateRecord {
    /// Finalize a detached session snapshot with its verdict.
    pub fn from_state(mut debate: DebateState, verdict: Verdict) -> Self {
        debate.is_ai_typing = false;
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            debate,
            winner: verdict.winner,
            judgement: verdict.judgement,
        }
    }

    pub(crate) fn normalize(mut self) -> Self {
        self.debate = self.debate.normalize();
        self
    }

    pub fn settings(&self) -> &DebateSettings {
        &self.debate.settings
    }

    pub fn messages(&self) -> &[Message] {
        &self.debate.messages
    }
}

/// Result of judging a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub winner: Winner,
    pub judgement: String,
}

/// Profile of the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub picture: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_stance_is_complement() {
        for stance in [Stance::For, Stance::Against] {
            let state = DebateState::new(DebateSettings::new("Topic", stance, "Skeptic"));
            assert_eq!(state.ai_stance(), stance.opposite());
            assert_ne!(state.ai_stance(), stance);
        }
    }

    #[test]
    fn test_stance_parse() {
        assert_eq!(Stance::parse("FOR"), Some(Stance::For));
        assert_eq!(Stance::parse(" con "), Some(Stance::Against));
        assert_eq!(Stance::parse("maybe"), None);
    }

    #[test]
    fn test_winner_tokens_are_case_insensitive() {
        assert_eq!(Winner::from_token("User"), Some(Winner::User));
        assert_eq!(Winner::from_token("AI"), Some(Winner::Ai));
        assert_eq!(Winner::from_token("Draw"), Some(Winner::Draw));
        assert_eq!(Winner::from_token("tie"), None);
    }

    #[test]
    fn test_settings_validation() {
        assert!(DebateSettings::new("  ", Stance::For, "Skeptic").validate().is_err());
        assert!(DebateSettings::new("Topic", Stance::For, "").validate().is_err());
        assert!(DebateSettings::new("Topic", Stance::For, "Skeptic").validate().is_ok());
    }

    #[test]
    fn test_state_json_shape() {
        let mut state = DebateState::new(DebateSettings::new("Should AI have rights?", Stance::For, "Skeptic"));
        state.messages.push(Message::user("hello"));
        let value = serde_json::to_value(&state).unwrap();

        assert_eq!(value["settings"]["userStance"], "For");
        assert_eq!(value["settings"]["aiPersona"], "Skeptic");
        assert_eq!(value["aiStance"], "Against");
        assert_eq!(value["isAiTyping"], false);
        assert_eq!(value["messages"][0]["sender"], "user");
        assert!(value["messages"][0].get("sources").is_none());
    }

    #[test]
    fn test_record_flattens_state() {
        let state = DebateState::new(DebateSettings::new("Topic", Stance::Against, "Skeptic"));
        let record = DebateRecord::from_state(
            state,
            Verdict { winner: Winner::Ai, judgement: "Stronger evidence.".to_string() },
        );
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["winner"], "ai");
        assert_eq!(value["aiStance"], "For");
        assert_eq!(value["settings"]["topic"], "Topic");
        assert!(value["timestamp"].is_string());

        let parsed: DebateRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_normalize_repairs_stance() {
        let json = r#"{
            "settings": {"topic": "T", "userStance": "For", "aiPersona": "P"},
            "messages": [],
            "aiStance": "For",
            "isAiTyping": false
        }"#;
        let state: DebateState = serde_json::from_str(json).unwrap();
        assert_eq!(state.normalize().ai_stance(), Stance::Against);
    }

    #[test]
    fn test_normalize_repairs_record_stance() {
        let json = r#"{
            "id": "r1",
            "timestamp": "2025-01-01T00:00:00Z",
            "settings": {"topic": "T", "userStance": "Against", "aiPersona": "P"},
            "messages": [],
            "aiStance": "Against",
            "isAiTyping": false,
            "winner": "draw",
            "judgement": "Even."
        }"#;
        let record: DebateRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.normalize().debate.ai_stance(), Stance::For);
    }
}
