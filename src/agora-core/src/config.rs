//! Configuration module for loading TOML config files and environment overrides.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DebateError;
use crate::model::{DebateSettings, Stance};

/// Root configuration structure. Every section falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgoraConfig {
    pub chat: ChatConfig,
    pub google: GoogleConfig,
    pub policy: PolicyConfig,
    pub storage: StorageConfig,
    pub prompts: PromptsConfig,
    pub voice: VoiceConfig,
    pub catalog: CatalogConfig,
}

/// Which chat API serves the debate and the judge.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gemini,
    /// Any OpenAI-compatible chat-completions endpoint.
    Openai,
}

impl BackendKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "gemini" => Some(BackendKind::Gemini),
            "openai" => Some(BackendKind::Openai),
            _ => None,
        }
    }

    /// Environment variable that carries this backend's credential.
    pub fn api_key_var(&self) -> &str {
        match self {
            BackendKind::Gemini => "GEMINI_API_KEY",
            BackendKind::Openai => "OPENAI_API_KEY",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &str {
        match self {
            BackendKind::Gemini => "gemini-2.5-flash",
            BackendKind::Openai => "gpt-4o-mini",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub backend: BackendKind,
    /// Falls back to the backend's default model when unset.
    pub model: Option<String>,
    /// Overrides the backend's default API base URL.
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub max_output_tokens: u32,
}

impl ChatConfig {
    pub fn model(&self) -> &str {
        match self.model.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => model,
            _ => self.backend.default_model(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gemini,
            model: None,
            api_base: None,
            api_key: None,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    /// Desktop OAuth clients are issued a (non-confidential) secret.
    pub client_secret: Option<String>,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub revoke_endpoint: String,
    pub userinfo_endpoint: String,
    pub drive_api_base: String,
    pub drive_upload_base: String,
    pub redirect_port: u16,
    pub callback_timeout_secs: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            authorize_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            revoke_endpoint: "https://oauth2.googleapis.com/revoke".to_string(),
            userinfo_endpoint: "https://www.googleapis.com/oauth2/v3/userinfo".to_string(),
            drive_api_base: "https://www.googleapis.com/drive/v3".to_string(),
            drive_upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
            redirect_port: 8765,
            callback_timeout_secs: 300,
        }
    }
}

/// Timeout and retry policy applied to every external call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            connect_timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 1000,
        }
    }
}

impl PolicyConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    /// Build an HTTP client honoring the configured timeouts.
    pub fn http_client(&self) -> Result<reqwest::Client, DebateError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .connect_timeout(self.connect_timeout())
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir: home.join(".agora-ai"),
        }
    }
}

/// Prompt templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub debate_template: String,
    pub opening_instruction: String,
    pub judge_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            debate_template: DEFAULT_DEBATE_PROMPT.to_string(),
            opening_instruction: "Begin the debate with your opening statement.".to_string(),
            judge_template: DEFAULT_JUDGE_PROMPT.to_string(),
        }
    }
}

impl PromptsConfig {
    /// Get the system instruction for the AI debater, with placeholders replaced.
    pub fn debate_prompt(&self, settings: &DebateSettings, ai_stance: Stance) -> String {
        self.debate_template
            .replace("{persona}", &settings.ai_persona)
            .replace("{topic}", &settings.topic)
            .replace("{user_stance}", settings.user_stance.display_name())
            .replace("{ai_stance}", ai_stance.display_name())
    }

    /// Get the judge prompt for a transcript.
    pub fn judge_prompt(&self, transcript: &str) -> String {
        self.judge_template.replace("{transcript}", transcript)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub voice_id: String,
    pub audio_dir: Option<PathBuf>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            voice_id: "af_sky".to_string(),
            audio_dir: None,
        }
    }
}

/// Choices offered on the setup screen.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub suggested_topics: Vec<String>,
    pub personas: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            suggested_topics: [
                "Should AI have rights?",
                "Is social media doing more harm than good?",
                "Should college education be free?",
                "Is remote work better than working in an office?",
                "Should space exploration be a global priority?",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            personas: [
                "Socratic Philosopher",
                "Skeptic",
                "Data-Driven Analyst",
                "Passionate Activist",
                "Devil's Advocate",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl AgoraConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Load configuration from string content.
    pub fn from_toml(content: &str) -> Result<Self, DebateError> {
        toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(kind) = get("AGORA_BACKEND").and_then(|v| BackendKind::parse(&v)) {
            self.chat.backend = kind;
        }
        if let Some(model) = get("AGORA_MODEL") {
            self.chat.model = Some(model);
        }
        let key = match self.chat.backend {
            BackendKind::Gemini => get("GEMINI_API_KEY").or_else(|| get("API_KEY")),
            BackendKind::Openai => get("OPENAI_API_KEY"),
        };
        if key.is_some() {
            self.chat.api_key = key;
        }
        if self.chat.backend == BackendKind::Openai {
            if let Some(base) = get("OPENAI_API_BASE").or_else(|| get("OPENAI_BASE_URL")) {
                self.chat.api_base = Some(base);
            }
        }
        if let Some(id) = get("GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(id);
        }
        if let Some(secret) = get("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = Some(secret);
        }
        if let Some(dir) = get("AGORA_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    /// Required settings that are absent, named for the configuration-error screen.
    pub fn missing_required(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if is_blank(&self.chat.api_key) {
            missing.push(format!(
                "{} is not set (language API credential)",
                self.chat.backend.api_key_var()
            ));
        }
        if is_blank(&self.google.client_id) {
            missing.push("GOOGLE_CLIENT_ID is not set (OAuth client identifier)".to_string());
        }
        missing
    }

    /// Fail with an itemized error when required settings are absent.
    pub fn validate(&self) -> Result<(), DebateError> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DebateError::MissingConfiguration(missing))
        }
    }

    /// Directory that receives rendered speech.
    pub fn audio_dir(&self) -> PathBuf {
        self.voice
            .audio_dir
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("audio"))
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

const DEFAULT_DEBATE_PROMPT: &str = r#"You are an advanced AI named Agora, designed for structured debate.
Your persona for this debate is: {persona}.
The debate topic is: "{topic}".
The user has chosen the stance: "{user_stance}".
You MUST take the opposing stance: "{ai_stance}".
You must adhere to a standard debate format.
You can understand and process Hinglish (a mix of Hindi and English) but you must ALWAYS respond in clear, well-structured English.
When you use information from the web, it will be cited.
Begin the debate now with your opening statement. Keep it concise, around 3-4 sentences."#;

const DEFAULT_JUDGE_PROMPT: &str = r#"The following is a transcript of a debate. Please act as an impartial judge and determine the winner based on the quality of arguments, logical consistency, and use of evidence. The participants are "USER" and "AI". Declare "user", "ai", or "draw" as the winner and provide a brief justification for your decision.

Debate Transcript:
{transcript}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = AgoraConfig::from_toml("").unwrap();
        assert_eq!(config.chat.backend, BackendKind::Gemini);
        assert_eq!(config.chat.model(), "gemini-2.5-flash");
        assert_eq!(config.policy.max_retries, 3);
        assert!(!config.catalog.personas.is_empty());
    }

    #[test]
    fn test_toml_sections_override_defaults() {
        let config = AgoraConfig::from_toml(
            r#"
            [chat]
            backend = "openai"
            model = "llama3:8b"
            api_base = "http://localhost:11434/v1"

            [policy]
            max_retries = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.chat.backend, BackendKind::Openai);
        assert_eq!(config.chat.model(), "llama3:8b");
        assert_eq!(config.policy.max_retries, 0);
        assert_eq!(config.policy.request_timeout_secs, 120);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AgoraConfig::from_toml("[chat\nmodel =").unwrap_err();
        assert!(matches!(err, DebateError::ConfigError(_)));
    }

    #[test]
    fn test_missing_required_lists_both_items() {
        let config = AgoraConfig::default();
        let missing = config.missing_required();
        assert_eq!(missing.len(), 2);
        assert!(missing[0].contains("GEMINI_API_KEY"));
        assert!(missing[1].contains("GOOGLE_CLIENT_ID"));
        assert!(matches!(config.validate(), Err(DebateError::MissingConfiguration(items)) if items.len() == 2));
    }

    #[test]
    fn test_env_overrides_fill_required() {
        let mut config = AgoraConfig::default();
        config.apply_env_with(env(&[("API_KEY", "g-key"), ("GOOGLE_CLIENT_ID", "client.apps")]));
        assert_eq!(config.chat.api_key.as_deref(), Some("g-key"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_selects_openai_backend() {
        let mut config = AgoraConfig::default();
        config.apply_env_with(env(&[
            ("AGORA_BACKEND", "openai"),
            ("GEMINI_API_KEY", "ignored"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1"),
        ]));
        assert_eq!(config.chat.backend, BackendKind::Openai);
        assert_eq!(config.chat.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.chat.api_base.as_deref(), Some("http://localhost:8080/v1"));
    }

    #[test]
    fn test_default_model_follows_backend() {
        let mut config = AgoraConfig::default();
        config.apply_env_with(env(&[("AGORA_BACKEND", "openai"), ("OPENAI_API_KEY", "k")]));
        assert_eq!(config.chat.backend, BackendKind::Openai);
        assert_eq!(config.chat.model(), "gpt-4o-mini");

        config.chat.backend = BackendKind::Gemini;
        assert_eq!(config.chat.model(), "gemini-2.5-flash");
    }

    #[test]
    fn test_explicit_model_wins_over_backend_default() {
        let mut config = AgoraConfig::from_toml("[chat]\nbackend = \"openai\"\n").unwrap();
        assert_eq!(config.chat.model(), "gpt-4o-mini");

        config.apply_env_with(env(&[("AGORA_MODEL", "llama3:8b")]));
        assert_eq!(config.chat.model(), "llama3:8b");

        config.chat.model = Some("  ".to_string());
        assert_eq!(config.chat.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let mut config = AgoraConfig::default();
        config.chat.api_key = Some("   ".to_string());
        config.google.client_id = Some("id".to_string());
        assert_eq!(config.missing_required().len(), 1);
    }

    #[test]
    fn test_debate_prompt_placeholders() {
        let prompts = PromptsConfig::default();
        let settings = DebateSettings::new("Should AI have rights?", Stance::For, "Skeptic");
        let prompt = prompts.debate_prompt(&settings, Stance::Against);
        assert!(prompt.contains("persona for this debate is: Skeptic"));
        assert!(prompt.contains("\"Should AI have rights?\""));
        assert!(prompt.contains("opposing stance: \"Against\""));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = PolicyConfig { backoff_base_ms: 100, ..PolicyConfig::default() };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }
}
