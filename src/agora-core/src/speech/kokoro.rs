//! Offline synthesis with kokoro-tiny.

use kokoro_tiny::TtsEngine;

use super::SpeechSynthesizer;
use crate::error::DebateError;

pub struct KokoroSynthesizer {
    engine: TtsEngine,
    voice_id: String,
    available_voices: Vec<String>,
}

impl KokoroSynthesizer {
    /// Initialize the TTS engine (downloads the model on first run).
    pub async fn new(voice_id: impl Into<String>) -> Result<Self, DebateError> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| DebateError::TtsError(format!("Failed to initialize TTS: {}", e)))?;
        let available_voices = engine.voices();

        let synth = Self {
            engine,
            voice_id: voice_id.into(),
            available_voices,
        };
        synth.validate_voice()?;
        Ok(synth)
    }

    pub fn available_voices(&self) -> &[String] {
        &self.available_voices
    }

    fn validate_voice(&self) -> Result<(), DebateError> {
        if self.available_voices.contains(&self.voice_id) {
            return Ok(());
        }
        Err(DebateError::TtsError(format!(
            "Unknown voice '{}'. Try one of: {}",
            self.voice_id,
            similar_voices(&self.voice_id, &self.available_voices).join(", ")
        )))
    }
}

/// Voices sharing the requested voice's accent prefix (`af_`, `bm_`, ...),
/// or every voice when none do.
fn similar_voices<'a>(requested: &str, available: &'a [String]) -> Vec<&'a str> {
    let prefix = requested.split_once('_').map(|(accent, _)| accent).unwrap_or(requested);
    let mut matches: Vec<&str> = available
        .iter()
        .map(String::as_str)
        .filter(|v| v.split_once('_').is_some_and(|(accent, _)| accent == prefix))
        .collect();
    if matches.is_empty() {
        matches = available.iter().map(String::as_str).collect();
    }
    matches.sort_unstable();
    matches
}

impl SpeechSynthesizer for KokoroSynthesizer {
    fn synthesize(&mut self, text: &str) -> Result<Vec<f32>, DebateError> {
        self.engine
            .synthesize(text, Some(&self.voice_id))
            .map_err(|e| DebateError::TtsError(format!("Synthesis failed: {}", e)))
    }
}
