//! Spoken AI replies.
//!
//! Each utterance is a blocking task that synthesizes sentence-sized chunks and
//! writes one WAV file. Progress is reported through [`SpeechEvent`]s and every
//! utterance owns a [`CancellationToken`]; starting a new utterance cancels the
//! one before it.

#[cfg(feature = "voice")]
mod kokoro;

#[cfg(feature = "voice")]
pub use kokoro::KokoroSynthesizer;

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DebateError;

pub const SAMPLE_RATE: u32 = 24_000;

/// Longest chunk handed to a synthesizer in one call.
const MAX_CHUNK_CHARS: usize = 200;

/// Silence between chunks (0.3 s) and after the last one (0.5 s).
const CHUNK_GAP_SAMPLES: usize = 7_200;
const TRAILING_SAMPLES: usize = 12_000;

/// Turns short text into mono samples at [`SAMPLE_RATE`].
pub trait SpeechSynthesizer: Send {
    fn synthesize(&mut self, text: &str) -> Result<Vec<f32>, DebateError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    Started { utterance: u64, chunks: usize },
    Chunk { utterance: u64, index: usize },
    Finished { utterance: u64, path: PathBuf },
    Failed { utterance: u64, error: String },
    Cancelled { utterance: u64 },
}

pub type SpeechCallback = Arc<dyn Fn(SpeechEvent) + Send + Sync>;

/// Render `text` to a WAV file at `path`, checking `token` between chunks.
///
/// Returns `Ok(None)` when cancelled; nothing is written in that case.
pub fn render(
    synth: &mut dyn SpeechSynthesizer,
    text: &str,
    path: &Path,
    token: &CancellationToken,
    utterance: u64,
    on_event: &dyn Fn(SpeechEvent),
) -> Result<Option<PathBuf>, DebateError> {
    let chunks = split_into_chunks(&strip_markdown(text), MAX_CHUNK_CHARS);
    on_event(SpeechEvent::Started { utterance, chunks: chunks.len() });

    let mut samples = Vec::new();
    for (index, chunk) in chunks.iter().enumerate() {
        if token.is_cancelled() {
            return Ok(None);
        }
        samples.extend(synth.synthesize(chunk)?);
        samples.extend(std::iter::repeat_n(0.0, CHUNK_GAP_SAMPLES));
        on_event(SpeechEvent::Chunk { utterance, index });
    }
    if token.is_cancelled() {
        return Ok(None);
    }
    samples.extend(std::iter::repeat_n(0.0, TRAILING_SAMPLES));

    write_wav(path, &samples)?;
    Ok(Some(path.to_path_buf()))
}

/// Write mono 16-bit PCM.
pub fn write_wav(path: &Path, samples: &[f32]) -> Result<(), DebateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_err = |e: hound::Error| DebateError::TtsError(format!("Failed to save WAV: {}", e));

    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(value).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)
}

/// Speaks AI replies one at a time.
pub struct Narrator {
    synth: Arc<Mutex<Box<dyn SpeechSynthesizer>>>,
    audio_dir: PathBuf,
    callback: SpeechCallback,
    current: Option<CancellationToken>,
    next_utterance: u64,
}

impl Narrator {
    pub fn new(synth: Box<dyn SpeechSynthesizer>, audio_dir: impl Into<PathBuf>, callback: SpeechCallback) -> Self {
        Self {
            synth: Arc::new(Mutex::new(synth)),
            audio_dir: audio_dir.into(),
            callback,
            current: None,
            next_utterance: 1,
        }
    }

    /// Start speaking `text`, cancelling anything still in progress.
    /// The WAV file is named after `id`.
    pub fn speak(&mut self, id: &str, text: &str) -> JoinHandle<()> {
        self.stop();

        let token = CancellationToken::new();
        self.current = Some(token.clone());
        let utterance = self.next_utterance;
        self.next_utterance += 1;

        let synth = Arc::clone(&self.synth);
        let callback = Arc::clone(&self.callback);
        let path = self.audio_dir.join(format!("{}.wav", sanitize_file_stem(id)));
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let emit = |event: SpeechEvent| callback(event);
            let result = match synth.lock() {
                Ok(mut guard) => render(&mut **guard, &text, &path, &token, utterance, &emit),
                Err(_) => Err(DebateError::TtsError("speech synthesizer is unavailable".to_string())),
            };
            match result {
                Ok(Some(path)) => emit(SpeechEvent::Finished { utterance, path }),
                Ok(None) => emit(SpeechEvent::Cancelled { utterance }),
                Err(e) => {
                    tracing::warn!("Speech synthesis failed: {}", e);
                    emit(SpeechEvent::Failed { utterance, error: e.to_string() });
                }
            }
        })
    }

    /// Cancel the utterance in progress, if any.
    pub fn stop(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }
}

impl Drop for Narrator {
    fn drop(&mut self) {
        self.stop();
    }
}

static MARKDOWN_MARKERS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(\*\*|__|\*|`|^#+\s*)").ok());

/// Remove emphasis and heading markers so they are not read aloud.
fn strip_markdown(text: &str) -> String {
    match MARKDOWN_MARKERS.as_ref() {
        Some(re) => text
            .lines()
            .map(|line| re.replace_all(line, "").into_owned())
            .collect::<Vec<_>>()
            .join("\n"),
        None => text.to_string(),
    }
}

fn sanitize_file_stem(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Pack sentences into chunks of at most `max_chars`. Lines never share a
/// chunk, so headings and list items are spoken on their own.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut pending = String::new();
        let pieces = line
            .split_inclusive(&['.', '!', '?', ';'][..])
            .flat_map(|sentence| fit_sentence(sentence.trim(), max_chars));

        for piece in pieces {
            if !pending.is_empty() && pending.len() + 1 + piece.len() > max_chars {
                chunks.push(std::mem::take(&mut pending));
            }
            if !pending.is_empty() {
                pending.push(' ');
            }
            pending.push_str(&piece);
        }
        if !pending.is_empty() {
            chunks.push(pending);
        }
    }

    chunks
}

/// Break an overlong sentence between words, preferring a comma once the
/// piece is half full. A single word longer than `max_chars` stays whole.
fn fit_sentence(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.is_empty() {
        return Vec::new();
    }
    if sentence.len() <= max_chars {
        return vec![sentence.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        if word.ends_with(',') && current.len() > max_chars / 2 {
            pieces.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Emits a fixed number of samples per chunk.
    struct ToneSynth {
        samples_per_chunk: usize,
        delay: Duration,
    }

    impl SpeechSynthesizer for ToneSynth {
        fn synthesize(&mut self, _text: &str) -> Result<Vec<f32>, DebateError> {
            std::thread::sleep(self.delay);
            Ok(vec![0.5; self.samples_per_chunk])
        }
    }

    struct BrokenSynth;

    impl SpeechSynthesizer for BrokenSynth {
        fn synthesize(&mut self, _text: &str) -> Result<Vec<f32>, DebateError> {
            Err(DebateError::TtsError("model missing".to_string()))
        }
    }

    fn collector() -> (SpeechCallback, Arc<Mutex<Vec<SpeechEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (Arc::new(move |e: SpeechEvent| sink.lock().unwrap().push(e)), events)
    }

    #[test]
    fn test_split_into_chunks() {
        let text = "Hello world. This is a test. Another sentence here.";
        let chunks = split_into_chunks(text, 30);
        assert_eq!(chunks, vec!["Hello world. This is a test.", "Another sentence here."]);
    }

    #[test]
    fn test_split_long_sentence_at_commas() {
        let text = "one two three, four five six, seven eight nine.";
        let chunks = split_into_chunks(text, 20);
        assert_eq!(chunks, vec!["one two three,", "four five six,", "seven eight nine."]);
    }

    #[test]
    fn test_split_keeps_lines_apart() {
        let chunks = split_into_chunks("Point\n\n- Rights need duties. Short.\n", 200);
        assert_eq!(chunks, vec!["Point", "- Rights need duties. Short."]);
    }

    #[test]
    fn test_split_without_commas_breaks_between_words() {
        let chunks = split_into_chunks("alpha beta gamma delta epsilon zeta", 12);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta", "epsilon zeta"]);
        assert!(chunks.iter().all(|c| c.len() <= 12));
    }

    #[test]
    fn test_strip_markdown() {
        assert_eq!(strip_markdown("## Point\n**Strong** and *soft* `code`"), "Point\nStrong and soft code");
    }

    #[test]
    fn test_render_writes_wav() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("audio").join("reply.wav");
        let mut synth = ToneSynth { samples_per_chunk: 100, delay: Duration::ZERO };
        let events = Mutex::new(Vec::new());

        let written = render(
            &mut synth,
            "First sentence. Second sentence.",
            &path,
            &CancellationToken::new(),
            7,
            &|e: SpeechEvent| events.lock().unwrap().push(e),
        )
        .unwrap();

        assert_eq!(written.as_deref(), Some(path.as_path()));
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.len() as usize, 100 + CHUNK_GAP_SAMPLES + TRAILING_SAMPLES);

        let events = events.into_inner().unwrap();
        assert_eq!(events[0], SpeechEvent::Started { utterance: 7, chunks: 1 });
        assert_eq!(events[1], SpeechEvent::Chunk { utterance: 7, index: 0 });
    }

    #[test]
    fn test_render_cancelled_writes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("reply.wav");
        let token = CancellationToken::new();
        token.cancel();
        let mut synth = ToneSynth { samples_per_chunk: 10, delay: Duration::ZERO };

        let written = render(&mut synth, "Something.", &path, &token, 1, &|_| {}).unwrap();
        assert!(written.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_new_utterance_cancels_previous() {
        let temp = tempfile::tempdir().unwrap();
        let (callback, events) = collector();
        let synth = ToneSynth { samples_per_chunk: 10, delay: Duration::from_millis(20) };
        let mut narrator = Narrator::new(Box::new(synth), temp.path(), callback);

        let long_text = "One. Two. Three. Four. Five. Six. Seven. Eight. ".repeat(20);
        let first = narrator.speak("msg-1", &long_text);
        let second = narrator.speak("msg-2", "Short reply.");
        first.await.unwrap();
        second.await.unwrap();

        let events = events.lock().unwrap();
        assert!(events.contains(&SpeechEvent::Cancelled { utterance: 1 }));
        assert!(events.contains(&SpeechEvent::Finished {
            utterance: 2,
            path: temp.path().join("msg-2.wav")
        }));
        assert!(!temp.path().join("msg-1.wav").exists());
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let (callback, events) = collector();
        let mut narrator = Narrator::new(Box::new(BrokenSynth), temp.path(), callback);

        narrator.speak("msg-1", "Hello.").await.unwrap();

        let events = events.lock().unwrap();
        assert!(matches!(events.last(), Some(SpeechEvent::Failed { utterance: 1, .. })));
    }
}
