//! Agora AI CLI
//!
//! Debate an AI opponent from the terminal. Finished debates are judged and
//! kept in a history, stored locally or in Google Drive when signed in.

mod app;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use agora_core::config::BackendKind;
use agora_core::{
    AgoraConfig, ChatBackend, DebateEngine, DebateError, DebateSettings, GoogleAuth, Judge, LocalStore, Narrator, Persistence,
    SessionMachine, Stance, backend,
};
use clap::{ArgAction, Parser};
use colored::Colorize;

use crate::app::App;

#[derive(Parser)]
#[command(
    name = "agora",
    version,
    about = "Agora AI - debate an AI opponent",
    long_about = "Pick a topic and a side, argue against an AI persona, and let an AI judge decide who won."
)]
struct Cli {
    /// Path to a TOML configuration file (default: <data dir>/config.toml if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Start a debate on this topic right away
    #[arg(long, value_name = "TOPIC")]
    topic: Option<String>,

    /// Your stance when starting with --topic: for or against
    #[arg(long, default_value = "for", value_name = "STANCE")]
    stance: String,

    /// AI persona when starting with --topic
    #[arg(long, value_name = "PERSONA")]
    persona: Option<String>,

    /// Chat backend: gemini or openai
    #[arg(long, value_name = "BACKEND")]
    backend: Option<String>,

    /// Model name for the chat backend
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Directory for saved debates, history and credentials
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Render AI replies to speech
    #[arg(long)]
    voice: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(DebateError::MissingConfiguration(missing)) => {
            render::print_configuration_error(&missing);
            std::process::exit(1);
        }
        Err(e) => {
            render::print_configuration_error(&[e.to_string()]);
            std::process::exit(1);
        }
    };

    let start_settings = match &cli.topic {
        Some(topic) => {
            let Some(stance) = Stance::parse(&cli.stance) else {
                eprintln!(
                    "{} Unknown stance '{}'. Use `for` or `against`.",
                    "Error:".red().bold(),
                    cli.stance
                );
                std::process::exit(1);
            };
            let persona = cli
                .persona
                .clone()
                .or_else(|| config.catalog.personas.first().cloned())
                .unwrap_or_else(|| "Skeptic".to_string());
            Some(DebateSettings::new(topic.clone(), stance, persona))
        }
        None => None,
    };

    let chat = backend::from_config(&config)?;
    tracing::info!(backend = chat.name(), model = config.chat.model(), "Chat backend ready");

    let engine = DebateEngine::new(Arc::clone(&chat), config.prompts.clone());
    let judge = Judge::new(chat, config.prompts.clone());
    let persistence = Persistence::new(LocalStore::new(&config.storage.data_dir));
    let auth = GoogleAuth::new(config.google.clone(), config.policy.clone(), &config.storage.data_dir)?;

    let machine = SessionMachine::new(engine, judge, persistence)
        .with_auth(Arc::new(auth))
        .with_callback(render::create_console_callback());

    let narrator = build_narrator(&config).await;
    let mut app = App::new(machine, config.catalog.clone(), narrator);

    render::print_banner();
    app.machine_mut().restore().await;
    app.machine_mut().initialize_auth().await;

    if let Some(settings) = start_settings {
        if let Err(e) = app.begin_debate(settings).await {
            eprintln!("{} {}", "Error:".red().bold(), e);
        }
    }

    app.run().await
}

/// Setup logging based on verbosity level. Logs go to stderr.
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

/// Layer configuration: TOML file, then environment, then flags.
fn load_config(cli: &Cli) -> Result<AgoraConfig, DebateError> {
    let mut config = match &cli.config {
        Some(path) => AgoraConfig::load(path)?,
        None => {
            let data_dir = cli
                .data_dir
                .clone()
                .unwrap_or_else(|| AgoraConfig::default().storage.data_dir);
            let path = data_dir.join("config.toml");
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading configuration");
                AgoraConfig::load(&path)?
            } else {
                AgoraConfig::default()
            }
        }
    };

    // The backend decides which API key variable applies, so a --backend
    // flag must be in place before the environment is read.
    let backend_flag = match &cli.backend {
        Some(name) => Some(
            BackendKind::parse(name)
                .ok_or_else(|| DebateError::ConfigError(format!("Unknown backend '{}'. Use gemini or openai.", name)))?,
        ),
        None => None,
    };
    if let Some(kind) = backend_flag {
        config.chat.backend = kind;
    }
    config.apply_env_with(|key| {
        if key == "AGORA_BACKEND" && backend_flag.is_some() {
            return None;
        }
        std::env::var(key).ok()
    });

    if let Some(model) = &cli.model {
        config.chat.model = Some(model.clone());
    }
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    if cli.voice {
        config.voice.enabled = true;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(feature = "voice")]
async fn build_narrator(config: &AgoraConfig) -> Option<Narrator> {
    use agora_core::speech::KokoroSynthesizer;

    if !config.voice.enabled {
        return None;
    }
    println!("{}", "Loading the speech model...".dimmed());
    match KokoroSynthesizer::new(config.voice.voice_id.clone()).await {
        Ok(synth) => Some(Narrator::new(
            Box::new(synth),
            config.audio_dir(),
            render::create_speech_callback(),
        )),
        Err(e) => {
            eprintln!("{} {}", "Voice output disabled:".yellow(), e);
            None
        }
    }
}

#[cfg(not(feature = "voice"))]
async fn build_narrator(config: &AgoraConfig) -> Option<Narrator> {
    if config.voice.enabled {
        eprintln!(
            "{}",
            "Voice output needs a build with `--features voice`; continuing without it.".yellow()
        );
    }
    None
}
