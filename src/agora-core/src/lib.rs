//! Agora Core Library
//!
//! A debate against an AI opponent: the session state machine, the adapters it
//! drives (chat engine, judge, persistence, Google sign-in) and spoken replies.

pub mod auth;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod judge;
pub mod model;
pub mod persistence;
pub mod session;
pub mod speech;

#[cfg(test)]
mod testing;

pub use auth::{AuthProvider, GoogleAuth, SignedIn};
pub use backend::{ChatBackend, GeminiBackend, OpenAiBackend};
pub use config::AgoraConfig;
pub use engine::{Conversation, DebateEngine};
pub use error::DebateError;
pub use judge::Judge;
pub use model::{
    DebateRecord, DebateSettings, DebateState, GroundingSource, Message, Sender, Stance, UserProfile, Verdict,
    Winner,
};
pub use persistence::{DriveHistoryStore, HistoryStore, LocalStore, Persistence};
pub use session::{SessionCallback, SessionEvent, SessionMachine, View};
pub use speech::{Narrator, SpeechEvent, SpeechSynthesizer};
