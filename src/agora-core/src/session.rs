//! Session state machine.
//!
//! Owns the active debate, the history list and the current view, and drives
//! the engine, judge, persistence and auth adapters. The presentation layer
//! issues requests through methods and listens through a single callback.
//!
//! ```text
//! Setup ──start──▶ ActiveDebate ──end──▶ Judging ──verdict──▶ Setup
//! ActiveDebate ──end, no messages──▶ Setup
//! ActiveDebate ──back──▶ Setup ──resume──▶ ActiveDebate
//! Setup / ActiveDebate ──view──▶ History ──back──▶ Setup
//! ```

use std::sync::Arc;

use crate::auth::{AuthProvider, SignedIn};
use crate::engine::{Conversation, DebateEngine};
use crate::error::DebateError;
use crate::judge::Judge;
use crate::model::{DebateRecord, DebateSettings, DebateState, Message, UserProfile};
use crate::persistence::Persistence;

/// Which screen the session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Setup,
    ActiveDebate,
    Judging,
    History,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ViewChanged(View),
    MessageAppended(Message),
    TypingChanged(bool),
    RecordCreated(DebateRecord),
    /// History was reloaded from a different store; carries the new length.
    HistoryReplaced(usize),
    ProfileChanged(Option<UserProfile>),
}

pub type SessionCallback = Box<dyn Fn(SessionEvent) + Send + Sync>;

struct LiveDebate {
    state: DebateState,
    conversation: Conversation,
}

pub struct SessionMachine {
    view: View,
    active: Option<LiveDebate>,
    history: Vec<DebateRecord>,
    selected: Option<usize>,
    engine: DebateEngine,
    judge: Judge,
    persistence: Persistence,
    auth: Option<Arc<dyn AuthProvider>>,
    profile: Option<UserProfile>,
    callback: Option<SessionCallback>,
}

impl SessionMachine {
    pub fn new(engine: DebateEngine, judge: Judge, persistence: Persistence) -> Self {
        Self {
            view: View::Setup,
            active: None,
            history: Vec::new(),
            selected: None,
            engine,
            judge,
            persistence,
            auth: None,
            profile: None,
            callback: None,
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set a callback for session events.
    pub fn with_callback(mut self, callback: SessionCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn active(&self) -> Option<&DebateState> {
        self.active.as_ref().map(|live| &live.state)
    }

    pub fn history(&self) -> &[DebateRecord] {
        &self.history
    }

    /// The record shown in the History view.
    pub fn selected_record(&self) -> Option<&DebateRecord> {
        self.selected.and_then(|i| self.history.get(i))
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// Load persisted state. A saved debate is resumed: its conversation is
    /// rebuilt from the stored messages, and if the AI never delivered its
    /// opening the opening is requested again.
    pub async fn restore(&mut self) {
        self.history = self.persistence.load_history().await;
        emit(&self.callback, SessionEvent::HistoryReplaced(self.history.len()));

        let Some(mut state) = self.persistence.load_active_session() else {
            return;
        };
        tracing::info!(
            topic = %state.settings.topic,
            messages = state.messages.len(),
            "Resuming saved debate"
        );

        let needs_opening = state.messages.is_empty();
        state.is_ai_typing = needs_opening;
        let conversation = self.engine.resume(&state);
        self.persistence.save_active_session(Some(&state));
        self.active = Some(LiveDebate { state, conversation });
        self.set_view(View::ActiveDebate);

        if needs_opening {
            emit(&self.callback, SessionEvent::TypingChanged(true));
            if let Err(e) = self.opening_statement().await {
                tracing::warn!("Could not request the opening statement: {}", e);
            }
        }
    }

    /// Start a new debate. The AI is marked as typing until
    /// [`opening_statement`](Self::opening_statement) resolves.
    pub fn start_debate(&mut self, settings: DebateSettings) -> Result<&DebateState, DebateError> {
        if self.active.is_some() {
            return Err(DebateError::DebateInProgress);
        }
        settings.validate()?;

        let mut state = DebateState::new(settings);
        state.is_ai_typing = true;
        let conversation = self.engine.open(&state.settings, state.ai_stance());
        tracing::info!(
            topic = %state.settings.topic,
            user_stance = state.settings.user_stance.display_name(),
            persona = %state.settings.ai_persona,
            "Starting debate"
        );

        self.persistence.save_active_session(Some(&state));
        self.selected = None;
        self.set_view(View::ActiveDebate);
        emit(&self.callback, SessionEvent::TypingChanged(true));

        let live = self.active.insert(LiveDebate { state, conversation });
        Ok(&live.state)
    }

    /// Ask the AI to open the debate. Only valid before any message exists.
    pub async fn opening_statement(&mut self) -> Result<(), DebateError> {
        let live = self.active.as_mut().ok_or(DebateError::NoActiveDebate)?;
        if !live.state.messages.is_empty() {
            return Ok(());
        }

        let reply = live.conversation.opening_statement().await;
        let message = Message::ai(reply.text, reply.sources);
        live.state.messages.push(message.clone());
        live.state.is_ai_typing = false;
        self.persistence.save_active_session(Some(&live.state));

        emit(&self.callback, SessionEvent::MessageAppended(message));
        emit(&self.callback, SessionEvent::TypingChanged(false));
        Ok(())
    }

    /// Send one user turn and wait for the AI's reply.
    pub async fn send_message(&mut self, text: &str) -> Result<(), DebateError> {
        let live = self.active.as_mut().ok_or(DebateError::NoActiveDebate)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(DebateError::EmptyMessage);
        }
        if live.state.is_ai_typing {
            return Err(DebateError::TurnInProgress);
        }

        let user_message = Message::user(text);
        live.state.messages.push(user_message.clone());
        live.state.is_ai_typing = true;
        self.persistence.save_active_session(Some(&live.state));
        emit(&self.callback, SessionEvent::MessageAppended(user_message));
        emit(&self.callback, SessionEvent::TypingChanged(true));

        let reply = live.conversation.send(text).await;

        let ai_message = Message::ai(reply.text, reply.sources);
        live.state.messages.push(ai_message.clone());
        live.state.is_ai_typing = false;
        self.persistence.save_active_session(Some(&live.state));
        emit(&self.callback, SessionEvent::MessageAppended(ai_message));
        emit(&self.callback, SessionEvent::TypingChanged(false));
        Ok(())
    }

    /// End the active debate.
    ///
    /// A debate without messages is discarded without judging. Otherwise the
    /// transcript is judged and exactly one record is prepended to history,
    /// whatever the judge returns.
    pub async fn end_debate(&mut self) -> Result<Option<DebateRecord>, DebateError> {
        let live = self.active.take().ok_or(DebateError::NoActiveDebate)?;
        self.persistence.save_active_session(None);

        if live.state.messages.is_empty() {
            tracing::info!("Debate ended before any message, discarding it");
            self.set_view(View::Setup);
            return Ok(None);
        }

        self.set_view(View::Judging);
        let verdict = self.judge.judge(&live.state.messages).await;
        let record = DebateRecord::from_state(live.state, verdict);
        tracing::info!(winner = ?record.winner, "Debate judged");

        self.history.insert(0, record.clone());
        self.selected = None;
        emit(&self.callback, SessionEvent::RecordCreated(record.clone()));
        self.set_view(View::Setup);

        self.persistence.save_history(&self.history).await;
        Ok(Some(record))
    }

    /// Show the history record at `index` (0 is the newest).
    pub fn view_history(&mut self, index: usize) -> Result<&DebateRecord, DebateError> {
        if index >= self.history.len() {
            return Err(DebateError::UnknownRecord(format!(
                "#{} (history has {} entries)",
                index + 1,
                self.history.len()
            )));
        }
        self.selected = Some(index);
        self.set_view(View::History);
        Ok(&self.history[index])
    }

    /// Return to Setup from History or from a live debate. A live debate
    /// stays active and can be resumed.
    pub fn back(&mut self) {
        if matches!(self.view, View::History | View::ActiveDebate) {
            self.selected = None;
            self.set_view(View::Setup);
        }
    }

    /// Return to the live debate from Setup or History.
    pub fn resume_debate(&mut self) -> Result<&DebateState, DebateError> {
        if self.active.is_none() {
            return Err(DebateError::NoActiveDebate);
        }
        self.selected = None;
        self.set_view(View::ActiveDebate);
        self.active().ok_or(DebateError::NoActiveDebate)
    }

    /// Silent sign-in at startup. Does nothing without an auth provider.
    pub async fn initialize_auth(&mut self) {
        let Some(auth) = self.auth.clone() else {
            return;
        };
        let signed_in = auth.restore().await;
        self.on_auth_change(signed_in).await;
    }

    pub async fn sign_in(&mut self) -> Result<(), DebateError> {
        let auth = self
            .auth
            .clone()
            .ok_or_else(|| DebateError::Auth("sign-in is not configured".to_string()))?;
        let signed_in = auth.sign_in().await?;
        self.on_auth_change(Some(signed_in)).await;
        Ok(())
    }

    pub async fn sign_out(&mut self) {
        let Some(auth) = self.auth.clone() else {
            return;
        };
        auth.sign_out().await;
        self.on_auth_change(None).await;
    }

    /// Switch the history store and replace (never merge) in-memory history.
    async fn on_auth_change(&mut self, signed_in: Option<SignedIn>) {
        let (profile, remote) = match signed_in {
            Some(SignedIn { profile, history }) => (Some(profile), Some(history)),
            None => (None, None),
        };
        match &profile {
            Some(p) => tracing::info!(email = %p.email, "Signed in"),
            None if self.profile.is_some() => tracing::info!("Signed out"),
            None => {}
        }

        self.persistence.set_remote(remote);
        self.profile = profile;
        emit(&self.callback, SessionEvent::ProfileChanged(self.profile.clone()));

        self.history = self.persistence.load_history().await;
        if self.view == View::History {
            self.selected = None;
            self.set_view(View::Setup);
        }
        emit(&self.callback, SessionEvent::HistoryReplaced(self.history.len()));
    }

    fn set_view(&mut self, view: View) {
        if self.view != view {
            tracing::debug!(from = ?self.view, to = ?view, "View changed");
            self.view = view;
            emit(&self.callback, SessionEvent::ViewChanged(view));
        }
    }
}

/// Emit an event if a callback is registered.
fn emit(callback: &Option<SessionCallback>, event: SessionEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatReply;
    use crate::config::PromptsConfig;
    use crate::judge::FAILED_JUDGEMENT;
    use crate::model::{Sender, Stance, Verdict, Winner};
    use crate::persistence::{ACTIVE_SESSION_KEY, HistoryStore, LocalStore};
    use crate::testing::{MemoryStore, ScriptedBackend};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeAuth {
        remote: Arc<MemoryStore>,
        cached: AtomicBool,
        signed_out: AtomicBool,
    }

    impl FakeAuth {
        fn new(remote: Arc<MemoryStore>, cached: bool) -> Arc<Self> {
            Arc::new(Self {
                remote,
                cached: AtomicBool::new(cached),
                signed_out: AtomicBool::new(false),
            })
        }

        fn signed_in(&self) -> SignedIn {
            SignedIn {
                profile: UserProfile {
                    name: "Ada".into(),
                    email: "ada@example.com".into(),
                    picture: String::new(),
                },
                history: self.remote.clone(),
            }
        }
    }

    #[async_trait]
    impl AuthProvider for FakeAuth {
        async fn restore(&self) -> Option<SignedIn> {
            self.cached.load(Ordering::SeqCst).then(|| self.signed_in())
        }

        async fn sign_in(&self) -> Result<SignedIn, DebateError> {
            self.cached.store(true, Ordering::SeqCst);
            Ok(self.signed_in())
        }

        async fn sign_out(&self) {
            self.cached.store(false, Ordering::SeqCst);
            self.signed_out.store(true, Ordering::SeqCst);
        }
    }

    struct Harness {
        machine: SessionMachine,
        backend: Arc<ScriptedBackend>,
        local: LocalStore,
        events: Arc<Mutex<Vec<SessionEvent>>>,
        _dir: tempfile::TempDir,
    }

    fn harness_in(dir: tempfile::TempDir, replies: Vec<Result<ChatReply, DebateError>>) -> Harness {
        let backend = ScriptedBackend::new(replies);
        let local = LocalStore::new(dir.path());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let machine = SessionMachine::new(
            DebateEngine::new(backend.clone(), PromptsConfig::default()),
            Judge::new(backend.clone(), PromptsConfig::default()),
            Persistence::new(local.clone()),
        )
        .with_callback(Box::new(move |e: SessionEvent| sink.lock().unwrap().push(e)));

        Harness { machine, backend, local, events, _dir: dir }
    }

    fn harness(replies: Vec<Result<ChatReply, DebateError>>) -> Harness {
        harness_in(tempfile::tempdir().unwrap(), replies)
    }

    fn settings() -> DebateSettings {
        DebateSettings::new("Should AI have rights?", Stance::For, "Skeptic")
    }

    fn verdict_json(winner: &str) -> Result<ChatReply, DebateError> {
        ScriptedBackend::text(&format!(r#"{{"winner": "{winner}", "judgement": "Well argued."}}"#))
    }

    #[test]
    fn test_start_debate_sets_up_typing_session() {
        let mut h = harness(vec![]);
        let state = h.machine.start_debate(settings()).unwrap();

        assert_eq!(state.ai_stance(), Stance::Against);
        assert!(state.messages.is_empty());
        assert!(state.is_ai_typing);
        assert_eq!(h.machine.view(), View::ActiveDebate);
        assert!(h.local.get(ACTIVE_SESSION_KEY).unwrap().is_some());
    }

    #[test]
    fn test_start_debate_rejects_invalid_settings_and_live_debate() {
        let mut h = harness(vec![]);
        let err = h
            .machine
            .start_debate(DebateSettings::new("  ", Stance::For, "Skeptic"))
            .unwrap_err();
        assert!(matches!(err, DebateError::InvalidSettings(_)));
        assert_eq!(h.machine.view(), View::Setup);

        h.machine.start_debate(settings()).unwrap();
        let err = h.machine.start_debate(settings()).unwrap_err();
        assert!(matches!(err, DebateError::DebateInProgress));
    }

    #[tokio::test]
    async fn test_opening_then_exchange() {
        let mut h = harness(vec![
            ScriptedBackend::text("AI rights are premature."),
            ScriptedBackend::text("Interests are not rights."),
        ]);
        h.machine.start_debate(settings()).unwrap();
        h.machine.opening_statement().await.unwrap();

        let state = h.machine.active().unwrap();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].sender, Sender::Ai);
        assert!(!state.is_ai_typing);

        h.machine.send_message("  Rights protect interests.  ").await.unwrap();
        let state = h.machine.active().unwrap();
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[1].text, "Rights protect interests.");
        assert_eq!(state.messages[2].text, "Interests are not rights.");
        assert!(!state.is_ai_typing);

        let events = h.events.lock().unwrap();
        assert!(events.contains(&SessionEvent::TypingChanged(true)));
        assert_eq!(events.last(), Some(&SessionEvent::TypingChanged(false)));
    }

    #[tokio::test]
    async fn test_send_message_rejections_leave_state_unchanged() {
        let mut h = harness(vec![]);
        assert!(matches!(
            h.machine.send_message("hello").await,
            Err(DebateError::NoActiveDebate)
        ));

        h.machine.start_debate(settings()).unwrap();
        assert!(matches!(
            h.machine.send_message("   ").await,
            Err(DebateError::EmptyMessage)
        ));
        assert!(matches!(
            h.machine.send_message("too early").await,
            Err(DebateError::TurnInProgress)
        ));
        assert!(h.machine.active().unwrap().messages.is_empty());
        assert!(h.backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_end_without_messages_skips_judging() {
        let mut h = harness(vec![]);
        h.machine.start_debate(settings()).unwrap();

        let record = h.machine.end_debate().await.unwrap();

        assert!(record.is_none());
        assert!(h.machine.history().is_empty());
        assert!(h.machine.active().is_none());
        assert_eq!(h.machine.view(), View::Setup);
        assert!(h.backend.requests().is_empty());
        assert!(h.local.get(ACTIVE_SESSION_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_end_debate_prepends_judged_record() {
        let mut h = harness(vec![
            ScriptedBackend::text("Opening."),
            ScriptedBackend::text("Rebuttal."),
            verdict_json("user"),
        ]);
        h.machine.start_debate(settings()).unwrap();
        h.machine.opening_statement().await.unwrap();
        h.machine.send_message("Counter.").await.unwrap();

        let record = h.machine.end_debate().await.unwrap().unwrap();

        assert_eq!(record.winner, Winner::User);
        assert_eq!(record.messages().len(), 3);
        assert!(!record.debate.is_ai_typing);
        assert_eq!(h.machine.history()[0], record);
        assert!(h.machine.active().is_none());
        assert_eq!(h.machine.view(), View::Setup);

        let events = h.events.lock().unwrap();
        let judging = events.iter().position(|e| *e == SessionEvent::ViewChanged(View::Judging));
        let setup = events.iter().rposition(|e| *e == SessionEvent::ViewChanged(View::Setup));
        assert!(judging.unwrap() < setup.unwrap());
    }

    #[tokio::test]
    async fn test_failed_judging_still_records_a_draw() {
        let mut h = harness(vec![
            ScriptedBackend::text("Opening."),
            Err(DebateError::Api { status: 500, body: "down".into() }),
        ]);
        h.machine.start_debate(settings()).unwrap();
        h.machine.opening_statement().await.unwrap();

        let record = h.machine.end_debate().await.unwrap().unwrap();

        assert_eq!(record.winner, Winner::Draw);
        assert_eq!(record.judgement, FAILED_JUDGEMENT);
        assert_eq!(h.machine.history().len(), 1);

        let saved = h.local.load().await.unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_with_unique_ids() {
        let mut h = harness(vec![
            ScriptedBackend::text("First opening."),
            verdict_json("user"),
            ScriptedBackend::text("Second opening."),
            verdict_json("ai"),
        ]);
        h.machine.start_debate(DebateSettings::new("First topic", Stance::For, "Skeptic")).unwrap();
        h.machine.opening_statement().await.unwrap();
        let first = h.machine.end_debate().await.unwrap().unwrap();

        h.machine.start_debate(DebateSettings::new("Second topic", Stance::Against, "Skeptic")).unwrap();
        h.machine.opening_statement().await.unwrap();
        let second = h.machine.end_debate().await.unwrap().unwrap();

        let history = h.machine.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
        assert_ne!(first.id, second.id);
        assert_eq!(history[0].winner, Winner::Ai);
        assert_eq!(history[1].settings().topic, "First topic");

        let saved = h.local.load().await.unwrap();
        let ids: Vec<&str> = saved.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }

    #[tokio::test]
    async fn test_history_navigation() {
        let mut h = harness(vec![ScriptedBackend::text("Opening."), verdict_json("ai")]);
        h.machine.start_debate(settings()).unwrap();
        h.machine.opening_statement().await.unwrap();
        h.machine.end_debate().await.unwrap();

        assert!(matches!(h.machine.view_history(5), Err(DebateError::UnknownRecord(_))));
        assert_eq!(h.machine.view_history(0).unwrap().winner, Winner::Ai);
        assert_eq!(h.machine.view(), View::History);
        assert!(h.machine.selected_record().is_some());

        h.machine.back();
        assert_eq!(h.machine.view(), View::Setup);
        assert!(h.machine.selected_record().is_none());
    }

    #[tokio::test]
    async fn test_resume_returns_to_live_debate() {
        let mut h = harness(vec![ScriptedBackend::text("Opening.")]);
        assert!(matches!(h.machine.resume_debate(), Err(DebateError::NoActiveDebate)));

        h.machine.start_debate(settings()).unwrap();
        h.machine.opening_statement().await.unwrap();
        h.machine.back();
        assert_eq!(h.machine.view(), View::Setup);
        assert!(matches!(h.machine.start_debate(settings()), Err(DebateError::DebateInProgress)));

        assert_eq!(h.machine.resume_debate().unwrap().messages.len(), 1);
        assert_eq!(h.machine.view(), View::ActiveDebate);
    }

    #[tokio::test]
    async fn test_restore_resumes_saved_debate() {
        let dir = tempfile::tempdir().unwrap();
        // Saved while the AI was still answering.
        let mut saved = DebateState::new(settings());
        saved.messages.push(Message::ai("Opening.", Vec::new()));
        saved.messages.push(Message::user("Counter."));
        saved.is_ai_typing = true;
        Persistence::new(LocalStore::new(dir.path())).save_active_session(Some(&saved));

        let mut h = harness_in(dir, vec![ScriptedBackend::text("Reply.")]);
        h.machine.restore().await;

        assert_eq!(h.machine.view(), View::ActiveDebate);
        let state = h.machine.active().unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.ai_stance(), Stance::Against);
        assert!(!state.is_ai_typing);

        h.machine.send_message("Again.").await.unwrap();
        let requests = h.backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].turns.len(), 4);
    }

    #[tokio::test]
    async fn test_restore_requests_missing_opening() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path());
        Persistence::new(local.clone()).save_active_session(Some(&DebateState::new(settings())));

        let mut h = harness_in(dir, vec![ScriptedBackend::text("Opening.")]);
        h.machine.restore().await;

        let state = h.machine.active().unwrap();
        assert_eq!(state.messages.len(), 1);
        assert!(!state.is_ai_typing);
    }

    #[tokio::test]
    async fn test_restore_with_corrupt_session_starts_in_setup() {
        let dir = tempfile::tempdir().unwrap();
        LocalStore::new(dir.path()).set(ACTIVE_SESSION_KEY, "][").unwrap();

        let mut h = harness_in(dir, vec![]);
        h.machine.restore().await;

        assert_eq!(h.machine.view(), View::Setup);
        assert!(h.machine.active().is_none());
    }

    #[tokio::test]
    async fn test_sign_in_and_out_replace_history() {
        let mut h = harness(vec![ScriptedBackend::text("Opening."), verdict_json("draw")]);
        h.machine.start_debate(settings()).unwrap();
        h.machine.opening_statement().await.unwrap();
        h.machine.end_debate().await.unwrap();
        assert_eq!(h.machine.history().len(), 1);

        let remote_record = |topic: &str| {
            DebateRecord::from_state(
                DebateState::new(DebateSettings::new(topic, Stance::Against, "Historian")),
                Verdict { winner: Winner::Ai, judgement: "Sharper.".into() },
            )
        };
        let remote = MemoryStore::with(vec![remote_record("Remote two"), remote_record("Remote one")]);
        let auth = FakeAuth::new(remote.clone(), false);
        h.machine.auth = Some(auth.clone());

        h.machine.initialize_auth().await;
        assert!(h.machine.profile().is_none());
        assert_eq!(h.machine.history().len(), 1);

        h.machine.sign_in().await.unwrap();
        assert_eq!(h.machine.profile().unwrap().email, "ada@example.com");
        assert_eq!(h.machine.history().len(), 2);
        assert_eq!(h.machine.history()[0].settings().topic, "Remote two");

        h.machine.sign_out().await;
        assert!(auth.signed_out.load(Ordering::SeqCst));
        assert!(h.machine.profile().is_none());
        assert_eq!(h.machine.history().len(), 1);

        let events = h.events.lock().unwrap();
        assert!(events.contains(&SessionEvent::HistoryReplaced(2)));
        assert_eq!(events.last(), Some(&SessionEvent::HistoryReplaced(1)));
    }

    #[tokio::test]
    async fn test_records_go_to_remote_when_signed_in() {
        let remote = MemoryStore::with(Vec::new());
        let mut h = harness(vec![ScriptedBackend::text("Opening."), verdict_json("ai")]);
        h.machine.auth = Some(FakeAuth::new(remote.clone(), true));
        h.machine.initialize_auth().await;

        h.machine.start_debate(settings()).unwrap();
        h.machine.opening_statement().await.unwrap();
        h.machine.end_debate().await.unwrap();

        assert_eq!(remote.load().await.unwrap().len(), 1);
        assert!(h.local.load().await.unwrap().is_empty());
        assert!(h.local.get(ACTIVE_SESSION_KEY).unwrap().is_none());
    }
}
