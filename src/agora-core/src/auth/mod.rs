//! Auth adapter.
//!
//! A provider restores a previous sign-in silently at startup, runs interactive
//! consent on request, and signs out. A successful sign-in yields the user's
//! profile together with the remote history store that belongs to them.

mod google;
mod pkce;
mod server;
mod token;

pub use google::GoogleAuth;
pub use pkce::{GOOGLE_SCOPES, PkcePair, build_authorize_url, generate_pkce_pair};
pub use server::{CALLBACK_PATH, CallbackServer, OAuthCallback};
pub use token::{StoredToken, TokenStore};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DebateError;
use crate::model::UserProfile;
use crate::persistence::HistoryStore;

/// An authenticated user and the history store scoped to their credential.
#[derive(Clone)]
pub struct SignedIn {
    pub profile: UserProfile,
    pub history: Arc<dyn HistoryStore>,
}

impl std::fmt::Debug for SignedIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedIn")
            .field("profile", &self.profile)
            .field("history", &self.history.name())
            .finish()
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Startup check without user interaction. `None` when there is no prior
    /// consent or it can no longer be used; never an error.
    async fn restore(&self) -> Option<SignedIn>;

    /// Sign in, asking for consent only when no cached credential works.
    async fn sign_in(&self) -> Result<SignedIn, DebateError>;

    /// Revoke and forget the credential. Failures are logged.
    async fn sign_out(&self);
}
