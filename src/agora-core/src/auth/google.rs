//! Google sign-in for a desktop client.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::pkce::{build_authorize_url, generate_pkce_pair};
use super::server::CallbackServer;
use super::token::{StoredToken, TokenResponse, TokenStore};
use super::{AuthProvider, SignedIn};
use crate::backend::{check_status, with_retries};
use crate::config::{GoogleConfig, PolicyConfig};
use crate::error::DebateError;
use crate::model::UserProfile;
use crate::persistence::DriveHistoryStore;

pub struct GoogleAuth {
    http: reqwest::Client,
    google: GoogleConfig,
    policy: PolicyConfig,
    client_id: String,
    tokens: TokenStore,
    open_browser: bool,
}

impl GoogleAuth {
    pub fn new(google: GoogleConfig, policy: PolicyConfig, data_dir: &Path) -> Result<Self, DebateError> {
        let client_id = google
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DebateError::MissingConfiguration(vec!["GOOGLE_CLIENT_ID".to_string()]))?;

        Ok(Self {
            http: policy.http_client()?,
            google,
            policy,
            client_id,
            tokens: TokenStore::new(data_dir),
            open_browser: true,
        })
    }

    /// Skip launching the system browser; the authorize URL is still logged.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.tokens
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, DebateError> {
        let mut form: Vec<(&str, &str)> = form.to_vec();
        form.push(("client_id", &self.client_id));
        if let Some(secret) = self.google.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        with_retries(&self.policy, "oauth token", || async {
            let response = self
                .http
                .post(&self.google.token_endpoint)
                .form(&form)
                .send()
                .await?;
            Ok(check_status(response).await?.json::<TokenResponse>().await?)
        })
        .await
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<StoredToken, DebateError> {
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", code_verifier),
                ("redirect_uri", redirect_uri),
            ])
            .await?;
        Ok(response.into_stored(None))
    }

    pub async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, DebateError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| DebateError::Auth("cached credential has no refresh token".to_string()))?;

        let response = self
            .request_token(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .await?;
        Ok(response.into_stored(token.refresh_token.clone()))
    }

    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, DebateError> {
        with_retries(&self.policy, "userinfo", || async {
            let response = self
                .http
                .get(&self.google.userinfo_endpoint)
                .bearer_auth(access_token)
                .send()
                .await?;
            Ok(check_status(response).await?.json::<UserProfile>().await?)
        })
        .await
    }

    async fn revoke(&self, token: &StoredToken) -> Result<(), DebateError> {
        let value = token.refresh_token.as_deref().unwrap_or(&token.access_token);
        let response = self
            .http
            .post(&self.google.revoke_endpoint)
            .form(&[("token", value)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// A usable access token from the cache, refreshed and re-saved if expired.
    async fn cached_token(&self) -> Result<StoredToken, DebateError> {
        let token = self
            .tokens
            .load()
            .ok_or_else(|| DebateError::Auth("no cached credential".to_string()))?;
        if !token.is_expired() {
            return Ok(token);
        }

        tracing::debug!("Cached access token expired, refreshing");
        let refreshed = self.refresh(&token).await?;
        self.tokens.save(&refreshed)?;
        Ok(refreshed)
    }

    async fn interactive_consent(&self) -> Result<StoredToken, DebateError> {
        let server = CallbackServer::bind(self.google.redirect_port).await?;
        let redirect_uri = server.redirect_uri()?;
        let pkce = generate_pkce_pair();
        let state = uuid::Uuid::new_v4().to_string();

        let url = build_authorize_url(
            &self.google.authorize_endpoint,
            &self.client_id,
            &redirect_uri,
            &pkce.challenge,
            &state,
        );

        tracing::info!("Complete sign-in in your browser: {}", url);
        if self.open_browser {
            if let Err(e) = webbrowser::open(&url) {
                tracing::warn!("Failed to open a browser, visit the URL manually: {}", e);
            }
        }

        let callback = server
            .wait(state, Duration::from_secs(self.google.callback_timeout_secs))
            .await?;

        let token = self.exchange_code(&callback.code, &pkce.verifier, &redirect_uri).await?;
        self.tokens.save(&token)?;
        Ok(token)
    }

    async fn signed_in(&self, token: StoredToken) -> Result<SignedIn, DebateError> {
        let profile = self.fetch_profile(&token.access_token).await?;
        let history = DriveHistoryStore::new(
            self.http.clone(),
            token.access_token,
            &self.google,
            self.policy.clone(),
        );
        Ok(SignedIn {
            profile,
            history: Arc::new(history),
        })
    }
}

#[async_trait]
impl AuthProvider for GoogleAuth {
    async fn restore(&self) -> Option<SignedIn> {
        let token = match self.cached_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!("No silent sign-in: {}", e);
                return None;
            }
        };
        match self.signed_in(token).await {
            Ok(signed_in) => Some(signed_in),
            Err(e) => {
                tracing::warn!("Silent sign-in failed: {}", e);
                None
            }
        }
    }

    async fn sign_in(&self) -> Result<SignedIn, DebateError> {
        if self.tokens.load().is_some() {
            match self.cached_token().await {
                Ok(token) => return self.signed_in(token).await,
                Err(e) => tracing::info!("Cached credential unusable ({}), asking for consent", e),
            }
        }
        let token = self.interactive_consent().await?;
        self.signed_in(token).await
    }

    async fn sign_out(&self) {
        if let Some(token) = self.tokens.load() {
            if let Err(e) = self.revoke(&token).await {
                tracing::warn!("Failed to revoke Google credential: {}", e);
            }
        }
        if let Err(e) = self.tokens.clear() {
            tracing::error!("Failed to delete the cached credential: {}", e);
        }
    }
}
