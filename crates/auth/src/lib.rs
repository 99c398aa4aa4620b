//! Auth client
//!
//! Password sign-in against a GoTrue server (Supabase `/auth/v1`), session
//! holding, and lookup of the user behind the current access token.

use log::{debug, info};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Error type
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing session")]
    MissingSession,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// User information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Session information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    /// Unix timestamp; filled in locally when the server omits it
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    /// Whether the access token has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => unix_now() >= expires_at,
            None => false,
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

/// Client options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub persist_session: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            persist_session: true,
        }
    }
}

/// Auth client
#[derive(Debug, Clone)]
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    current_session: Arc<RwLock<Option<Session>>>,
}

impl Auth {
    /// Create a new Auth client
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            current_session: Arc::new(RwLock::new(None)),
        }
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.url);
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let session = self.session_from(response).await?;
        info!("Signed in as {}", session.user.id);
        Ok(session)
    }

    /// Exchange the refresh token for a new session
    ///
    /// The new session replaces the held one even when sessions are not
    /// persisted, since the old access token is no longer usable.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.url);
        let payload = serde_json::json!({
            "refresh_token": session.refresh_token,
        });

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let session = self.session_from(response).await?;
        self.set_session(session.clone());
        debug!("Session refreshed for {}", session.user.id);
        Ok(session)
    }

    /// Sign out and forget the session
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;
        let url = format!("{}/auth/v1/logout", self.url);

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::ApiError(error_text));
        }

        self.clear_session();
        Ok(())
    }

    /// The user behind the current access token
    pub async fn get_user(&self) -> Result<User, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;
        let url = format!("{}/auth/v1/user", self.url);

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let error_text = response.text().await?;
            return Err(AuthError::InvalidToken(error_text));
        }
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::ApiError(error_text));
        }

        Ok(response.json::<User>().await?)
    }

    /// The current session, if any
    pub fn get_session(&self) -> Option<Session> {
        let guard = self
            .current_session
            .read()
            .unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    /// Install a session obtained elsewhere
    pub fn set_session(&self, session: Session) {
        let mut guard = self
            .current_session
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *guard = Some(session);
    }

    /// Access token of the current session
    pub fn access_token(&self) -> Option<String> {
        self.get_session().map(|s| s.access_token)
    }

    fn clear_session(&self) {
        let mut guard = self
            .current_session
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    async fn session_from(&self, response: Response) -> Result<Session, AuthError> {
        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::ApiError(error_text));
        }

        let mut session: Session = response.json().await?;
        if session.expires_at.is_none() {
            session.expires_at = Some(unix_now() + session.expires_in);
        }
        debug!("Session expires at {:?}", session.expires_at);

        if self.options.persist_session {
            self.set_session(session.clone());
        }
        Ok(session)
    }
}
