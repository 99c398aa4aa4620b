//! Who is using the household

use async_trait::async_trait;
use hogar_auth::{Auth, AuthError};
use log::{debug, warn};

use crate::error::Result;

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
}

impl CurrentUser {
    pub fn new(id: &str, email: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
        }
    }

    /// Name shown for this user: the capitalized local part of the email
    pub fn display_name(&self) -> String {
        display_name(&self.email)
    }
}

/// `"camila@example.com"` → `"Camila"`; `"Yo"` when there is nothing to use
pub fn display_name(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut chars = local.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Yo".to_string(),
    }
}

/// Source of the current user's identity
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `None` when nobody is signed in
    async fn current_user(&self) -> Result<Option<CurrentUser>>;
}

/// Looks the user up with the held session, refreshing it once when the
/// access token has expired or is rejected
#[async_trait]
impl IdentityProvider for Auth {
    async fn current_user(&self) -> Result<Option<CurrentUser>> {
        let mut refreshed = false;
        if self.get_session().map_or(false, |s| s.is_expired()) {
            debug!("Access token expired, refreshing session");
            if !refresh(self).await? {
                return Ok(None);
            }
            refreshed = true;
        }

        loop {
            match self.get_user().await {
                Ok(user) => {
                    return Ok(Some(CurrentUser {
                        id: user.id,
                        email: user.email.unwrap_or_default(),
                    }))
                }
                Err(AuthError::InvalidToken(_)) if !refreshed => {
                    debug!("Access token rejected, refreshing session");
                    if !refresh(self).await? {
                        return Ok(None);
                    }
                    refreshed = true;
                }
                Err(AuthError::MissingSession) | Err(AuthError::InvalidToken(_)) => {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// `false` when there is nothing to refresh or the refresh token is refused
async fn refresh(auth: &Auth) -> Result<bool> {
    match auth.refresh_session().await {
        Ok(_) => Ok(true),
        Err(AuthError::MissingSession) => Ok(false),
        Err(AuthError::ApiError(e)) => {
            warn!("Session refresh refused: {}", e);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Fixed identity, or none at all
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<CurrentUser>,
}

impl StaticIdentity {
    pub fn new(user: CurrentUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<CurrentUser>> {
        Ok(self.user.clone())
    }
}
