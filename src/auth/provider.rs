// src/auth/provider.rs
//! The identity-provider capability set consumed by the session synchronizer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::ProviderError;

/// Scopes requested on every sign-in.
pub const SIGN_IN_SCOPES: &[&str] = &["profile", "email"];

/// User record published by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

impl UserRecord {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
            photo_url: None,
            email_verified: false,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Display name, falling back to email, then uid.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}

/// Issues short-lived ID tokens for a signed-in user.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn id_token(&self, user: &UserRecord) -> Result<String, ProviderError>;
}

/// A signed-in user as seen by the provider: the record plus a way to obtain
/// a current bearer token for it.
#[derive(Clone)]
pub struct Identity {
    user: UserRecord,
    tokens: Arc<dyn TokenSource>,
}

impl Identity {
    pub fn new(user: UserRecord, tokens: Arc<dyn TokenSource>) -> Self {
        Self { user, tokens }
    }

    pub fn user(&self) -> &UserRecord {
        &self.user
    }

    pub fn uid(&self) -> &str {
        &self.user.uid
    }

    /// Fetch a token valid right now. Callers must not keep it beyond one request.
    pub async fn get_token(&self) -> Result<String, ProviderError> {
        self.tokens.id_token(&self.user).await
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity").field("user", &self.user).finish()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.user == other.user
    }
}

/// Stream of auth-state changes; `None` means signed out.
pub type AuthEvents = mpsc::UnboundedReceiver<Option<Identity>>;

#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Register an auth-state listener. The first event carries the current
    /// (possibly restored) state; later events follow every change.
    fn subscribe(&self) -> AuthEvents;

    /// Sign in through the provider's interactive UI.
    async fn sign_in_interactive(&self, scopes: &[&str]) -> Result<(), ProviderError>;

    /// Sign in without interactive UI.
    async fn sign_in_redirect(&self, scopes: &[&str]) -> Result<(), ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;
}
