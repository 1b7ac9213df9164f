// src/auth/session.rs
//! The client's belief about the current user's authentication state.

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

use super::provider::Identity;
use crate::app_log;
use crate::core::CredentialSource;
use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: Option<Identity>,
    /// True until the provider reports identity state for the first time.
    pub is_loading: bool,
    pub last_error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            identity: None,
            is_loading: true,
            last_error: None,
        }
    }
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Authenticated,
    Anonymous,
}

/// Owner of the single `Session` value. All writes go through `send_modify`.
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<Session>,
    initialized: AtomicBool,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Session::default());
        Self {
            tx,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        if !self.initialized.load(Ordering::Acquire) {
            return SessionState::Uninitialized;
        }
        let session = self.tx.borrow();
        match (session.is_loading, session.is_authenticated()) {
            (true, _) => SessionState::Loading,
            (false, true) => SessionState::Authenticated,
            (false, false) => SessionState::Anonymous,
        }
    }

    /// Wait for the first resolution of identity state.
    pub async fn ready(&self) -> Result<Session, SessionError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(SessionError::NotInitialized);
        }
        let mut rx = self.tx.subscribe();
        let session = rx
            .wait_for(|session| !session.is_loading)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(session.clone())
    }

    /// Moves `Uninitialized -> Loading`. Returns false if already done.
    pub(crate) fn begin_loading(&self) -> bool {
        self.initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record a provider event. Returns true for the first resolution.
    pub(crate) fn apply(&self, identity: Option<Identity>) -> bool {
        let mut first = false;
        self.tx.send_modify(|session| {
            first = session.is_loading;
            session.identity = identity;
            session.is_loading = false;
        });
        first
    }

    pub(crate) fn clear_identity(&self) {
        self.tx.send_modify(|session| session.identity = None);
    }

    pub(crate) fn set_error(&self, error: Option<String>) {
        self.tx.send_modify(|session| session.last_error = error);
    }

    /// `Bearer <token>` for the current identity, fetched now.
    pub async fn current_auth_header(&self) -> Option<HeaderValue> {
        let identity = self.snapshot().identity?;
        let token = match identity.get_token().await {
            Ok(token) => token,
            Err(e) => {
                app_log!(warn, "Failed to get auth token for {}: {}", identity.uid(), e);
                return None;
            }
        };
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                Some(value)
            }
            Err(_) => {
                app_log!(warn, "Auth token for {} is not a valid header value", identity.uid());
                None
            }
        }
    }
}

#[async_trait]
impl CredentialSource for SessionStore {
    async fn authorization(&self) -> Option<HeaderValue> {
        self.current_auth_header().await
    }
}
