// src/auth/testing.rs
//! In-memory provider, token source and backend hook for session tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::provider::{AuthEvents, Identity, IdentityProvider, TokenSource, UserRecord};
use super::session::{Session, SessionStore};
use super::synchronizer::BackendSync;
use crate::error::{ApiError, ProviderError};

/// Hands out `tok-1`, `tok-2`, ... or always fails.
#[derive(Default)]
pub struct CountingTokens {
    issued: AtomicUsize,
    fail: bool,
}

impl CountingTokens {
    pub fn failing() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for CountingTokens {
    async fn id_token(&self, _user: &UserRecord) -> Result<String, ProviderError> {
        if self.fail {
            return Err(ProviderError::TokenExpired);
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("tok-{}", n))
    }
}

pub fn identity(uid: &str) -> Identity {
    Identity::new(
        UserRecord::new(uid).with_email(format!("{}@example.com", uid)),
        Arc::new(CountingTokens::default()),
    )
}

/// Provider whose events and sign-in outcomes are driven by the test.
#[derive(Default)]
pub struct FakeProvider {
    listeners: Mutex<Vec<mpsc::UnboundedSender<Option<Identity>>>>,
    interactive: Mutex<VecDeque<Result<(), ProviderError>>>,
    redirect: Mutex<VecDeque<Result<(), ProviderError>>>,
    sign_out: Mutex<VecDeque<Result<(), ProviderError>>>,
    pub interactive_calls: AtomicUsize,
    pub redirect_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub last_scopes: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn emit(&self, identity: Option<Identity>) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|tx| tx.send(identity.clone()).is_ok());
    }

    /// Close every listener stream.
    pub fn close(&self) {
        self.listeners.lock().unwrap().clear();
    }

    pub fn script_interactive(&self, result: Result<(), ProviderError>) {
        self.interactive.lock().unwrap().push_back(result);
    }

    pub fn script_redirect(&self, result: Result<(), ProviderError>) {
        self.redirect.lock().unwrap().push_back(result);
    }

    pub fn script_sign_out(&self, result: Result<(), ProviderError>) {
        self.sign_out.lock().unwrap().push_back(result);
    }

    fn next(queue: &Mutex<VecDeque<Result<(), ProviderError>>>) -> Result<(), ProviderError> {
        queue.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn subscribe(&self) -> AuthEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().push(tx);
        rx
    }

    async fn sign_in_interactive(&self, scopes: &[&str]) -> Result<(), ProviderError> {
        self.interactive_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_scopes.lock().unwrap() = scopes.iter().map(|s| s.to_string()).collect();
        Self::next(&self.interactive)
    }

    async fn sign_in_redirect(&self, scopes: &[&str]) -> Result<(), ProviderError> {
        self.redirect_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_scopes.lock().unwrap() = scopes.iter().map(|s| s.to_string()).collect();
        Self::next(&self.redirect)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.sign_out)
    }
}

/// Backend hook that records every token it receives.
#[derive(Default)]
pub struct RecordingBackend {
    pub tokens: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingBackend {
    pub fn failing() -> Self {
        Self {
            tokens: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

#[async_trait]
impl BackendSync for RecordingBackend {
    async fn sync(&self, bearer_token: &str) -> Result<(), ApiError> {
        self.tokens.lock().unwrap().push(bearer_token.to_string());
        if self.fail {
            return Err(ApiError::Status {
                status: 500,
                detail: "database unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Wait until the session satisfies `predicate`, failing the test after 2s.
pub async fn wait_for_session<F>(store: &SessionStore, predicate: F) -> Session
where
    F: FnMut(&Session) -> bool,
{
    let mut rx = store.subscribe();
    let session = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("session did not reach expected state")
        .expect("session store dropped");
    session.clone()
}
