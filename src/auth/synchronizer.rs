// src/auth/synchronizer.rs
//! Keeps the local session, the identity provider and the backend in step.
//!
//! Provider events are consumed by a single task in emission order. Each event
//! replaces the session's identity; events carrying a user also trigger a
//! backend sync on its own task. Those syncs may finish in any order and never
//! touch session state.

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

use super::provider::{AuthEvents, Identity, IdentityProvider, SIGN_IN_SCOPES};
use super::session::{Session, SessionState, SessionStore};
use crate::app_log;
use crate::error::{ApiError, ProviderError, SessionError};

/// Tells the backend that an identity has authenticated.
#[async_trait]
pub trait BackendSync: Send + Sync + 'static {
    async fn sync(&self, bearer_token: &str) -> Result<(), ApiError>;
}

pub struct SessionSynchronizer {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<SessionStore>,
    backend: Option<Arc<dyn BackendSync>>,
    pending_syncs: Arc<watch::Sender<usize>>,
}

impl SessionSynchronizer {
    /// Synchronizer without a backend sync step.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (pending_syncs, _) = watch::channel(0);
        Self {
            provider,
            store: Arc::new(SessionStore::new()),
            backend: None,
            pending_syncs: Arc::new(pending_syncs),
        }
    }

    /// Sync every resolved identity with the backend through `backend`.
    pub fn with_backend_sync(mut self, backend: Arc<dyn BackendSync>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Shared handle to the session, for injecting into request clients.
    pub fn store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.store)
    }

    pub fn snapshot(&self) -> Session {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.store.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    /// Register with the provider and start consuming its events.
    ///
    /// The returned future resolves with the identity (or absence) from the first
    /// event. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyInitialized`] on any call after the first; use
    /// [`ready`](Self::ready) to wait for resolution from other places.
    pub fn initialize(
        &self,
    ) -> Result<impl Future<Output = Result<Option<Identity>, SessionError>>, SessionError> {
        if !self.store.begin_loading() {
            return Err(SessionError::AlreadyInitialized);
        }

        let events = self.provider.subscribe();
        let (first_tx, first_rx) = oneshot::channel();
        tokio::spawn(run_listener(
            events,
            Arc::clone(&self.store),
            self.backend.clone(),
            Arc::clone(&self.pending_syncs),
            first_tx,
        ));
        app_log!(debug, "Session synchronizer listening for auth state changes");

        Ok(async move { first_rx.await.map_err(|_| SessionError::Closed) })
    }

    /// Wait until identity state has been resolved once.
    pub async fn ready(&self) -> Result<Session, SessionError> {
        self.store.ready().await
    }

    /// Gate for actions that need a signed-in user.
    pub async fn require_authenticated(&self) -> Result<Identity, SessionError> {
        self.ready()
            .await?
            .identity
            .ok_or(SessionError::NotAuthenticated)
    }

    /// Exchange the identity's current token with the backend. Failures are
    /// logged and otherwise ignored; without a backend hook this does nothing.
    pub async fn sync_with_backend(&self, identity: &Identity) {
        if let Some(backend) = &self.backend {
            sync_identity(backend.as_ref(), identity).await;
        }
    }

    /// Wait for spawned backend syncs to finish.
    pub async fn settled(&self) {
        let mut rx = self.pending_syncs.subscribe();
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    /// Interactive sign-in, falling back once to the redirect flow when the
    /// interactive UI is blocked. The session picks up the new user from the
    /// provider's next event.
    pub async fn login_with_provider(&self) -> Result<(), ProviderError> {
        self.store.set_error(None);

        match self.provider.sign_in_interactive(SIGN_IN_SCOPES).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_interactive_blocked() => {
                app_log!(info, "Interactive sign-in blocked, trying redirect flow");
                self.provider
                    .sign_in_redirect(SIGN_IN_SCOPES)
                    .await
                    .map_err(|e| self.record_error("Sign-in", e))
            }
            Err(e) => Err(self.record_error("Sign-in", e)),
        }
    }

    /// Sign out. The local identity is cleared only once the provider agrees.
    pub async fn logout(&self) -> Result<(), ProviderError> {
        match self.provider.sign_out().await {
            Ok(()) => {
                self.store.clear_identity();
                self.store.set_error(None);
                Ok(())
            }
            Err(e) => Err(self.record_error("Logout", e)),
        }
    }

    pub async fn current_auth_header(&self) -> Option<HeaderValue> {
        self.store.current_auth_header().await
    }

    fn record_error(&self, operation: &str, error: ProviderError) -> ProviderError {
        app_log!(error, "{} error ({}): {}", operation, error.code(), error);
        self.store.set_error(Some(error.to_string()));
        error
    }
}

async fn run_listener(
    mut events: AuthEvents,
    store: Arc<SessionStore>,
    backend: Option<Arc<dyn BackendSync>>,
    pending_syncs: Arc<watch::Sender<usize>>,
    first_tx: oneshot::Sender<Option<Identity>>,
) {
    let mut first_tx = Some(first_tx);

    while let Some(identity) = events.recv().await {
        match &identity {
            Some(identity) => app_log!(info, "Auth state changed: signed in as {}", identity.uid()),
            None => app_log!(info, "Auth state changed: signed out"),
        }

        // Counted before the session changes so `settled()` observed after a
        // session update always covers this event's sync.
        if let (Some(identity), Some(backend)) = (&identity, &backend) {
            let pending = PendingSync::start(&pending_syncs);
            let identity = identity.clone();
            let backend = Arc::clone(backend);
            tokio::spawn(async move {
                let _pending = pending;
                sync_identity(backend.as_ref(), &identity).await;
            });
        }

        store.apply(identity.clone());

        if let Some(tx) = first_tx.take() {
            let _ = tx.send(identity);
        }
    }

    // A provider that goes away before reporting anything leaves us signed out.
    if let Some(tx) = first_tx.take() {
        app_log!(warn, "Identity provider closed its event stream before reporting state");
        store.apply(None);
        let _ = tx.send(None);
    }
    app_log!(debug, "Auth state listener stopped");
}

/// One in-flight backend sync. Released on drop, so a sync task that panics
/// still lets `settled()` return.
struct PendingSync(Arc<watch::Sender<usize>>);

impl PendingSync {
    fn start(pending_syncs: &Arc<watch::Sender<usize>>) -> Self {
        pending_syncs.send_modify(|pending| *pending += 1);
        Self(Arc::clone(pending_syncs))
    }
}

impl Drop for PendingSync {
    fn drop(&mut self) {
        self.0.send_modify(|pending| *pending -= 1);
    }
}

async fn sync_identity(backend: &dyn BackendSync, identity: &Identity) {
    let token = match identity.get_token().await {
        Ok(token) => token,
        Err(e) => {
            app_log!(warn, "Skipping backend sync for {}: {}", identity.uid(), e);
            return;
        }
    };

    match backend.sync(&token).await {
        Ok(()) => app_log!(info, "Synced {} with backend", identity.uid()),
        Err(e) => app_log!(error, "Error syncing {} with backend: {}", identity.uid(), e),
    }
}
