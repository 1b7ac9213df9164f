// src/auth/firebase.rs
//! Firebase Authentication through its REST API.
//!
//! Mirrors what the browser SDK does for a web client: the refresh token and
//! user record are persisted between runs (never the ID token), ID tokens are
//! refreshed shortly before they expire, and every state change is published
//! to subscribers.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::provider::{AuthEvents, Identity, IdentityProvider, TokenSource, UserRecord};
use crate::app_log;
use crate::error::ProviderError;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

/// ID tokens are refreshed once they are this close to expiry.
const REFRESH_MARGIN_SECS: i64 = 300;
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub(crate) api_key: String,
    pub(crate) state_path: PathBuf,
    pub(crate) identity_toolkit_url: String,
    pub(crate) secure_token_url: String,
    pub(crate) redirect_credentials: Option<Credentials>,
}

impl FirebaseConfig {
    pub fn new(api_key: impl Into<String>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            api_key: api_key.into(),
            state_path: state_path.into(),
            identity_toolkit_url: IDENTITY_TOOLKIT_URL.to_string(),
            secure_token_url: SECURE_TOKEN_URL.to_string(),
            redirect_credentials: None,
        }
    }

    pub fn with_identity_toolkit_url(mut self, url: impl Into<String>) -> Self {
        self.identity_toolkit_url = url.into();
        self
    }

    pub fn with_secure_token_url(mut self, url: impl Into<String>) -> Self {
        self.secure_token_url = url.into();
        self
    }

    /// Credentials used by the non-interactive sign-in flow.
    pub fn with_redirect_credentials(mut self, credentials: Credentials) -> Self {
        self.redirect_credentials = Some(credentials);
        self
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }
}

/// Asks the user for credentials during interactive sign-in.
pub trait CredentialPrompt: Send + Sync {
    fn prompt(&self, scopes: &[&str]) -> Result<Credentials, ProviderError>;
}

/// Reads email and password from the terminal. Without a terminal the
/// interactive flow is blocked.
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn prompt(&self, scopes: &[&str]) -> Result<Credentials, ProviderError> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return Err(ProviderError::PopupBlocked);
        }

        eprintln!("Sign in (requested scopes: {})", scopes.join(", "));
        let email = read_line(&stdin, "Email: ")?;
        let password = read_line(&stdin, "Password: ")?;
        if email.is_empty() || password.is_empty() {
            return Err(ProviderError::PopupClosedByUser);
        }
        Ok(Credentials::new(email, password))
    }
}

fn read_line(stdin: &std::io::Stdin, label: &str) -> Result<String, ProviderError> {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "{}", label);
    let _ = stderr.flush();

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .map_err(|e| internal_error(format!("Failed to read input: {}", e)))?;
    Ok(line.trim().to_string())
}

/// What survives between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersistedSession {
    user: UserRecord,
    refresh_token: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn new(token: String, expires_in: &str) -> Self {
        let lifetime = expires_in
            .parse::<i64>()
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Self {
            token,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at - Utc::now() > Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

struct SignedIn {
    persisted: PersistedSession,
    id_token: Option<CachedToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: String,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Claims carried by a Firebase ID token.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

impl From<IdTokenClaims> for UserRecord {
    fn from(claims: IdTokenClaims) -> Self {
        Self {
            uid: claims.sub,
            email: claims.email,
            display_name: claims.name,
            photo_url: claims.picture,
            email_verified: claims.email_verified,
        }
    }
}

/// Read the user record out of an ID token. The signature is not checked here;
/// the backend verifies tokens it receives.
fn user_from_id_token(token: &str) -> Result<UserRecord, ProviderError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<IdTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| ProviderError::Other {
            code: "auth/invalid-user-token".to_string(),
            message: e.to_string(),
        })?;
    Ok(data.claims.into())
}

/// Map a Firebase REST error message (e.g. `INVALID_PASSWORD` or
/// `TOO_MANY_ATTEMPTS_TRY_LATER : ...`) to a provider error.
fn map_firebase_error(message: &str) -> ProviderError {
    let code = message
        .split(|c: char| c == ' ' || c == ':')
        .next()
        .unwrap_or(message);

    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" => {
            ProviderError::InvalidCredentials
        }
        "USER_DISABLED" => ProviderError::UserDisabled,
        "OPERATION_NOT_ALLOWED" | "PASSWORD_LOGIN_DISABLED" => ProviderError::OperationNotAllowed,
        "UNAUTHORIZED_DOMAIN" => ProviderError::UnauthorizedDomain,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => ProviderError::TooManyRequests,
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" | "INVALID_ID_TOKEN" => {
            ProviderError::TokenExpired
        }
        other => ProviderError::Other {
            code: format!("auth/{}", other.to_lowercase().replace('_', "-")),
            message: message.to_string(),
        },
    }
}

fn internal_error(message: String) -> ProviderError {
    ProviderError::Other {
        code: "auth/internal-error".to_string(),
        message,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => Err(map_firebase_error(&parsed.error.message)),
        Err(_) => Err(internal_error(format!("HTTP {}: {}", status, body))),
    }
}

struct FirebaseInner {
    config: FirebaseConfig,
    http: reqwest::Client,
    state: Mutex<Option<SignedIn>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<Option<Identity>>>>,
}

impl FirebaseInner {
    fn current_identity(self: &Arc<Self>) -> Option<Identity> {
        let state = lock(&self.state);
        state.as_ref().map(|signed_in| {
            Identity::new(signed_in.persisted.user.clone(), Arc::clone(self) as Arc<dyn TokenSource>)
        })
    }

    fn emit(&self, identity: Option<Identity>) {
        lock(&self.listeners).retain(|tx| tx.send(identity.clone()).is_ok());
    }

    async fn establish(self: &Arc<Self>, persisted: PersistedSession, token: CachedToken) {
        self.persist(&persisted).await;
        let identity = Identity::new(persisted.user.clone(), Arc::clone(self) as Arc<dyn TokenSource>);
        *lock(&self.state) = Some(SignedIn {
            persisted,
            id_token: Some(token),
        });
        self.emit(Some(identity));
    }

    async fn persist(&self, persisted: &PersistedSession) {
        let path = &self.config.state_path;
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                app_log!(warn, "Failed to create {}: {}", parent.display(), e);
                return;
            }
        }
        let content = match serde_json::to_vec_pretty(persisted) {
            Ok(content) => content,
            Err(e) => {
                app_log!(warn, "Failed to serialize session state: {}", e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(path, content).await {
            app_log!(warn, "Failed to persist session to {}: {}", path.display(), e);
        }
    }

    async fn forget(&self) -> Result<(), ProviderError> {
        let path = &self.config.state_path;
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(internal_error(format!(
                    "Failed to remove {}: {}",
                    path.display(),
                    e
                )))
            }
        }
        *lock(&self.state) = None;
        self.emit(None);
        Ok(())
    }

    async fn sign_in_with_password(
        self: &Arc<Self>,
        credentials: &Credentials,
    ) -> Result<(), ProviderError> {
        let url = format!(
            "{}/accounts:signInWithPassword",
            self.config.identity_toolkit_url
        );
        let payload = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
            "returnSecureToken": true,
        });

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;
        let body: SignInResponse = ensure_success(response).await?.json().await?;

        let user = user_from_id_token(&body.id_token).unwrap_or_else(|e| {
            app_log!(debug, "Using sign-in response fields for user record: {}", e);
            UserRecord {
                uid: body.local_id.clone(),
                email: body.email.clone(),
                display_name: body.display_name.clone(),
                photo_url: None,
                email_verified: false,
            }
        });
        app_log!(info, "Signed in as {}", user.uid);

        let token = CachedToken::new(body.id_token, &body.expires_in);
        let persisted = PersistedSession {
            user,
            refresh_token: body.refresh_token,
        };
        self.establish(persisted, token).await;
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ProviderError> {
        let url = format!("{}/token", self.config.secure_token_url);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

#[async_trait]
impl TokenSource for FirebaseInner {
    async fn id_token(&self, user: &UserRecord) -> Result<String, ProviderError> {
        let refresh_token = {
            let state = lock(&self.state);
            let signed_in = state
                .as_ref()
                .filter(|s| s.persisted.user.uid == user.uid)
                .ok_or(ProviderError::NoCurrentUser)?;
            if let Some(cached) = signed_in.id_token.as_ref().filter(|t| t.is_fresh()) {
                return Ok(cached.token.clone());
            }
            signed_in.persisted.refresh_token.clone()
        };

        let refreshed = match self.refresh(&refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e @ (ProviderError::TokenExpired | ProviderError::UserDisabled)) => {
                app_log!(warn, "Session for {} was revoked: {}", user.uid, e);
                if let Err(forget_err) = self.forget().await {
                    app_log!(warn, "{}", forget_err);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let token = CachedToken::new(refreshed.id_token.clone(), &refreshed.expires_in);
        let rotated = {
            let mut state = lock(&self.state);
            match state.as_mut() {
                Some(signed_in) if signed_in.persisted.user.uid == user.uid => {
                    signed_in.id_token = Some(token);
                    if signed_in.persisted.refresh_token != refreshed.refresh_token {
                        signed_in.persisted.refresh_token = refreshed.refresh_token.clone();
                        Some(signed_in.persisted.clone())
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };
        if let Some(persisted) = rotated {
            self.persist(&persisted).await;
        }

        app_log!(debug, "Refreshed ID token for {}", user.uid);
        Ok(refreshed.id_token)
    }
}

/// Identity provider backed by Firebase Authentication.
pub struct FirebaseProvider {
    inner: Arc<FirebaseInner>,
    prompt: Arc<dyn CredentialPrompt>,
}

impl FirebaseProvider {
    /// Create a provider, restoring any session persisted by a previous run.
    pub async fn restore(config: FirebaseConfig) -> Self {
        Self::restore_with_client(config, reqwest::Client::new()).await
    }

    /// Like [`restore`](Self::restore), sending provider requests through `http`.
    pub async fn restore_with_client(config: FirebaseConfig, http: reqwest::Client) -> Self {
        let restored = Self::load_state(&config.state_path).await;
        if let Some(persisted) = &restored {
            app_log!(info, "Restored session for {}", persisted.user.uid);
        }

        Self {
            inner: Arc::new(FirebaseInner {
                config,
                http,
                state: Mutex::new(restored.map(|persisted| SignedIn {
                    persisted,
                    id_token: None,
                })),
                listeners: Mutex::new(Vec::new()),
            }),
            prompt: Arc::new(TerminalPrompt),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    async fn load_state(path: &Path) -> Option<PersistedSession> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                app_log!(warn, "Failed to read session state {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&content) {
            Ok(persisted) => Some(persisted),
            Err(e) => {
                app_log!(warn, "Ignoring unreadable session state {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseProvider {
    fn subscribe(&self) -> AuthEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        // Held across read and registration so no emit can fall between them.
        let mut listeners = lock(&self.inner.listeners);
        let _ = tx.send(self.inner.current_identity());
        listeners.push(tx);
        rx
    }

    async fn sign_in_interactive(&self, scopes: &[&str]) -> Result<(), ProviderError> {
        let prompt = Arc::clone(&self.prompt);
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        let credentials = tokio::task::spawn_blocking(move || {
            let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
            prompt.prompt(&scopes)
        })
        .await
        .map_err(|e| internal_error(format!("Credential prompt failed: {}", e)))??;

        self.inner.sign_in_with_password(&credentials).await
    }

    async fn sign_in_redirect(&self, _scopes: &[&str]) -> Result<(), ProviderError> {
        let credentials = self
            .inner
            .config
            .redirect_credentials
            .clone()
            .ok_or(ProviderError::MissingCredentials)?;
        self.inner.sign_in_with_password(&credentials).await
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.inner.forget().await?;
        app_log!(info, "Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[derive(Default)]
    struct MockFirebase {
        refreshes: AtomicUsize,
    }

    fn id_token(uid: &str, email: &str) -> String {
        let claims = json!({
            "sub": uid,
            "email": email,
            "name": "Ada Lovelace",
            "email_verified": true,
            "exp": Utc::now().timestamp() + 3600,
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test")).unwrap()
    }

    fn firebase_error(message: &str) -> (StatusCode, Json<Value>) {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": 400, "message": message}})),
        )
    }

    async fn sign_in(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if body["password"] != "secret" {
            return firebase_error("INVALID_PASSWORD");
        }
        (
            StatusCode::OK,
            Json(json!({
                "idToken": id_token("u1", "a@b.com"),
                "refreshToken": "refresh-1",
                "expiresIn": "3600",
                "localId": "u1",
                "email": "a@b.com",
            })),
        )
    }

    async fn refresh(
        State(mock): State<Arc<MockFirebase>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        mock.refreshes.fetch_add(1, Ordering::SeqCst);
        if form.get("refresh_token").map(String::as_str) == Some("revoked") {
            return firebase_error("TOKEN_EXPIRED");
        }
        (
            StatusCode::OK,
            Json(json!({
                "id_token": id_token("u1", "a@b.com"),
                "refresh_token": "refresh-2",
                "expires_in": "3600",
                "token_type": "Bearer",
                "user_id": "u1",
            })),
        )
    }

    async fn mock_firebase() -> (String, Arc<MockFirebase>) {
        let mock = Arc::new(MockFirebase::default());
        let router = Router::new()
            .route("/identitytoolkit/accounts:signInWithPassword", post(sign_in))
            .route("/securetoken/token", post(refresh))
            .with_state(mock.clone());
        (serve(router).await, mock)
    }

    fn config(base: &str, state_path: &Path) -> FirebaseConfig {
        FirebaseConfig::new("test-key", state_path)
            .with_identity_toolkit_url(format!("{}/identitytoolkit", base))
            .with_secure_token_url(format!("{}/securetoken", base))
    }

    struct ScriptedPrompt(Result<Credentials, ProviderError>);

    impl CredentialPrompt for ScriptedPrompt {
        fn prompt(&self, _scopes: &[&str]) -> Result<Credentials, ProviderError> {
            self.0.clone()
        }
    }

    async fn next_event(events: &mut AuthEvents) -> Option<Identity> {
        tokio::time::timeout(StdDuration::from_secs(2), events.recv())
            .await
            .expect("no auth event")
            .expect("event stream closed")
    }

    async fn write_state(path: &Path, refresh_token: &str) {
        let persisted = PersistedSession {
            user: UserRecord::new("u1").with_email("a@b.com"),
            refresh_token: refresh_token.to_string(),
        };
        tokio::fs::write(path, serde_json::to_vec(&persisted).unwrap())
            .await
            .unwrap();
    }

    #[test]
    fn test_map_firebase_error() {
        assert_eq!(map_firebase_error("INVALID_PASSWORD"), ProviderError::InvalidCredentials);
        assert_eq!(
            map_firebase_error("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"),
            ProviderError::TooManyRequests
        );
        assert_eq!(
            map_firebase_error("OPERATION_NOT_ALLOWED"),
            ProviderError::OperationNotAllowed
        );
        assert_eq!(map_firebase_error("TOKEN_EXPIRED"), ProviderError::TokenExpired);
        assert_eq!(
            map_firebase_error("UNAUTHORIZED_DOMAIN : Domain not allowlisted by project"),
            ProviderError::UnauthorizedDomain
        );
        assert_eq!(
            map_firebase_error("WEAK_PASSWORD : too short").code(),
            "auth/weak-password"
        );
    }

    #[test]
    fn test_user_from_id_token_reads_claims() {
        let user = user_from_id_token(&id_token("u1", "a@b.com")).unwrap();
        assert_eq!(user.uid, "u1");
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
        assert_eq!(user.display_name.as_deref(), Some("Ada Lovelace"));
        assert!(user.email_verified);
    }

    #[test]
    fn test_user_from_garbage_token_fails() {
        assert!(user_from_id_token("not-a-jwt").is_err());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("a@b.com", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_redirect_sign_in_emits_identity_and_persists_refresh_token() {
        let (base, mock) = mock_firebase().await;
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("session.json");
        let provider = FirebaseProvider::restore(
            config(&base, &state_path)
                .with_redirect_credentials(Credentials::new("a@b.com", "secret")),
        )
        .await;

        let mut events = provider.subscribe();
        assert!(next_event(&mut events).await.is_none());

        provider.sign_in_redirect(&["profile", "email"]).await.unwrap();

        let identity = next_event(&mut events).await.unwrap();
        assert_eq!(identity.uid(), "u1");
        assert_eq!(identity.user().email.as_deref(), Some("a@b.com"));

        // The fresh ID token from sign-in is served without a refresh.
        let token = identity.get_token().await.unwrap();
        assert_eq!(user_from_id_token(&token).unwrap().uid, "u1");
        assert_eq!(mock.refreshes.load(Ordering::SeqCst), 0);

        let saved = tokio::fs::read_to_string(&state_path).await.unwrap();
        assert!(saved.contains("refresh-1"));
        assert!(!saved.contains(&token));
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let (base, _mock) = mock_firebase().await;
        let dir = tempfile::tempdir().unwrap();
        let provider = FirebaseProvider::restore(
            config(&base, &dir.path().join("session.json"))
                .with_redirect_credentials(Credentials::new("a@b.com", "wrong")),
        )
        .await;

        let err = provider.sign_in_redirect(&[]).await.unwrap_err();
        assert_eq!(err, ProviderError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_redirect_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let provider =
            FirebaseProvider::restore(FirebaseConfig::new("k", dir.path().join("s.json"))).await;
        assert_eq!(
            provider.sign_in_redirect(&[]).await.unwrap_err(),
            ProviderError::MissingCredentials
        );
    }

    #[tokio::test]
    async fn test_interactive_sign_in_uses_prompt() {
        let (base, _mock) = mock_firebase().await;
        let dir = tempfile::tempdir().unwrap();
        let provider = FirebaseProvider::restore(config(&base, &dir.path().join("s.json")))
            .await
            .with_prompt(Arc::new(ScriptedPrompt(Ok(Credentials::new("a@b.com", "secret")))));

        let mut events = provider.subscribe();
        next_event(&mut events).await;
        provider.sign_in_interactive(&["profile"]).await.unwrap();
        assert_eq!(next_event(&mut events).await.unwrap().uid(), "u1");
    }

    #[tokio::test]
    async fn test_interactive_sign_in_blocked_without_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FirebaseProvider::restore(FirebaseConfig::new("k", dir.path().join("s.json")))
            .await
            .with_prompt(Arc::new(ScriptedPrompt(Err(ProviderError::PopupBlocked))));

        assert_eq!(
            provider.sign_in_interactive(&[]).await.unwrap_err(),
            ProviderError::PopupBlocked
        );
    }

    #[tokio::test]
    async fn test_restored_session_refreshes_and_rotates_token() {
        let (base, mock) = mock_firebase().await;
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("session.json");
        write_state(&state_path, "refresh-1").await;

        let provider = FirebaseProvider::restore(config(&base, &state_path)).await;
        let mut events = provider.subscribe();
        let identity = next_event(&mut events).await.unwrap();
        assert_eq!(identity.uid(), "u1");

        identity.get_token().await.unwrap();
        identity.get_token().await.unwrap();
        assert_eq!(mock.refreshes.load(Ordering::SeqCst), 1);

        let saved = tokio::fs::read_to_string(&state_path).await.unwrap();
        assert!(saved.contains("refresh-2"));
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_signs_out() {
        let (base, _mock) = mock_firebase().await;
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("session.json");
        write_state(&state_path, "revoked").await;

        let provider = FirebaseProvider::restore(config(&base, &state_path)).await;
        let mut events = provider.subscribe();
        let identity = next_event(&mut events).await.unwrap();

        assert_eq!(identity.get_token().await.unwrap_err(), ProviderError::TokenExpired);
        assert!(next_event(&mut events).await.is_none());
        assert!(!state_path.exists());
    }

    #[tokio::test]
    async fn test_sign_out_removes_state_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("session.json");
        write_state(&state_path, "refresh-1").await;

        let provider = FirebaseProvider::restore(FirebaseConfig::new("k", &state_path)).await;
        let mut events = provider.subscribe();
        let identity = next_event(&mut events).await.unwrap();

        provider.sign_out().await.unwrap();

        assert!(next_event(&mut events).await.is_none());
        assert!(!state_path.exists());
        assert_eq!(identity.get_token().await.unwrap_err(), ProviderError::NoCurrentUser);
    }

    #[tokio::test]
    async fn test_subscribe_sees_sign_in_racing_registration() {
        let dir = tempfile::tempdir().unwrap();
        let provider =
            FirebaseProvider::restore(FirebaseConfig::new("k", dir.path().join("s.json"))).await;

        let mut events = std::thread::scope(|scope| {
            // Hold the listener set so the subscriber is mid-registration when
            // the sign-in lands and its emit goes to the old listeners only.
            let listeners = lock(&provider.inner.listeners);
            let subscriber = scope.spawn(|| provider.subscribe());
            std::thread::sleep(StdDuration::from_millis(50));
            *lock(&provider.inner.state) = Some(SignedIn {
                persisted: PersistedSession {
                    user: UserRecord::new("u1"),
                    refresh_token: "refresh-1".to_string(),
                },
                id_token: None,
            });
            drop(listeners);
            subscriber.join().unwrap()
        });

        let first = events.try_recv().unwrap();
        assert_eq!(first.map(|identity| identity.uid().to_string()).as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_unreadable_state_starts_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("session.json");
        tokio::fs::write(&state_path, b"{not json").await.unwrap();

        let provider = FirebaseProvider::restore(FirebaseConfig::new("k", &state_path)).await;
        let mut events = provider.subscribe();
        assert!(next_event(&mut events).await.is_none());
    }
}
