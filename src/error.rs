// src/error.rs
//! Error types for the identity provider, the backend API and the session layer.

/// Failure reported by the identity provider.
///
/// Codes follow the `auth/<kind>` convention of the provider's client SDKs so they
/// can be logged and matched the same way across implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("Sign-in popup was blocked")]
    PopupBlocked,
    #[error("Sign-in popup was closed before completing")]
    PopupClosedByUser,
    #[error("Sign-in method is not enabled for this project")]
    OperationNotAllowed,
    #[error("Domain is not authorized for sign-in")]
    UnauthorizedDomain,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("User account has been disabled")]
    UserDisabled,
    #[error("Session has expired, sign in again")]
    TokenExpired,
    #[error("Too many attempts, try again later")]
    TooManyRequests,
    #[error("No signed-in user")]
    NoCurrentUser,
    #[error("No credentials available for sign-in")]
    MissingCredentials,
    #[error("Network error: {0}")]
    Network(String),
    #[error("{code}: {message}")]
    Other { code: String, message: String },
}

impl ProviderError {
    /// Provider-style error code, e.g. `auth/popup-blocked`.
    pub fn code(&self) -> &str {
        match self {
            ProviderError::PopupBlocked => "auth/popup-blocked",
            ProviderError::PopupClosedByUser => "auth/popup-closed-by-user",
            ProviderError::OperationNotAllowed => "auth/operation-not-allowed",
            ProviderError::UnauthorizedDomain => "auth/unauthorized-domain",
            ProviderError::InvalidCredentials => "auth/invalid-credential",
            ProviderError::UserDisabled => "auth/user-disabled",
            ProviderError::TokenExpired => "auth/user-token-expired",
            ProviderError::TooManyRequests => "auth/too-many-requests",
            ProviderError::NoCurrentUser => "auth/no-current-user",
            ProviderError::MissingCredentials => "auth/missing-credentials",
            ProviderError::Network(_) => "auth/network-request-failed",
            ProviderError::Other { code, .. } => code,
        }
    }

    /// Interactive sign-in could not show its UI; a redirect flow may still work.
    pub fn is_interactive_blocked(&self) -> bool {
        matches!(self, ProviderError::PopupBlocked)
    }

    /// Message suitable for showing to the user after a failed sign-in.
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::UnauthorizedDomain => {
                "This domain is not authorized. Add it to the identity provider's authorized domains".to_string()
            }
            ProviderError::OperationNotAllowed => {
                "Email sign-in is not enabled. Enable it in the identity provider's sign-in methods".to_string()
            }
            other => format!("Sign in failed: {}", other),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

/// Failure of a request to the backend API.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx response. `detail` is the backend's message, or a generic fallback.
    #[error("{detail}")]
    Status { status: u16, detail: String },
    #[error("Failed to parse {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    InvalidInput(String),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// HTTP status for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

/// Failure of a session-level operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("Session synchronizer is already initialized")]
    AlreadyInitialized,
    #[error("Session synchronizer has not been initialized")]
    NotInitialized,
    #[error("Please login to continue")]
    NotAuthenticated,
    #[error("Session listener stopped before resolving")]
    Closed,
}
