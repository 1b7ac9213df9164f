// src/auth/mod.rs
//! Client-side authentication: identity provider, session state and its
//! synchronization with the backend.

pub mod firebase;
pub mod provider;
pub mod session;
pub mod synchronizer;

#[cfg(test)]
pub(crate) mod testing;

pub use firebase::{CredentialPrompt, Credentials, FirebaseConfig, FirebaseProvider, TerminalPrompt};
pub use provider::{AuthEvents, Identity, IdentityProvider, TokenSource, UserRecord, SIGN_IN_SCOPES};
pub use session::{Session, SessionState, SessionStore};
pub use synchronizer::{BackendSync, SessionSynchronizer};
