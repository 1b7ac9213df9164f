// src/lib.rs
//! Client for the job-scraping and CV-tailoring backend.
//!
//! [`auth::SessionSynchronizer`] keeps the local session, the identity provider
//! and the backend in step; [`core::ApiClient`] calls the backend with the
//! session's credentials attached.

pub mod auth;
pub mod cli;
pub mod core;
pub mod environment;
pub mod error;
pub mod logging;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use auth::{Session, SessionState, SessionStore, SessionSynchronizer};
pub use crate::core::{ApiClient, ConfigManager, CredentialSource};
pub use error::{ApiError, ProviderError, SessionError};
