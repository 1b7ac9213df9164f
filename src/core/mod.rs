// src/core/mod.rs
//! Backend API client and configuration loading

pub mod config_manager;
pub mod service_client;

pub use config_manager::{ConfigManager, FirebaseSettings};
pub use service_client::{ApiClient, CredentialSource};
