// src/environment.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

use crate::app_log;

const LOCAL_API_URL: &str = "http://localhost:8080";
const HOSTED_API_URL: &str = "https://mkhaldon-linkedin-scraper-resume.hf.space";
const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// Which backend deployment the client talks to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    #[default]
    Local,
    #[serde(alias = "production")]
    #[value(alias = "production")]
    Hosted,
}

impl Deployment {
    /// Select the deployment from `CVTAILOR_ENV`, `ENVIRONMENT` or `ENV`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let Some(name) = ["CVTAILOR_ENV", "ENVIRONMENT", "ENV"]
            .iter()
            .find_map(|key| lookup(key))
        else {
            return Deployment::Local;
        };

        Self::from_name(&name).unwrap_or_else(|| {
            app_log!(warn, "Unknown environment '{}', using local", name);
            Deployment::Local
        })
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "local" | "dev" | "development" => Some(Deployment::Local),
            "hosted" | "prod" | "production" => Some(Deployment::Hosted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Deployment::Local => "local",
            Deployment::Hosted => "hosted",
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub api_url: Url,
    /// Where the identity provider keeps its signed-in state between runs.
    pub session_path: PathBuf,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl EnvironmentConfig {
    /// Built-in settings used when `config.yaml` has no section for `deployment`.
    pub fn defaults(deployment: Deployment) -> Result<Self> {
        let api_url = match deployment {
            Deployment::Local => LOCAL_API_URL,
            Deployment::Hosted => HOSTED_API_URL,
        };
        Ok(Self {
            api_url: Url::parse(api_url).context("Invalid built-in API URL")?,
            session_path: PathBuf::from(".cvtailor")
                .join(deployment.as_str())
                .join("session.json"),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        })
    }

    /// Make relative paths absolute against the current directory.
    pub fn resolved(mut self) -> Result<Self> {
        self.session_path = Self::resolve_path(&self.session_path)?;
        Ok(self)
    }

    fn resolve_path(path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            let current_dir = std::env::current_dir().context("Failed to get current directory")?;
            Ok(current_dir.join(path))
        }
    }

    /// Ensure the session file's directory exists
    pub async fn ensure_directories(&self) -> Result<()> {
        if let Some(parent) = self.session_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        Ok(())
    }
}
