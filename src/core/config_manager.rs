// src/core/config_manager.rs
//! Configuration loading: `config.yaml`, then environment overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use url::Url;

use crate::app_log;
use crate::auth::{Credentials, FirebaseConfig};
use crate::environment::{Deployment, EnvironmentConfig};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirebaseSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Override the Identity Toolkit base URL, e.g. for the auth emulator.
    #[serde(default)]
    pub identity_toolkit_url: Option<String>,
    #[serde(default)]
    pub secure_token_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    local: Option<EnvironmentConfig>,
    #[serde(default, alias = "production")]
    hosted: Option<EnvironmentConfig>,
    #[serde(default)]
    firebase: FirebaseSettings,
}

#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub deployment: Deployment,
    pub environment: EnvironmentConfig,
    pub firebase: FirebaseSettings,
    pub redirect_credentials: Option<Credentials>,
}

impl ConfigManager {
    /// Load `config_path` (if present) for `deployment`, or the deployment chosen
    /// by the environment, then apply environment overrides.
    pub fn load(config_path: &Path, deployment: Option<Deployment>) -> Result<Self> {
        let deployment = deployment.unwrap_or_else(Deployment::from_env);
        let mut config = Self::load_from(config_path, deployment)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.environment = config.environment.resolved()?;
        Ok(config)
    }

    fn load_from(config_path: &Path, deployment: Deployment) -> Result<Self> {
        app_log!(info, "Loading configuration for environment: {}", deployment);

        let file = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            serde_yaml::from_str::<ConfigFile>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            app_log!(
                debug,
                "{} not found, using built-in defaults",
                config_path.display()
            );
            ConfigFile::default()
        };

        let section = match deployment {
            Deployment::Local => file.local,
            Deployment::Hosted => file.hosted,
        };
        let environment = match section {
            Some(environment) => environment,
            None => EnvironmentConfig::defaults(deployment)?,
        };

        Ok(Self {
            deployment,
            environment,
            firebase: file.firebase,
            redirect_credentials: None,
        })
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(api_url) = lookup("CVTAILOR_API_URL") {
            self.environment.api_url = Url::parse(&api_url)
                .with_context(|| format!("CVTAILOR_API_URL is not a valid URL: {}", api_url))?;
        }
        if let Some(api_key) = lookup("CVTAILOR_FIREBASE_API_KEY") {
            self.firebase.api_key = Some(api_key);
        }
        if let (Some(email), Some(password)) =
            (lookup("CVTAILOR_EMAIL"), lookup("CVTAILOR_PASSWORD"))
        {
            self.redirect_credentials = Some(Credentials::new(email, password));
        }
        Ok(())
    }

    /// Identity provider settings. Fails when no API key is configured.
    pub fn firebase_config(&self) -> Result<FirebaseConfig> {
        let api_key = self
            .firebase
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .context(
                "Firebase API key missing: set firebase.api_key in config.yaml or CVTAILOR_FIREBASE_API_KEY",
            )?;

        let mut config = FirebaseConfig::new(api_key, &self.environment.session_path);
        if let Some(url) = &self.firebase.identity_toolkit_url {
            config = config.with_identity_toolkit_url(url.trim_end_matches('/'));
        }
        if let Some(url) = &self.firebase.secure_token_url {
            config = config.with_secure_token_url(url.trim_end_matches('/'));
        }
        if let Some(credentials) = &self.redirect_credentials {
            config = config.with_redirect_credentials(credentials.clone());
        }
        Ok(config)
    }

    /// Ensure all required directories exist
    pub async fn ensure_directories(&self) -> Result<()> {
        self.environment.ensure_directories().await
    }
}
