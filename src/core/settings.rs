use crate::core::store::FileStateStore;
use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_STATUS_POINTER: &str = "/data/0/status";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Endpoint to poll.
    pub target: Option<String>,
    pub state_path: Option<PathBuf>,
    /// JSON pointer to the status string inside a response body.
    pub status_pointer: String,
    pub notifications: NotificationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target: None,
            state_path: None,
            status_pointer: DEFAULT_STATUS_POINTER.to_string(),
            notifications: NotificationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub desktop: bool,
    pub app_name: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            desktop: true,
            app_name: "paced-poller".to_string(),
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("paced-poller").join("config.toml"))
    }

    /// Loads from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path().context("Could not determine config directory")?,
        };

        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(?path, "Loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(target) = &self.target {
            parse_target(target)?;
        }

        if !self.status_pointer.is_empty() && !self.status_pointer.starts_with('/') {
            anyhow::bail!(
                "status_pointer must be empty or start with '/', got {:?}",
                self.status_pointer
            );
        }
        Ok(())
    }

    pub fn target_url(&self) -> Result<Url> {
        let target = self
            .target
            .as_deref()
            .context("No target configured. Pass --target or set `target` in the config file")?;
        parse_target(target)
    }

    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_path {
            Some(path) => Ok(path.clone()),
            None => FileStateStore::default_path().context("Could not determine data directory"),
        }
    }
}

fn parse_target(target: &str) -> Result<Url> {
    let url = Url::parse(target).with_context(|| format!("Invalid target URL: {target}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("target must be an http(s) URL, got scheme {other:?}"),
    }
}
