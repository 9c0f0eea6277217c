//! Configuration Management
//!
//! Handles persistent configuration storage for gdeploy.

use crate::gcp::retry::RetryPolicy;
use crate::reconcile::{Settings, DELETE_GUARD_RETRIES};
use crate::resource::fetcher::DEFAULT_PAGE_SIZE;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default Cloud Deploy region when neither CLI, config nor gcloud name one
pub const DEFAULT_LOCATION: &str = "us-central1";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Default project ID
    #[serde(default)]
    pub project: Option<String>,
    /// Default location
    #[serde(default)]
    pub location: Option<String>,
    /// API base path override, e.g. a regional endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Retries for transient HTTP failures
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Long-running operation polling
    #[serde(default = "RetryPolicy::polling")]
    pub poll: RetryPolicy,
    /// Upper bound on waiting for a single operation
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: None,
            location: None,
            endpoint: None,
            retry: RetryPolicy::default(),
            poll: RetryPolicy::polling(),
            operation_timeout_secs: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gdeploy").join("config.json"))
    }

    /// Load configuration from disk; a missing or unreadable file gives defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Self {
        serde_json::from_str(content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring invalid config file: {}", e);
            Self::default()
        })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective project (CLI > config > environment and gcloud default)
    pub fn effective_project(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.project.clone())
            .or_else(crate::gcp::auth::get_default_project)
    }

    /// Get effective location (CLI > config > gcloud default > us-central1)
    pub fn effective_location(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.location.clone())
            .or_else(crate::gcp::auth::get_default_region)
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string())
    }

    /// Reconciler settings derived from this configuration
    pub fn settings(&self) -> Settings {
        Settings {
            poll: self.poll,
            delete_guard: self.poll.with_max_attempts(DELETE_GUARD_RETRIES + 1),
            operation_timeout: self.operation_timeout_secs.map(Duration::from_secs),
            page_size: self.page_size,
        }
    }
}
