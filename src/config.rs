use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::is_local_endpoint_url;

pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub agent_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub workspace_root: PathBuf,
    pub autosave_debounce_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let agent_url = std::env::var("COWORK_AGENT_URL")
            .unwrap_or_else(|_| "http://localhost:8700/v1/agent/stream".to_string());
        let api_key = std::env::var("COWORK_API_KEY").ok().and_then(|v| {
            if v.trim().is_empty() {
                None
            } else {
                Some(v)
            }
        });
        let model =
            std::env::var("COWORK_MODEL").unwrap_or_else(|_| "default".to_string());
        let workspace_root = match std::env::var("COWORK_WORKSPACE") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => std::env::current_dir()?,
        };
        let autosave_debounce_ms = std::env::var("COWORK_AUTOSAVE_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_AUTOSAVE_DEBOUNCE_MS);

        Ok(Self {
            agent_url,
            api_key,
            model,
            workspace_root,
            autosave_debounce_ms,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.agent_url.starts_with("http://") && !self.agent_url.starts_with("https://") {
            bail!(
                "Invalid COWORK_AGENT_URL '{}': expected http:// or https:// URL",
                self.agent_url
            );
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            bail!(
                "COWORK_API_KEY must be set for non-local agent endpoints (url: '{}')",
                self.agent_url
            );
        }

        if !self.workspace_root.is_dir() {
            bail!(
                "Workspace root '{}' is not a directory",
                self.workspace_root.display()
            );
        }

        Ok(())
    }

    fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.agent_url)
    }
}
