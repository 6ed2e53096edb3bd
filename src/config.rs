use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub default_model: Option<String>,
    pub auth_url: Option<String>,
    pub auth_api_key: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.default_model = Some(model.to_string());
        config.save()
    }

    /// Bearer token for the inference endpoint. Env vars win over the config
    /// file; `HF_TOKEN` is honored for people who already export one.
    pub fn resolved_api_token(&self) -> Option<String> {
        env::var("RAMBLE_API_TOKEN")
            .ok()
            .or_else(|| env::var("HF_TOKEN").ok())
            .or_else(|| self.api_token.clone())
            .filter(|t| !t.trim().is_empty())
    }

    /// Identity endpoint + key, when configured. Absent means local mode.
    pub fn resolved_auth(&self) -> Option<(String, String)> {
        let url = env::var("RAMBLE_AUTH_URL")
            .ok()
            .or_else(|| self.auth_url.clone())
            .filter(|u| !u.trim().is_empty())?;
        let key = env::var("RAMBLE_AUTH_KEY")
            .ok()
            .or_else(|| self.auth_api_key.clone())
            .unwrap_or_default();
        Some((url, key))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("config.json"))
    }

    pub fn history_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("history.json"))
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("ramble.log"))
    }

    fn app_dir() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("ramble"))
    }
}
