use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_FALLBACK_REPLY: &str = "Something went wrong. Please try again.";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bearer token for the completion endpoint
    pub api_key: Option<String>,

    /// Chat-completion endpoint URL
    pub endpoint: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Request incremental delivery of replies
    pub stream: bool,

    /// Reply shown when a request fails for any reason
    pub fallback_reply: String,

    /// Maximum characters kept from a message when titling a history entry
    pub history_title_len: usize,

    /// Key-value store file
    pub store_path: Option<PathBuf>,

    /// Yuno home directory
    #[serde(skip)]
    pub yuno_home: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        Config {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            stream: true,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            history_title_len: 40,
            store_path: None,
            yuno_home: home.join(".yuno"),
        }
    }
}

impl Config {
    /// Load configuration from `~/.yuno/config.toml`, falling back to defaults
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Self::load_from(&home.join(".yuno"))
    }

    /// Load configuration rooted at an explicit home directory
    pub fn load_from(yuno_home: &Path) -> Result<Self> {
        let config_path = yuno_home.join("config.toml");

        fs::create_dir_all(yuno_home).context("Failed to create .yuno directory")?;

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.yuno_home = yuno_home.to_path_buf();

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.yuno_home.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Get API key from config or environment
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Update API key
    pub fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key);
    }

    /// Resolved location of the key-value store file
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| self.yuno_home.join("store.json"))
    }
}
