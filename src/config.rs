use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result, anyhow};

pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8787";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_UPSTREAM_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where the chat client sends generation requests
    pub proxy_url: String,
    /// Address the proxy binds to
    pub listen_addr: String,
    /// Upstream generation service (proxy only)
    pub upstream_url: String,
    pub model: String,
    /// Upstream credential. Only the proxy reads this.
    pub gemini_api_key: Option<String>,
    /// Drop replies that arrive after the conversation was reset
    pub discard_stale_replies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            gemini_api_key: None,
            discard_stale_replies: true,
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Environment variables win over the config file
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DSA_TUTOR_PROXY_URL").filter(|v| !v.is_empty()) {
            self.proxy_url = url;
        }
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|v| !v.is_empty()) {
            self.gemini_api_key = Some(key);
        }
    }

    /// Where the API key came from, for the proxy's start-up log
    pub fn key_source(&self) -> Option<&'static str> {
        if std::env::var("GEMINI_API_KEY").is_ok_and(|v| !v.is_empty()) {
            Some("env")
        } else if self.gemini_api_key.is_some() {
            Some("config")
        } else {
            None
        }
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("dsa-tutor").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert!(config.discard_stale_replies);
        assert_eq!(config.proxy_url, DEFAULT_PROXY_URL);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.model = "gemini-1.5-pro".to_string();
        config.discard_stale_replies = false;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "proxy_url": "http://tutor.internal:9000" }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.proxy_url, "http://tutor.internal:9000");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        fs::write(&path, r#"{ "proxy_url": "http://tutor.internal:9000", "#).unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains(&path.display().to_string()));

        fs::write(&path, r#"{ "discard_stale_replies": "yes" }"#).unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = Config::new();
        config.gemini_api_key = Some("from-file".to_string());

        config.apply_overrides(|name| match name {
            "DSA_TUTOR_PROXY_URL" => Some("http://10.0.0.2:8787".to_string()),
            "GEMINI_API_KEY" => Some("from-env".to_string()),
            _ => None,
        });

        assert_eq!(config.proxy_url, "http://10.0.0.2:8787");
        assert_eq!(config.gemini_api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_empty_overrides_are_ignored() {
        let mut config = Config::new();
        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config, Config::new());
    }
}
