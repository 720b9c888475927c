use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use anyhow::{Result, anyhow};

use crate::gemini::DEFAULT_MODEL;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub model: Option<String>,
    pub docs_dir: Option<PathBuf>,
    pub gemini_api_key: Option<String>,
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

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    /// The credential, environment first, stored config second. `None` is a
    /// fatal startup condition handled by the caller.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .or_else(|| self.gemini_api_key.clone())
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.docs_dir.clone().unwrap_or_else(|| PathBuf::from("docs"))
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("benefits-navigator").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::new();
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.docs_dir(), PathBuf::from("docs"));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let config = Config {
            model: Some("gemini-1.5-flash".to_string()),
            docs_dir: Some(PathBuf::from("/srv/policies")),
            gemini_api_key: None,
        };
        assert_eq!(config.model(), "gemini-1.5-flash");
        assert_eq!(config.docs_dir(), PathBuf::from("/srv/policies"));
    }
}
