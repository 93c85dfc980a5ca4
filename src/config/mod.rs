use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::client::{Account, DEFAULT_BASE_URL};
use crate::{Result, SgcError};

/// Local configuration at `~/.config/sgc/config.yml`: the stored account
/// credentials plus the cluster base URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub username: Option<String>,
    pub api_key: Option<String>,

    /// Cluster base URL; defaults to the local development address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Config {
    /// Load the config file, or defaults if none exists yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs_err::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| {
            SgcError::Validation(format!("failed to parse {}: {e}", path.display()))
        })
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| SgcError::Validation(format!("failed to serialize config: {e}")))?;
        fs_err::write(path, content)?;
        Ok(())
    }

    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            SgcError::Validation("could not determine the user config directory".to_string())
        })?;
        Ok(config_dir.join("sgc").join("config.yml"))
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn set_credentials(&mut self, account: &Account) {
        self.username = Some(account.username.clone());
        self.api_key = Some(account.api_key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.yml")).unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sgc").join("config.yml");

        let mut config = Config::default();
        config.set_credentials(&Account {
            username: "alice".to_string(),
            api_key: "secret-key".to_string(),
        });
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.username.as_deref(), Some("alice"));
        assert_eq!(loaded.api_key.as_deref(), Some("secret-key"));
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs_err::write(&path, ":::not yaml {{").unwrap();
        assert!(matches!(
            Config::load_from(&path).unwrap_err(),
            SgcError::Validation(_)
        ));
    }
}
