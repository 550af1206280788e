//! Vault configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use filvault_core::Network;

use crate::codec::{KdfParams, SecretCodec};
use crate::error::Result;

/// Environment variable overriding the repository path
pub const REPO_ENV: &str = "FILVAULT_PATH";

/// File name of the config inside the repository
pub const CONFIG_FILE: &str = "config.toml";

/// Vault configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Repository directory; the key-value data lives in `<repo>/db`
    pub repo_path: PathBuf,

    /// Network letter used when rendering new addresses
    pub network: Network,

    /// scrypt parameters for newly encrypted blobs
    pub kdf: KdfParams,

    /// Minimum password length accepted when a secret is first encrypted
    pub min_password_len: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            repo_path: Self::default_repo_path(),
            network: Network::Mainnet,
            kdf: KdfParams::default(),
            min_password_len: 6,
        }
    }
}

impl VaultConfig {
    /// Default configuration rooted at `repo_path`
    pub fn at(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            ..Self::default()
        }
    }

    fn default_repo_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".filvault")
    }

    /// Pick the repository: explicit flag, then `FILVAULT_PATH`, then
    /// `~/.filvault`
    pub fn resolve_repo_path(flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| std::env::var_os(REPO_ENV).map(PathBuf::from))
            .unwrap_or_else(Self::default_repo_path)
    }

    /// Load `<repo>/config.toml`, falling back to defaults when absent
    pub fn load(repo_path: &Path) -> Result<Self> {
        let path = repo_path.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.repo_path = repo_path.to_path_buf();
        Ok(config)
    }

    /// Save to `<repo>/config.toml`
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.repo_path)?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(self.config_path(), content)?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.repo_path.join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.repo_path.join("db")
    }

    pub fn codec(&self) -> SecretCodec {
        SecretCodec::new(self.kdf)
    }
}
