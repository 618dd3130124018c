//! Server configuration loaded from TOML.

use std::{net::SocketAddr, path::Path};

use anyhow::Context as _;
use remote_shell_core::ProviderConfig;
use serde::Deserialize;

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV: &str = "REMOTE_SHELL_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket endpoint listens on.
    pub bind: SocketAddr,
    /// Filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub provider: ProviderConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_filter: "info".to_string(),
            provider: ProviderConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the file named by `REMOTE_SHELL_CONFIG`, or use defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
