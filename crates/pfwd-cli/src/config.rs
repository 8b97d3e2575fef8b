//! Forwarder configuration: TOML file + CLI overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use pfwd_core::ForwarderConfig;
use serde::Deserialize;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub forward: ForwardSection,
}

/// `[forward]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardSection {
    /// Local bind address, e.g. `0.0.0.0:8080`.
    pub local: Option<String>,
    /// Remote target, e.g. `1.1.1.1:80` or `example.com:80`.
    pub remote: Option<String>,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for ForwardSection {
    fn default() -> Self {
        Self {
            local: None,
            remote: None,
            idle_timeout_secs: default_idle_timeout(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    15
}
fn default_refresh_interval() -> u64 {
    300
}

/// Load config from a TOML file (if present), then apply CLI overrides.
///
/// The local and remote addresses must come from either source; everything
/// else has defaults.
pub fn load(
    config_path: Option<&Path>,
    cli_local: Option<String>,
    cli_remote: Option<String>,
    cli_idle_timeout: Option<u64>,
    cli_refresh_interval: Option<u64>,
) -> anyhow::Result<ForwarderConfig> {
    let file_config = if let Some(path) = config_path {
        if path.exists() {
            info!(path = %path.display(), "loading config file");
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config {}", path.display()))?;
            parse(&content)?
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            ConfigFile::default()
        }
    } else {
        ConfigFile::default()
    };

    merge(file_config, cli_local, cli_remote, cli_idle_timeout, cli_refresh_interval)
}

fn parse(content: &str) -> anyhow::Result<ConfigFile> {
    toml::from_str(content).context("config parse error")
}

fn merge(
    file_config: ConfigFile,
    cli_local: Option<String>,
    cli_remote: Option<String>,
    cli_idle_timeout: Option<u64>,
    cli_refresh_interval: Option<u64>,
) -> anyhow::Result<ForwarderConfig> {
    let Some(local) = cli_local.or(file_config.forward.local) else {
        bail!("no local address: pass -l or set forward.local in the config file");
    };
    let Some(remote) = cli_remote.or(file_config.forward.remote) else {
        bail!("no remote address: pass -r or set forward.remote in the config file");
    };

    let mut config = ForwarderConfig::new(local, remote);
    config.idle_timeout = Duration::from_secs(
        cli_idle_timeout.unwrap_or(file_config.forward.idle_timeout_secs),
    );
    config.refresh_interval = Duration::from_secs(
        cli_refresh_interval.unwrap_or(file_config.forward.refresh_interval_secs),
    );
    Ok(config)
}
