use crate::cli::Cli;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{path::Path, time::Duration};
use url::Url;

pub const DEFAULT_BINARY: &str = "glab";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;

/// Where the command table comes from: a hand-maintained catalog of glab's
/// core commands, or best-effort scraping of `glab --help` at runtime.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    #[default]
    Static,
    Dynamic,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub binary: String,
    pub discovery: DiscoveryMode,
    pub cache_ttl_secs: u64,
    pub command_timeout_secs: Option<u64>,
    pub repo: Option<String>,
    pub gitlab_host: Option<Url>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            discovery: DiscoveryMode::default(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            command_timeout_secs: Some(DEFAULT_COMMAND_TIMEOUT_SECS),
            repo: None,
            gitlab_host: None,
        }
    }
}

impl Config {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// `None` disables the timeout; a hung glab then hangs only its own call.
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

pub async fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config_file {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            parse_config(&content, path)?
        }
        None => Config::default(),
    };

    if let Some(binary) = &cli.glab_binary {
        config.binary = binary.clone();
    }
    if let Some(discovery) = &cli.discovery {
        config.discovery = match discovery.as_str() {
            "dynamic" => DiscoveryMode::Dynamic,
            _ => DiscoveryMode::Static,
        };
    }
    if let Some(ttl) = cli.cache_ttl {
        config.cache_ttl_secs = ttl;
    }
    if let Some(timeout) = cli.command_timeout {
        config.command_timeout_secs = if timeout == 0 { None } else { Some(timeout) };
    }
    if let Some(repo) = &cli.repo {
        config.repo = Some(repo.clone());
    }
    if let Some(host) = &cli.gitlab_host {
        config.gitlab_host = Some(
            Url::parse(host).with_context(|| format!("Invalid GitLab host URL: {host}"))?,
        );
    }

    Ok(config)
}

fn parse_config(content: &str, file_path: &Path) -> Result<Config> {
    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("json");

    match extension.to_lowercase().as_str() {
        "json" => serde_json::from_str(content).context("Failed to parse JSON config"),
        "yaml" | "yml" => serde_yaml::from_str(content).context("Failed to parse YAML config"),
        "toml" => toml::from_str(content).context("Failed to parse TOML config"),
        _ => Err(anyhow::anyhow!(
            "Unsupported config file format: {}",
            extension
        )),
    }
}
