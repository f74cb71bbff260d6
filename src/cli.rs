use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3001";

#[derive(Parser, Clone)]
#[command(version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
pub struct Cli {
    #[arg(short, long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    #[arg(
        long = "transport",
        value_name = "TRANSPORT",
        env = "GLAB_MCP_TRANSPORT",
        default_value = "stdio",
        value_parser = ["stdio", "sse", "streamable-http"]
    )]
    pub transport: String,

    #[arg(
        long = "bind-address",
        value_name = "ADDRESS",
        env = "GLAB_MCP_BIND_ADDRESS",
        default_value = DEFAULT_BIND_ADDRESS
    )]
    pub bind_address: String,

    #[arg(
        long = "glab-binary",
        value_name = "PATH",
        help = "Path to the glab executable. Will override the value in your config file if set.",
        env = "GLAB_MCP_BINARY"
    )]
    pub glab_binary: Option<String>,

    #[arg(
        long = "discovery",
        value_name = "MODE",
        help = "Capability source: a hand-maintained static catalog or dynamic help-text scanning. Will override the value in your config file if set.",
        env = "GLAB_MCP_DISCOVERY",
        value_parser = ["static", "dynamic"]
    )]
    pub discovery: Option<String>,

    #[arg(
        long = "cache-ttl",
        value_name = "SECONDS",
        help = "How long a discovered command table stays fresh. Will override the value in your config file if set.",
        env = "GLAB_MCP_CACHE_TTL"
    )]
    pub cache_ttl: Option<u64>,

    #[arg(
        long = "command-timeout",
        value_name = "SECONDS",
        help = "Kill a glab invocation that runs longer than this. Will override the value in your config file if set.",
        env = "GLAB_MCP_COMMAND_TIMEOUT"
    )]
    pub command_timeout: Option<u64>,

    #[arg(
        long = "repo",
        value_name = "NAMESPACE/PROJECT",
        help = "Default repository passed to glab as -R when a tool call names none.",
        env = "GLAB_MCP_REPO"
    )]
    pub repo: Option<String>,

    #[arg(
        long = "gitlab-host",
        value_name = "URL",
        help = "GitLab instance URL, exported to glab as GITLAB_HOST.",
        env = "GITLAB_HOST"
    )]
    pub gitlab_host: Option<String>,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config_file: None,
            transport: "stdio".to_string(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            glab_binary: None,
            discovery: None,
            cache_ttl: None,
            command_timeout: None,
            repo: None,
            gitlab_host: None,
        }
    }
}
