use arbiter_core::Mode;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "arbiter",
    version,
    about = "Governance gateway for AI agent tool calls"
)]
pub struct Cli {
    /// YAML configuration file. Without it, configuration comes from ARBITER_* variables.
    #[arg(long, global = true, env = "ARBITER_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Govern JSON-RPC tools/call traffic in front of a tool server
    Proxy(ProxyArgs),
    /// Verify a gateway credential against the published signing keys
    VerifyToken(VerifyTokenArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ProxyArgs {
    /// Address to accept agent traffic on (overrides proxy.listen_addr)
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Tool server to forward allowed traffic to (overrides proxy.backend_url)
    #[arg(long)]
    pub backend: Option<Url>,

    /// enforcing | permissive | dry-run (overrides governance.mode)
    #[arg(long)]
    pub mode: Option<Mode>,
}

#[derive(Parser, Debug, Clone)]
pub struct VerifyTokenArgs {
    /// Compact JWS credential
    #[arg(env = "ARBITER_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Signing key set location (overrides trust.jwks_url)
    #[arg(long)]
    pub jwks_url: Option<Url>,
}
