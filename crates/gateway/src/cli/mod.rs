pub mod config;
pub mod dispatch;
pub mod pid;

use clap::{Parser, Subcommand};

/// facadegw: one envelope, many domain facades.
#[derive(Debug, Parser)]
#[command(name = "facadegw", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Dispatch one envelope locally and print the response envelope.
    Dispatch {
        /// Target facade (e.g. `files`, `code`).
        domain: String,
        /// Request envelope as JSON, e.g. '{"cmd":"languages"}'.
        envelope: String,
        /// Caller identity used for rate limiting.
        #[arg(long, default_value = "cli")]
        caller: String,
    },
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `FG_CONFIG` (or `config.toml`).
/// A missing file means all defaults.  Returns the parsed config and the
/// path that was used.
pub fn load_config() -> anyhow::Result<(fg_domain::config::Config, String)> {
    let config_path = std::env::var("FG_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<fg_domain::config::Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(fg_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}
