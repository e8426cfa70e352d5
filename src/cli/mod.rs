//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Hierarchical test execution with out-of-process agents
#[derive(Parser, Debug)]
#[command(name = "suitegrid")]
#[command(version)]
#[command(about = "Launch platform-specific test agents and render suite results")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to the standard search locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List configured launchers and the platforms they serve
    Platforms,

    /// Start a worker agent for a package and wait for it to register
    Request(RequestArgs),

    /// Render a saved result tree
    Results(ResultsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for request command
#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// Package name
    pub package: String,

    /// Start from a named package profile
    #[arg(long)]
    pub profile: Option<String>,

    /// Target platform (current, x86, x64, arm64)
    #[arg(short, long)]
    pub platform: Option<String>,

    /// Runtime framework the worker must use
    #[arg(short, long)]
    pub runtime: Option<String>,

    /// Extra package setting (repeatable)
    #[arg(short, long = "setting", value_name = "KEY=VALUE", value_parser = parse_setting)]
    pub settings: Vec<(String, String)>,

    /// Seconds to wait for the worker to register (0 waits forever)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Leave the agent service running until Ctrl-C after the worker registers
    #[arg(long)]
    pub hold: bool,
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    /// JSON result file
    pub file: PathBuf,

    /// Output format (table, json, json-pretty, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Save rendered output to file
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Destination path
        #[arg(default_value = "suitegrid.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show {
        /// Print as JSON instead of YAML
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the discovered file)
        path: Option<PathBuf>,
    },

    /// Describe supported environment variables
    Env,
}

/// Parse a `KEY=VALUE` package setting
fn parse_setting(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
