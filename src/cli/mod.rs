//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Ponte using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Ponte - clinical record bridge to the national FHIR registry
#[derive(Parser, Debug)]
#[command(name = "ponte")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ponte.toml", env = "PONTE_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "PONTE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sync, retry and cleanup workers until interrupted
    Run(commands::run::RunArgs),

    /// Synchronize one citizen once and exit
    Sync(commands::sync::SyncArgs),

    /// Check registry connectivity and show sync state
    Status(commands::status::StatusArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["ponte", "run"]);
        assert_eq!(cli.config, "ponte.toml");
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["ponte", "--config", "custom.toml", "run"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["ponte", "--log-level", "debug", "run"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_sync_with_cpf() {
        let cli = Cli::parse_from(["ponte", "sync", "--cpf", "12345678901"]);
        match cli.command {
            Commands::Sync(args) => assert_eq!(args.cpf, Some("12345678901".to_string())),
            _ => panic!("expected sync command"),
        }
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["ponte", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["ponte", "status"]);
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["ponte", "init", "--force"]);
        match cli.command {
            Commands::Init(args) => assert!(args.force),
            _ => panic!("expected init command"),
        }
    }
}
