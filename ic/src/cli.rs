//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Irrigation controller - runs watering programs against a valve device
#[derive(Parser)]
#[command(
    name = "ic",
    about = "Run irrigation programs against a network valve",
    version,
    after_help = "Logs are written to: ~/.local/share/irrigation/logs/ic.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the programs in the program file
    List {
        /// Program file (overrides `programs-file` from config)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Run a program to completion
    Run {
        /// Program id
        id: i64,

        /// Program file (overrides `programs-file` from config)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Valve device address, host[:port] (overrides `device.address`)
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Query the live valve state
    Status {
        /// Valve device address, host[:port] (overrides `device.address`)
        #[arg(short, long)]
        address: Option<String>,
    },
}

/// Path of the `ic` log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("irrigation")
        .join("logs")
        .join("ic.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_global_flags() {
        let cli = Cli::try_parse_from(["ic", "run", "3", "--address", "10.0.0.9:8080", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Run { id, file, address } => {
                assert_eq!(id, 3);
                assert!(file.is_none());
                assert_eq!(address.as_deref(), Some("10.0.0.9:8080"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_with_config() {
        let cli = Cli::try_parse_from(["ic", "--config", "ic.yml", "list", "-f", "progs.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ic.yml")));
        assert!(matches!(cli.command, Command::List { file: Some(_) }));
    }

    #[test]
    fn test_run_requires_numeric_id() {
        assert!(Cli::try_parse_from(["ic", "run", "lawn"]).is_err());
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("irrigation/logs/ic.log"));
    }
}
