//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rq - range maintenance queue simulator
#[derive(Parser)]
#[command(
    name = "rq",
    about = "Run and inspect the background range maintenance queue",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/rangequeue/logs/rq.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run a store of synthetic ranges against a fault-injecting queue
    Simulate {
        /// Ranges hosted at startup (overrides config)
        #[arg(short, long)]
        ranges: Option<usize>,

        /// Seconds to run (overrides config)
        #[arg(short, long)]
        duration_secs: Option<u64>,

        /// Worker count (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration as YAML
    Config,
}

/// Output format for reports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format() {
        assert_eq!("TEXT".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from(["rq", "-v", "simulate", "--ranges", "10", "-d", "2", "--format", "json"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Simulate {
                ranges,
                duration_secs,
                concurrency,
                format,
            } => {
                assert_eq!(ranges, Some(10));
                assert_eq!(duration_secs, Some(2));
                assert_eq!(concurrency, None);
                assert_eq!(format, OutputFormat::Json);
            }
            Command::Config => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_parse_config_with_path() {
        let cli = Cli::try_parse_from(["rq", "config", "--config", "/tmp/rq.yml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/rq.yml")));
        assert!(matches!(cli.command, Command::Config));
    }
}
