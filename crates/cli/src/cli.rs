//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Callback Dispatch - build dispatcher topologies and push events through them
#[derive(Parser, Debug)]
#[command(
    name = "callback-dispatch",
    author,
    version,
    about = "Event-callback dispatcher topologies",
    long_about = "Builds a tree of event-callback dispatchers from a topology file.\n\n\
                  Each dispatcher copies payloads into a fixed ring, queues a record \n\
                  and runs registered handlers on its own worker thread; handlers may \n\
                  propagate payloads to the parent dispatcher."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CALLBACK_DISPATCH_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "CALLBACK_DISPATCH_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Level used when RUST_LOG is unset
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the topology and fire events into it
    Run(RunArgs),

    /// Validate a topology file without running
    Validate(ValidateArgs),

    /// Display topology information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to topology file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "topology.toml",
        env = "CALLBACK_DISPATCH_CONFIG"
    )]
    pub config: PathBuf,

    /// Dispatchers that receive generated events (default: every leaf)
    #[arg(long = "entry", value_delimiter = ',')]
    pub entries: Vec<String>,

    /// Events each producer sends to each entry dispatcher
    #[arg(long, default_value = "1000", env = "CALLBACK_DISPATCH_EVENTS")]
    pub events: u64,

    /// Number of producer threads
    #[arg(long, default_value = "2")]
    pub producers: usize,

    /// Target slot index for every call; negative broadcasts
    #[arg(long, default_value = "-1", allow_negative_numbers = true)]
    pub target_index: i32,

    /// Attached handlers propagate to the parent dispatcher
    #[arg(long)]
    pub propagate: bool,

    /// Also attach a handler that logs every payload
    #[arg(long)]
    pub log_payloads: bool,

    /// Seconds to wait for queues to drain after producers finish
    #[arg(long, default_value = "5")]
    pub drain_timeout: u64,

    /// Validate the topology and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "CALLBACK_DISPATCH_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to topology file to validate
    #[arg(short, long, default_value = "topology.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to topology file
    #[arg(short, long, default_value = "topology.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show worker thread settings
    #[arg(long)]
    pub workers: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "callback-dispatch",
            "-v",
            "run",
            "--config",
            "t.toml",
            "--entry",
            "can0,can1",
            "--events",
            "10",
            "--target-index",
            "-1",
            "--propagate",
        ])
        .unwrap();

        assert_eq!(cli.default_log_level(), "debug");
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.entries, vec!["can0", "can1"]);
        assert_eq!(args.events, 10);
        assert_eq!(args.target_index, -1);
        assert!(args.propagate);
        assert!(!args.log_payloads);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["callback-dispatch", "-q", "-v", "info"]).is_err());
        let cli = Cli::try_parse_from(["callback-dispatch", "-q", "info"]).unwrap();
        assert_eq!(cli.default_log_level(), "error");
    }
}
