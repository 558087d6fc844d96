//! Logging CLI arguments.

use clap::Args;
use serde::{Deserialize, Serialize};

/// Logging configuration.
#[derive(Debug, Args, Clone, Default, Serialize, Deserialize)]
#[command(next_help_heading = "Logging")]
#[serde(default)]
pub struct LogArgs {
    /// Silence all output except errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv, -vvv, etc.).
    #[arg(short, long, action = clap::ArgAction::Count)]
    #[serde(skip)] // CLI-only, count action doesn't make sense in config
    pub verbosity: u8,

    /// Log filter directive (e.g., "cairn_exchange=debug,cairn_net_dialer=trace").
    #[arg(long = "log.filter", value_name = "DIRECTIVE")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json")]
    pub json: bool,
}

impl LogArgs {
    /// Base level implied by the verbosity count.
    pub fn base_level(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        logs: LogArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["cairn"]);
        assert!(!cli.logs.quiet);
        assert_eq!(cli.logs.verbosity, 0);
        assert_eq!(cli.logs.base_level(), "info");
        assert!(cli.logs.filter.is_none());
    }

    #[test]
    fn test_verbosity_and_filter() {
        let cli = Cli::parse_from(["cairn", "-vv", "--log.filter", "cairn_exchange=trace"]);
        assert_eq!(cli.logs.verbosity, 2);
        assert_eq!(cli.logs.base_level(), "trace");
        assert_eq!(cli.logs.filter.as_deref(), Some("cairn_exchange=trace"));
    }
}
