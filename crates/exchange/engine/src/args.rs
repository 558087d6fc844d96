//! CLI arguments for the exchange engine.

use std::time::Duration;

use cairn_exchange_ledger::{DEFAULT_DEBT_RATIO, DEFAULT_MAX_WANTS, StrategyKind};
use cairn_exchange_tracker::AdjusterArgs;
use clap::Args;
use serde::{Deserialize, Serialize};

/// Default number of providers requested from routing per want.
const DEFAULT_PROVIDER_LIMIT: usize = 20;
/// Default provider search budget in seconds.
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 5;
/// Default time a sent want waits for a block, in seconds.
const DEFAULT_WANT_TIMEOUT_SECS: u64 = 60;
/// Default number of completed wants per fan-out observation.
const DEFAULT_OBSERVATION_BATCH: usize = 8;
/// Default number of finished want states remembered.
const DEFAULT_FINISHED_CACHE: usize = 1024;

/// Exchange engine CLI arguments.
#[derive(Debug, Args, Clone, PartialEq, Serialize, Deserialize)]
#[command(next_help_heading = "Block Exchange")]
#[serde(default)]
pub struct ExchangeArgs {
    /// Providers requested from routing per want
    #[arg(long = "exchange.provider-limit", default_value_t = DEFAULT_PROVIDER_LIMIT)]
    pub provider_limit: usize,

    /// Provider search timeout in seconds
    #[arg(
        long = "exchange.search-timeout",
        value_name = "SECS",
        default_value_t = DEFAULT_SEARCH_TIMEOUT_SECS
    )]
    pub search_timeout_secs: u64,

    /// Time a sent want waits for the block, in seconds
    #[arg(
        long = "exchange.want-timeout",
        value_name = "SECS",
        default_value_t = DEFAULT_WANT_TIMEOUT_SECS
    )]
    pub want_timeout_secs: u64,

    /// Bound on each partner's want-list
    #[arg(long = "exchange.max-wants-per-peer", default_value_t = DEFAULT_MAX_WANTS)]
    pub max_wants_per_peer: usize,

    /// Default send strategy for partners
    #[arg(long = "exchange.strategy", value_enum, default_value_t = StrategyKind::Always)]
    pub strategy: StrategyKind,

    /// Debt ratio above which the debt-ratio strategy stops sending
    #[arg(long = "exchange.debt-ratio", default_value_t = DEFAULT_DEBT_RATIO)]
    pub debt_ratio: f64,

    /// Completed wants per fan-out adjustment
    #[arg(long = "exchange.observation-batch", default_value_t = DEFAULT_OBSERVATION_BATCH)]
    pub observation_batch: usize,

    /// Finished want states remembered for duplicate detection
    #[arg(long = "exchange.finished-cache", default_value_t = DEFAULT_FINISHED_CACHE)]
    pub finished_cache: usize,

    #[command(flatten)]
    pub fanout: AdjusterArgs,
}

impl Default for ExchangeArgs {
    fn default() -> Self {
        Self {
            provider_limit: DEFAULT_PROVIDER_LIMIT,
            search_timeout_secs: DEFAULT_SEARCH_TIMEOUT_SECS,
            want_timeout_secs: DEFAULT_WANT_TIMEOUT_SECS,
            max_wants_per_peer: DEFAULT_MAX_WANTS,
            strategy: StrategyKind::default(),
            debt_ratio: DEFAULT_DEBT_RATIO,
            observation_batch: DEFAULT_OBSERVATION_BATCH,
            finished_cache: DEFAULT_FINISHED_CACHE,
            fanout: AdjusterArgs::default(),
        }
    }
}

impl ExchangeArgs {
    /// Provider search budget.
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    /// How long a sent want waits for its block.
    pub fn want_timeout(&self) -> Duration {
        Duration::from_secs(self.want_timeout_secs)
    }

    /// Validate argument values.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_limit == 0 {
            return Err("exchange.provider-limit must be at least 1".to_string());
        }
        if self.want_timeout_secs == 0 {
            return Err("exchange.want-timeout must be at least 1 second".to_string());
        }
        if self.max_wants_per_peer == 0 {
            return Err("exchange.max-wants-per-peer must be at least 1".to_string());
        }
        if self.observation_batch == 0 {
            return Err("exchange.observation-batch must be at least 1".to_string());
        }
        if self.strategy == StrategyKind::DebtRatio
            && !(self.debt_ratio.is_finite() && self.debt_ratio >= 0.0)
        {
            return Err("exchange.debt-ratio must be a non-negative number".to_string());
        }
        self.fanout.validate()
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        exchange: ExchangeArgs,
    }

    #[test]
    fn test_defaults_match_clap() {
        let cli = Cli::parse_from(["cairn"]);
        assert_eq!(cli.exchange, ExchangeArgs::default());
        assert_eq!(cli.exchange.search_timeout(), Duration::from_secs(5));
        assert_eq!(cli.exchange.want_timeout(), Duration::from_secs(60));
        assert!(cli.exchange.validate().is_ok());
    }

    #[test]
    fn test_strategy_flags() {
        let cli = Cli::parse_from([
            "cairn",
            "--exchange.strategy",
            "debt-ratio",
            "--exchange.debt-ratio",
            "2.5",
            "--fanout.initial",
            "4",
        ]);
        assert_eq!(cli.exchange.strategy, StrategyKind::DebtRatio);
        assert_eq!(cli.exchange.debt_ratio, 2.5);
        assert_eq!(cli.exchange.fanout.initial, 4);
        assert!(cli.exchange.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let negative = ExchangeArgs {
            strategy: StrategyKind::DebtRatio,
            debt_ratio: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let no_providers = ExchangeArgs {
            provider_limit: 0,
            ..Default::default()
        };
        assert!(no_providers.validate().is_err());

        let bad_fanout = ExchangeArgs {
            fanout: AdjusterArgs {
                initial: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(bad_fanout.validate().is_err());
    }
}
