//! CLI arguments for the fan-out adjuster.

use clap::Args;
use serde::{Deserialize, Serialize};

/// Default fan-out width before any observation.
pub const DEFAULT_INITIAL_FANOUT: usize = 1;
/// Default upper bound on the fan-out width.
pub const DEFAULT_MAX_FANOUT: usize = 32;
/// Default hit ratio a batch must exceed to count as a hit.
pub const DEFAULT_HIT_RATIO: f64 = 0.75;
/// Default number of observations kept for the latency average.
pub const DEFAULT_WINDOW: usize = 3;
/// Default increment while cooperating.
pub const DEFAULT_COARSE_STEP: usize = 2;
/// Default increment while a full provider.
pub const DEFAULT_FINE_STEP: usize = 1;
/// Default tolerated latency deviation.
pub const DEFAULT_ALLOWED_VARIATION: f64 = 0.05;

/// Adaptive fan-out CLI arguments.
#[derive(Debug, Args, Clone, PartialEq, Serialize, Deserialize)]
#[command(next_help_heading = "Fan-out")]
#[serde(default)]
pub struct AdjusterArgs {
    /// Providers asked per want before any observation
    #[arg(long = "fanout.initial", default_value_t = DEFAULT_INITIAL_FANOUT)]
    pub initial: usize,

    /// Upper bound on providers asked per want
    #[arg(long = "fanout.max", default_value_t = DEFAULT_MAX_FANOUT)]
    pub max: usize,

    /// Hit ratio above which a batch counts as a hit
    #[arg(long = "fanout.hit-ratio", default_value_t = DEFAULT_HIT_RATIO)]
    pub hit_ratio: f64,

    /// Observations averaged, and consecutive hits needed to become a full provider
    #[arg(long = "fanout.window", default_value_t = DEFAULT_WINDOW)]
    pub window: usize,

    /// Fan-out increment on a hit while cooperating
    #[arg(long = "fanout.coarse-step", default_value_t = DEFAULT_COARSE_STEP)]
    pub coarse_step: usize,

    /// Fan-out increment on better-than-average latency while a full provider
    #[arg(long = "fanout.fine-step", default_value_t = DEFAULT_FINE_STEP)]
    pub fine_step: usize,

    /// Tolerated latency deviation, relative to the distance from the best seen
    #[arg(long = "fanout.allowed-variation", default_value_t = DEFAULT_ALLOWED_VARIATION)]
    pub allowed_variation: f64,
}

impl Default for AdjusterArgs {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_FANOUT,
            max: DEFAULT_MAX_FANOUT,
            hit_ratio: DEFAULT_HIT_RATIO,
            window: DEFAULT_WINDOW,
            coarse_step: DEFAULT_COARSE_STEP,
            fine_step: DEFAULT_FINE_STEP,
            allowed_variation: DEFAULT_ALLOWED_VARIATION,
        }
    }
}

impl AdjusterArgs {
    /// Validate argument values.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial == 0 || self.max == 0 {
            return Err("fan-out widths must be at least 1".to_string());
        }
        if self.initial > self.max {
            return Err(format!(
                "fanout.initial ({}) exceeds fanout.max ({})",
                self.initial, self.max
            ));
        }
        if !(0.0..=1.0).contains(&self.hit_ratio) {
            return Err("fanout.hit-ratio must be within [0, 1]".to_string());
        }
        if self.window == 0 {
            return Err("fanout.window must be at least 1".to_string());
        }
        if !self.allowed_variation.is_finite() || self.allowed_variation < 0.0 {
            return Err("fanout.allowed-variation must be a non-negative number".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        fanout: AdjusterArgs,
    }

    #[test]
    fn test_defaults_match_clap() {
        let cli = Cli::parse_from(["cairn"]);
        assert_eq!(cli.fanout, AdjusterArgs::default());
        assert!(cli.fanout.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let bad = AdjusterArgs {
            initial: 8,
            max: 4,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = AdjusterArgs {
            hit_ratio: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let cli = Cli::parse_from(["cairn", "--fanout.window", "5", "--fanout.max", "8"]);
        assert_eq!(cli.fanout.window, 5);
        assert_eq!(cli.fanout.max, 8);
    }
}
