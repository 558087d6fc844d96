//! CLI arguments for dialing.

use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{
    DialConfig,
    config::{DEFAULT_DIAL_ATTEMPTS, DEFAULT_DIAL_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS},
};

/// Dialer CLI arguments.
#[derive(Debug, Args, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[command(next_help_heading = "Dialing")]
#[serde(default)]
pub struct DialArgs {
    /// Dial rounds per connection request
    #[arg(long = "dial.attempts", default_value_t = DEFAULT_DIAL_ATTEMPTS)]
    pub attempts: u32,

    /// Per-round dial timeout in seconds
    #[arg(long = "dial.timeout", value_name = "SECS", default_value_t = DEFAULT_DIAL_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Maximum open connections (0 = unlimited)
    #[arg(long = "dial.max-connections", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,
}

impl Default for DialArgs {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_DIAL_ATTEMPTS,
            timeout_secs: DEFAULT_DIAL_TIMEOUT_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl DialArgs {
    /// Validate argument values.
    pub fn validate(&self) -> Result<(), String> {
        if self.attempts == 0 {
            return Err("dial.attempts must be at least 1".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("dial.timeout must be at least 1 second".to_string());
        }
        Ok(())
    }
}

impl DialConfig for DialArgs {
    fn dial_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn max_connections(&self) -> Option<usize> {
        (self.max_connections > 0).then_some(self.max_connections)
    }
}
