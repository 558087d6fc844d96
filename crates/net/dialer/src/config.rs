//! Dial configuration.

use std::time::Duration;

/// Default number of dial rounds per [`Swarm::dial`](crate::Swarm::dial) call.
pub const DEFAULT_DIAL_ATTEMPTS: u32 = 3;

/// Default per-attempt dial budget in seconds.
pub const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 10;

/// Default connection table limit. Zero means unlimited.
pub const DEFAULT_MAX_CONNECTIONS: usize = 0;

/// Configuration consumed by the [`Swarm`](crate::Swarm).
#[auto_impl::auto_impl(&, Arc)]
pub trait DialConfig: Send + Sync {
    /// Number of dial rounds before giving up. Always at least one.
    fn dial_attempts(&self) -> u32;

    /// Time budget for a single dial round.
    fn dial_timeout(&self) -> Duration;

    /// Maximum number of tracked connections, `None` for unlimited.
    fn max_connections(&self) -> Option<usize>;
}

/// Built-in defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDialConfig;

impl DialConfig for DefaultDialConfig {
    fn dial_attempts(&self) -> u32 {
        DEFAULT_DIAL_ATTEMPTS
    }

    fn dial_timeout(&self) -> Duration {
        Duration::from_secs(DEFAULT_DIAL_TIMEOUT_SECS)
    }

    fn max_connections(&self) -> Option<usize> {
        None
    }
}
