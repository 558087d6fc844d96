//! Dialer metrics.

use metrics::{Counter, Gauge};

/// Dialer metrics
#[derive(Clone, Debug)]
pub(crate) struct DialMetrics {
    /// Dial rounds started by this node
    dials_total: Counter,
    /// Dial rounds that returned an error
    dial_failures_total: Counter,
    /// Rounds spent waiting on another caller's dial
    dial_waits_total: Counter,
    /// Currently tracked connections
    connections: Gauge,
}

impl Default for DialMetrics {
    fn default() -> Self {
        Self {
            dials_total: metrics::counter!("dialer.dials_total"),
            dial_failures_total: metrics::counter!("dialer.dial_failures_total"),
            dial_waits_total: metrics::counter!("dialer.dial_waits_total"),
            connections: metrics::gauge!("dialer.connections"),
        }
    }
}

impl DialMetrics {
    pub(crate) fn inc_dials(&self) {
        self.dials_total.increment(1);
    }

    pub(crate) fn inc_failures(&self) {
        self.dial_failures_total.increment(1);
    }

    pub(crate) fn inc_waits(&self) {
        self.dial_waits_total.increment(1);
    }

    pub(crate) fn set_connections(&self, count: usize) {
        self.connections.set(count as f64);
    }
}
