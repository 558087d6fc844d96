//! Send strategies.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Ledger;

/// Default debt ratio above which [`DebtRatioStrategy`] stops sending.
pub const DEFAULT_DEBT_RATIO: f64 = 5.0;

/// Decides whether to send data to a partner.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait Strategy: Send + Sync {
    /// Whether to send to the partner described by `ledger`.
    fn should_send(&self, ledger: &Ledger) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Always sends.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSend;

impl Strategy for AlwaysSend {
    fn should_send(&self, _ledger: &Ledger) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "always"
    }
}

/// Tit-for-tat: stop sending once `bytes_sent / bytes_recv` exceeds a
/// threshold.
///
/// The comparison is done as `sent > threshold * recv`, so a partner we never
/// received from is refused as soon as we sent it anything, and a fresh
/// ledger is served.
#[derive(Debug, Clone, Copy)]
pub struct DebtRatioStrategy {
    threshold: f64,
}

impl DebtRatioStrategy {
    /// Refuse partners whose debt ratio is above `threshold`.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for DebtRatioStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_DEBT_RATIO)
    }
}

impl Strategy for DebtRatioStrategy {
    fn should_send(&self, ledger: &Ledger) -> bool {
        let accounting = ledger.accounting();
        accounting.bytes_sent as f64 <= self.threshold * accounting.bytes_recv as f64
    }

    fn name(&self) -> &'static str {
        "debt-ratio"
    }
}

/// Strategy from a closure.
///
/// ```ignore
/// let trusted = peer_id;
/// let strategy = FnStrategy::new(move |l: &Ledger| l.partner() == trusted);
/// ```
pub struct FnStrategy<F>(F);

impl<F> FnStrategy<F>
where
    F: Fn(&Ledger) -> bool + Send + Sync,
{
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Strategy for FnStrategy<F>
where
    F: Fn(&Ledger) -> bool + Send + Sync,
{
    fn should_send(&self, ledger: &Ledger) -> bool {
        (self.0)(ledger)
    }
}

/// Built-in strategy selection for configuration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    clap::ValueEnum,
    strum::Display,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StrategyKind {
    /// Serve every partner.
    #[default]
    Always,
    /// Serve partners whose debt ratio stays under the threshold.
    DebtRatio,
}

impl StrategyKind {
    /// Build the strategy. `threshold` only applies to [`StrategyKind::DebtRatio`].
    pub fn build(self, threshold: f64) -> Arc<dyn Strategy> {
        match self {
            Self::Always => Arc::new(AlwaysSend),
            Self::DebtRatio => Arc::new(DebtRatioStrategy::new(threshold)),
        }
    }
}
