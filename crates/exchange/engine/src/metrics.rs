//! Exchange metrics.

use metrics::Counter;

/// Exchange metrics
#[derive(Clone, Debug)]
pub(crate) struct ExchangeMetrics {
    /// Wants registered
    wants_total: Counter,
    /// Blocks that fulfilled a want
    blocks_received_total: Counter,
    /// Blocks received after their want was already finished
    duplicate_blocks_total: Counter,
    /// Blocks sent to partners
    blocks_sent_total: Counter,
    /// Inbound messages rejected as malformed
    malformed_messages_total: Counter,
    /// Sends withheld by a partner's strategy
    strategy_refusals_total: Counter,
}

impl Default for ExchangeMetrics {
    fn default() -> Self {
        Self {
            wants_total: metrics::counter!("exchange.wants_total"),
            blocks_received_total: metrics::counter!("exchange.blocks_received_total"),
            duplicate_blocks_total: metrics::counter!("exchange.duplicate_blocks_total"),
            blocks_sent_total: metrics::counter!("exchange.blocks_sent_total"),
            malformed_messages_total: metrics::counter!("exchange.malformed_messages_total"),
            strategy_refusals_total: metrics::counter!("exchange.strategy_refusals_total"),
        }
    }
}

impl ExchangeMetrics {
    pub(crate) fn inc_wants(&self) {
        self.wants_total.increment(1);
    }

    pub(crate) fn inc_blocks_received(&self) {
        self.blocks_received_total.increment(1);
    }

    pub(crate) fn inc_duplicates(&self) {
        self.duplicate_blocks_total.increment(1);
    }

    pub(crate) fn inc_blocks_sent(&self) {
        self.blocks_sent_total.increment(1);
    }

    pub(crate) fn inc_malformed(&self) {
        self.malformed_messages_total.increment(1);
    }

    pub(crate) fn inc_refusals(&self) {
        self.strategy_refusals_total.increment(1);
    }
}
