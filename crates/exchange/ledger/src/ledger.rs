//! Per-partner exchange ledger.

use core::fmt;
use std::sync::Arc;

use cairn_primitives::{BlockKey, PeerId};
use hashlink::LinkedHashSet;
use web_time::Instant;

use crate::Strategy;

/// Default bound on a partner's want-list.
pub const DEFAULT_MAX_WANTS: usize = 1024;

/// Byte accounting between us and one partner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebtRatio {
    /// Bytes we sent to the partner.
    pub bytes_sent: u64,
    /// Bytes we received from the partner.
    pub bytes_recv: u64,
}

impl DebtRatio {
    /// How far the partner is in our debt: `sent / (recv + 1)`.
    ///
    /// For reporting only; the `+ 1` keeps a partner we never received from
    /// finite. [`DebtRatioStrategy`](crate::DebtRatioStrategy) gates on the
    /// exact ratio.
    pub fn value(&self) -> f64 {
        self.bytes_sent as f64 / (self.bytes_recv as f64 + 1.0)
    }
}

/// Exchange history and want-list for one partner.
pub struct Ledger {
    partner: PeerId,
    accounting: DebtRatio,
    first_exchange: Option<Instant>,
    last_exchange: Option<Instant>,
    exchange_count: u64,
    want_list: LinkedHashSet<BlockKey>,
    max_wants: usize,
    strategy: Arc<dyn Strategy>,
}

impl Ledger {
    /// Empty ledger for `partner`.
    pub fn new(partner: PeerId, strategy: Arc<dyn Strategy>, max_wants: usize) -> Self {
        Self {
            partner,
            accounting: DebtRatio::default(),
            first_exchange: None,
            last_exchange: None,
            exchange_count: 0,
            want_list: LinkedHashSet::new(),
            max_wants: max_wants.max(1),
            strategy,
        }
    }

    /// The partner this ledger tracks.
    pub fn partner(&self) -> PeerId {
        self.partner
    }

    /// Byte accounting.
    pub fn accounting(&self) -> DebtRatio {
        self.accounting
    }

    /// Total bytes sent to the partner.
    pub fn bytes_sent(&self) -> u64 {
        self.accounting.bytes_sent
    }

    /// Total bytes received from the partner.
    pub fn bytes_recv(&self) -> u64 {
        self.accounting.bytes_recv
    }

    /// See [`DebtRatio::value`].
    pub fn debt_ratio(&self) -> f64 {
        self.accounting.value()
    }

    /// Number of send and receive records.
    pub fn exchange_count(&self) -> u64 {
        self.exchange_count
    }

    /// When the first exchange was recorded.
    pub fn first_exchange(&self) -> Option<Instant> {
        self.first_exchange
    }

    /// When the latest exchange was recorded.
    pub fn last_exchange(&self) -> Option<Instant> {
        self.last_exchange
    }

    /// Record `n` bytes sent to the partner.
    pub fn sent_bytes(&mut self, n: u64) {
        self.accounting.bytes_sent = self.accounting.bytes_sent.saturating_add(n);
        self.record_exchange();
    }

    /// Record `n` bytes received from the partner.
    pub fn received_bytes(&mut self, n: u64) {
        self.accounting.bytes_recv = self.accounting.bytes_recv.saturating_add(n);
        self.record_exchange();
    }

    fn record_exchange(&mut self) {
        let now = Instant::now();
        self.first_exchange.get_or_insert(now);
        self.last_exchange = Some(now);
        self.exchange_count += 1;
    }

    /// Add `key` to the partner's want-list. Returns `false` if it was
    /// already there.
    ///
    /// A full list drops its oldest entry to make room.
    pub fn wants(&mut self, key: BlockKey) -> bool {
        if self.want_list.contains(&key) {
            return false;
        }
        while self.want_list.len() >= self.max_wants {
            self.want_list.pop_front();
        }
        self.want_list.insert(key)
    }

    /// Remove `key` from the want-list. Returns whether it was present.
    pub fn cancel_want(&mut self, key: &BlockKey) -> bool {
        self.want_list.remove(key)
    }

    /// Whether the partner wants `key`.
    pub fn want_list_contains(&self, key: &BlockKey) -> bool {
        self.want_list.contains(key)
    }

    /// The partner's want-list, oldest first.
    pub fn want_list(&self) -> impl Iterator<Item = &BlockKey> {
        self.want_list.iter()
    }

    /// Number of keys the partner wants.
    pub fn want_count(&self) -> usize {
        self.want_list.len()
    }

    /// Ask the strategy whether to send to this partner.
    pub fn should_send(&self) -> bool {
        self.strategy.should_send(self)
    }

    /// Replace the strategy.
    pub fn set_strategy(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategy = strategy;
    }

    /// Name of the active strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Copy of the ledger's state.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            partner: self.partner,
            accounting: self.accounting,
            debt_ratio: self.debt_ratio(),
            exchange_count: self.exchange_count,
            first_exchange: self.first_exchange,
            last_exchange: self.last_exchange,
            wants: self.want_list.len(),
            strategy: self.strategy.name(),
        }
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("partner", &self.partner)
            .field("accounting", &self.accounting)
            .field("exchange_count", &self.exchange_count)
            .field("wants", &self.want_list.len())
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

/// Point-in-time view of a [`Ledger`].
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    /// Partner peer.
    pub partner: PeerId,
    /// Byte accounting.
    pub accounting: DebtRatio,
    /// Debt ratio at snapshot time.
    pub debt_ratio: f64,
    /// Number of exchanges recorded.
    pub exchange_count: u64,
    /// First exchange.
    pub first_exchange: Option<Instant>,
    /// Latest exchange.
    pub last_exchange: Option<Instant>,
    /// Want-list size.
    pub wants: usize,
    /// Strategy name.
    pub strategy: &'static str,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cairn_primitives::BlockKey;
    use cairn_test_utils::peer_id;
    use proptest::prelude::*;

    use super::{DebtRatio, Ledger};
    use crate::AlwaysSend;

    fn ledger(max_wants: usize) -> Ledger {
        Ledger::new(peer_id(1), Arc::new(AlwaysSend), max_wants)
    }

    fn key(n: u32) -> BlockKey {
        BlockKey::new(format!("key-{n}"))
    }

    #[test]
    fn test_fresh_ledger() {
        let ledger = ledger(8);
        assert_eq!(ledger.accounting(), DebtRatio::default());
        assert_eq!(ledger.debt_ratio(), 0.0);
        assert_eq!(ledger.exchange_count(), 0);
        assert!(ledger.first_exchange().is_none());
        assert!(ledger.last_exchange().is_none());
    }

    #[test]
    fn test_exchange_timestamps() {
        let mut ledger = ledger(8);
        ledger.sent_bytes(10);
        let first = ledger.first_exchange().unwrap();
        ledger.received_bytes(0);
        ledger.received_bytes(20);

        assert_eq!(ledger.first_exchange(), Some(first));
        assert!(ledger.last_exchange().unwrap() >= first);
        assert_eq!(ledger.exchange_count(), 3);
        assert_eq!(ledger.bytes_sent(), 10);
        assert_eq!(ledger.bytes_recv(), 20);
    }

    #[test]
    fn test_wants_idempotent() {
        let mut ledger = ledger(8);
        assert!(ledger.wants(key(1)));
        assert!(!ledger.wants(key(1)));
        assert_eq!(ledger.want_count(), 1);
        assert!(ledger.want_list_contains(&key(1)));

        assert!(ledger.cancel_want(&key(1)));
        assert!(!ledger.cancel_want(&key(1)));
        assert!(!ledger.want_list_contains(&key(1)));
    }

    #[test]
    fn test_want_list_evicts_oldest() {
        let mut ledger = ledger(3);
        for n in 0..5 {
            ledger.wants(key(n));
        }

        assert_eq!(ledger.want_count(), 3);
        assert!(!ledger.want_list_contains(&key(0)));
        assert!(!ledger.want_list_contains(&key(1)));
        assert_eq!(
            ledger.want_list().cloned().collect::<Vec<_>>(),
            vec![key(2), key(3), key(4)]
        );
    }

    #[test]
    fn test_snapshot() {
        let mut ledger = ledger(8);
        ledger.sent_bytes(300);
        ledger.received_bytes(99);
        ledger.wants(key(7));

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.partner, peer_id(1));
        assert_eq!(snapshot.debt_ratio, 3.0);
        assert_eq!(snapshot.exchange_count, 2);
        assert_eq!(snapshot.wants, 1);
        assert_eq!(snapshot.strategy, "always");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Sent(u32),
        Received(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u32>().prop_map(Op::Sent),
            any::<u32>().prop_map(Op::Received),
        ]
    }

    proptest! {
        #[test]
        fn proptest_counters_are_monotonic_sums(ops in proptest::collection::vec(op(), 0..64)) {
            let mut ledger = ledger(8);
            let (mut sent, mut recv) = (0u64, 0u64);

            for op in &ops {
                let before = ledger.accounting();
                match *op {
                    Op::Sent(n) => {
                        ledger.sent_bytes(n.into());
                        sent += u64::from(n);
                    }
                    Op::Received(n) => {
                        ledger.received_bytes(n.into());
                        recv += u64::from(n);
                    }
                }
                let after = ledger.accounting();
                prop_assert!(after.bytes_sent >= before.bytes_sent);
                prop_assert!(after.bytes_recv >= before.bytes_recv);
            }

            prop_assert_eq!(ledger.bytes_sent(), sent);
            prop_assert_eq!(ledger.bytes_recv(), recv);
            prop_assert_eq!(ledger.exchange_count(), ops.len() as u64);
        }
    }
}
