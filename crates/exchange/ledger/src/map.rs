//! Ledgers keyed by partner.

use std::collections::HashMap;
use std::sync::Arc;

use cairn_primitives::{BlockKey, PeerId};

use crate::{Ledger, LedgerSnapshot, Strategy};

/// Every partner's ledger.
///
/// Ledgers are created on first use with the default strategy, unless a
/// per-partner override was registered with [`set_strategy`](Self::set_strategy).
pub struct LedgerMap {
    ledgers: HashMap<PeerId, Ledger>,
    overrides: HashMap<PeerId, Arc<dyn Strategy>>,
    default_strategy: Arc<dyn Strategy>,
    max_wants: usize,
}

impl LedgerMap {
    /// Empty map creating ledgers with `default_strategy` and a want-list
    /// bound of `max_wants`.
    pub fn new(default_strategy: Arc<dyn Strategy>, max_wants: usize) -> Self {
        Self {
            ledgers: HashMap::new(),
            overrides: HashMap::new(),
            default_strategy,
            max_wants,
        }
    }

    /// The ledger for `peer`, created if missing.
    pub fn get_or_create(&mut self, peer: PeerId) -> &mut Ledger {
        let Self {
            ledgers,
            overrides,
            default_strategy,
            max_wants,
        } = self;

        ledgers.entry(peer).or_insert_with(|| {
            let strategy = overrides.get(&peer).unwrap_or(&*default_strategy);
            Ledger::new(peer, Arc::clone(strategy), *max_wants)
        })
    }

    /// The ledger for `peer`, if one exists.
    pub fn get(&self, peer: &PeerId) -> Option<&Ledger> {
        self.ledgers.get(peer)
    }

    /// Use `strategy` for `peer` from now on, including its existing ledger.
    pub fn set_strategy(&mut self, peer: PeerId, strategy: Arc<dyn Strategy>) {
        if let Some(ledger) = self.ledgers.get_mut(&peer) {
            ledger.set_strategy(Arc::clone(&strategy));
        }
        self.overrides.insert(peer, strategy);
    }

    /// Revert `peer` to the default strategy.
    pub fn clear_strategy(&mut self, peer: &PeerId) {
        if self.overrides.remove(peer).is_some() {
            if let Some(ledger) = self.ledgers.get_mut(peer) {
                ledger.set_strategy(Arc::clone(&self.default_strategy));
            }
        }
    }

    /// Evict the ledger for `peer`. Strategy overrides are kept.
    pub fn remove(&mut self, peer: &PeerId) -> Option<Ledger> {
        self.ledgers.remove(peer)
    }

    /// Partners whose want-list contains `key`.
    pub fn peers_wanting(&self, key: &BlockKey) -> Vec<PeerId> {
        self.ledgers
            .values()
            .filter(|l| l.want_list_contains(key))
            .map(Ledger::partner)
            .collect()
    }

    /// Partners with a ledger.
    pub fn peers(&self) -> Vec<PeerId> {
        self.ledgers.keys().copied().collect()
    }

    /// Snapshots of every ledger.
    pub fn snapshots(&self) -> Vec<LedgerSnapshot> {
        self.ledgers.values().map(Ledger::snapshot).collect()
    }

    /// Number of ledgers.
    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    /// Whether there are no ledgers.
    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}
