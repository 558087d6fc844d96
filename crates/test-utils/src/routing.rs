use std::collections::{HashMap, HashSet};

use cairn_exchange_api::Routing;
use cairn_primitives::{BlockKey, PeerId};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::{Mutex, RwLock};

/// Provider records held in memory.
#[derive(Debug, Default)]
pub struct MockRouting {
    providers: RwLock<HashMap<BlockKey, Vec<PeerId>>>,
    stalled: RwLock<HashSet<BlockKey>>,
    queries: Mutex<Vec<(BlockKey, usize)>>,
}

impl MockRouting {
    /// No providers for anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `peer` as a provider of `key`.
    pub fn add_provider(&self, key: BlockKey, peer: PeerId) {
        self.providers.write().entry(key).or_default().push(peer);
    }

    /// After yielding the known providers of `key`, keep the stream pending
    /// instead of ending it.
    pub fn stall(&self, key: BlockKey) {
        self.stalled.write().insert(key);
    }

    /// Every `(key, limit)` lookup made so far.
    pub fn queries(&self) -> Vec<(BlockKey, usize)> {
        self.queries.lock().clone()
    }
}

impl Routing for MockRouting {
    fn find_providers(&self, key: &BlockKey, limit: usize) -> BoxStream<'static, PeerId> {
        self.queries.lock().push((key.clone(), limit));

        let found: Vec<_> = self
            .providers
            .read()
            .get(key)
            .map(|p| p.iter().take(limit).copied().collect())
            .unwrap_or_default();

        if self.stalled.read().contains(key) {
            stream::iter(found).chain(stream::pending()).boxed()
        } else {
            stream::iter(found).boxed()
        }
    }
}
