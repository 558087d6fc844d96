//! The exchange engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use cairn_exchange_api::{BlockStore, Network, NetworkError, Routing};
use cairn_exchange_ledger::{Ledger, LedgerMap, LedgerSnapshot, Strategy};
use cairn_exchange_message::{Message, MessageType, proto};
use cairn_exchange_tracker::{
    DynamicAdjuster, FanoutAdjuster, Observation, ResolveTracker, Tracker,
};
use cairn_primitives::{Block, BlockKey, PeerId};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use hashlink::LruCache;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use web_time::Instant;

use crate::ExchangeArgs;
use crate::ExchangeError;
use crate::metrics::ExchangeMetrics;
use crate::want::{Release, WantEntry, WantHandle, WantState};

/// Request id used for blocks pushed without a matching request.
const UNSOLICITED_ID: u64 = 0;

/// Block exchange engine.
///
/// Cheap to clone; clones share the same state. Must be used from within a
/// Tokio runtime, since every want runs as its own task.
pub struct Exchange<N, R, S> {
    inner: Arc<Inner<N, R, S>>,
}

impl<N, R, S> Clone for Exchange<N, R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Shared engine state.
///
/// # Locking
///
/// - `ledgers`, `wants`, `finished` and `fanout` are plain mutexes, never
///   held across an await
/// - when both are needed, `wants` is taken before `finished`; no other lock
///   is ever nested
struct Inner<N, R, S> {
    local: PeerId,
    network: N,
    routing: R,
    store: S,
    args: ExchangeArgs,
    ledgers: Mutex<LedgerMap>,
    wants: Mutex<HashMap<BlockKey, WantEntry>>,
    finished: Mutex<LruCache<BlockKey, WantState>>,
    next_id: AtomicU64,
    tracker: Tracker,
    fanout: Mutex<FanoutControl>,
    metrics: ExchangeMetrics,
    closed: AtomicBool,
}

/// Fan-out adjuster plus the batch of completed wants not yet observed.
struct FanoutControl {
    adjuster: DynamicAdjuster,
    hits: usize,
    latencies: Vec<f64>,
}

impl FanoutControl {
    /// Record one completed want. Once `batch` wants have accumulated they
    /// are fed to the adjuster as one observation and the batch latency
    /// variance is returned.
    fn record(&mut self, hit: bool, elapsed: Duration, batch: usize) -> Option<f64> {
        self.hits += usize::from(hit);
        self.latencies.push(elapsed.as_secs_f64());
        if self.latencies.len() < batch {
            return None;
        }

        let n = self.latencies.len() as f64;
        let total: f64 = self.latencies.iter().sum();
        let mean = total / n;
        let variance = self
            .latencies
            .iter()
            .map(|l| (l - mean).powi(2))
            .sum::<f64>()
            / n;

        self.adjuster.observe(Observation {
            hit_ratio: self.hits as f64 / n,
            elapsed: Duration::from_secs_f64(total),
            requests: self.latencies.len(),
        });
        self.hits = 0;
        self.latencies.clear();
        Some(variance)
    }
}

impl<N, R, S> Exchange<N, R, S>
where
    N: Network,
    R: Routing + 'static,
    S: BlockStore + 'static,
{
    /// Engine for the local peer of `network`.
    pub fn new(network: N, routing: R, store: S, args: ExchangeArgs) -> Self {
        let strategy = args.strategy.build(args.debt_ratio);
        let inner = Inner {
            local: network.local_peer(),
            ledgers: Mutex::new(LedgerMap::new(strategy, args.max_wants_per_peer)),
            wants: Mutex::new(HashMap::new()),
            finished: Mutex::new(LruCache::new(args.finished_cache.max(1))),
            next_id: AtomicU64::new(UNSOLICITED_ID + 1),
            tracker: Tracker::new(),
            fanout: Mutex::new(FanoutControl {
                adjuster: DynamicAdjuster::new(args.fanout.clone()),
                hits: 0,
                latencies: Vec::new(),
            }),
            metrics: ExchangeMetrics::default(),
            closed: AtomicBool::new(false),
            network,
            routing,
            store,
            args,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The local peer.
    pub fn local_peer(&self) -> PeerId {
        self.inner.local
    }

    /// Register interest in `key`.
    ///
    /// Returns without waiting on the network. A block already in the store
    /// resolves the handle immediately; otherwise the fetch runs in the
    /// background and callers wanting the same key share it.
    pub fn want_block(&self, key: BlockKey) -> Result<WantHandle, ExchangeError> {
        if self.inner.is_closed() {
            return Err(ExchangeError::Shutdown);
        }
        if let Some(block) = self.inner.store.get(&key)? {
            trace!(%key, "want served from store");
            return Ok(WantHandle::ready(block));
        }

        let (tx, rx) = oneshot::channel();
        let id = {
            let mut wants = self.inner.wants.lock();
            if self.inner.is_closed() {
                return Err(ExchangeError::Shutdown);
            }
            match wants.get_mut(&key) {
                Some(entry) => {
                    entry.waiters.push(tx);
                    None
                }
                None => {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    wants.insert(key.clone(), WantEntry::new(id, tx));
                    Some(id)
                }
            }
        };

        if let Some(id) = id {
            self.inner.tracker.want_blocks(&key, Instant::now());
            self.inner.metrics.inc_wants();
            debug!(%key, id, "want registered");

            let inner = Arc::clone(&self.inner);
            let task = tokio::spawn(inner.run_want(key.clone(), id));
            match self.inner.wants.lock().get_mut(&key) {
                Some(entry) if entry.id == id => entry.task = Some(task.abort_handle()),
                // Finished before the handle could be stored.
                _ => task.abort(),
            }
        }

        let release: Weak<dyn Release> = Arc::downgrade(&self.inner) as Weak<dyn Release>;
        Ok(WantHandle::new(key, rx, release))
    }

    /// Cancel the want for `key`, failing its waiters with
    /// [`ExchangeError::Cancelled`]. Returns whether a want was pending.
    pub fn cancel_want(&self, key: &BlockKey) -> bool {
        self.inner.cancel(key, |_| true)
    }

    /// Store a block that became available and offer it to interested
    /// partners.
    ///
    /// A pending local want for the block is fulfilled. Returns the number of
    /// partners the block was sent to.
    pub async fn has_block(&self, block: Block) -> Result<usize, ExchangeError> {
        if !block.is_valid() {
            return Err(ExchangeError::InvalidBlock {
                key: block.key().clone(),
                peer: self.inner.local,
            });
        }
        self.inner.store.put(block.clone())?;

        if let Some(entry) = self.inner.take_if(block.key(), WantState::Fulfilled, |_| true) {
            entry.abort();
            self.inner.tracker.finish(block.key(), Instant::now());
            entry.resolve(Ok(block.clone()));
        }

        Ok(self.inner.provide(&block, None).await)
    }

    /// Handle an inbound message from `peer`.
    ///
    /// Requests are recorded in the sender's ledger and served if the block
    /// is held and the partner's strategy allows it. Deliveries are verified
    /// and hand the block to local waiters; duplicates are dropped.
    pub async fn receive_message(&self, peer: PeerId, message: Message) -> Result<(), ExchangeError> {
        if self.inner.is_closed() {
            return Err(ExchangeError::Shutdown);
        }

        if let Some(block) = message.delivered_block() {
            return self.inner.receive_block(peer, message.id(), block).await;
        }
        if message.is_request() {
            return self.inner.serve(peer, message).await;
        }
        debug!(%peer, key = %message.key(), id = message.id(), "peer does not have block");
        Ok(())
    }

    /// Validate a decoded frame from `peer` and handle it.
    ///
    /// Malformed frames are logged and rejected; the caller keeps the
    /// connection open.
    pub async fn receive_proto(
        &self,
        peer: PeerId,
        message: proto::Message,
    ) -> Result<(), ExchangeError> {
        match Message::try_from(message) {
            Ok(message) => self.receive_message(peer, message).await,
            Err(error) => {
                warn!(%peer, %error, "dropping malformed message");
                self.inner.metrics.inc_malformed();
                Err(error.into())
            }
        }
    }

    /// Cancel every want with [`ExchangeError::Shutdown`] and refuse new work.
    pub fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut wants = self.inner.wants.lock();
            self.inner.closed.store(true, Ordering::Release);
            let drained: Vec<_> = wants.drain().collect();
            let mut finished = self.inner.finished.lock();
            for (key, _) in &drained {
                finished.insert(key.clone(), WantState::Cancelled);
            }
            drained
        };

        debug!(cancelled = drained.len(), "exchange shut down");
        for (_, entry) in drained {
            entry.abort();
            entry.resolve(Err(ExchangeError::Shutdown));
        }
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.is_closed()
    }

    /// State of the want for `key`: live, or recently finished.
    pub fn want_state(&self, key: &BlockKey) -> Option<WantState> {
        self.inner.want_state(key)
    }

    /// Keys currently wanted.
    pub fn wantlist(&self) -> Vec<BlockKey> {
        self.inner.wantlist()
    }

    /// Snapshot of the ledger for `peer`.
    pub fn ledger_snapshot(&self, peer: &PeerId) -> Option<LedgerSnapshot> {
        self.inner.ledgers.lock().get(peer).map(Ledger::snapshot)
    }

    /// Snapshots of every partner ledger.
    pub fn ledger_snapshots(&self) -> Vec<LedgerSnapshot> {
        self.inner.ledgers.lock().snapshots()
    }

    /// Use `strategy` when deciding whether to send to `peer`.
    pub fn set_peer_strategy(&self, peer: PeerId, strategy: Arc<dyn Strategy>) {
        self.inner.ledgers.lock().set_strategy(peer, strategy);
    }

    /// Revert `peer` to the configured default strategy.
    pub fn clear_peer_strategy(&self, peer: &PeerId) {
        self.inner.ledgers.lock().clear_strategy(peer);
    }

    /// Drop the ledger for `peer`. Returns whether one existed.
    pub fn evict_peer(&self, peer: &PeerId) -> bool {
        self.inner.ledgers.lock().remove(peer).is_some()
    }

    /// Current fan-out width.
    pub fn fanout(&self) -> usize {
        self.inner.fanout.lock().adjuster.fanout()
    }

    /// Pipeline latency instrumentation.
    pub fn tracker(&self) -> &Tracker {
        &self.inner.tracker
    }

    /// Engine configuration.
    pub fn args(&self) -> &ExchangeArgs {
        &self.inner.args
    }
}

impl<N, R, S> Inner<N, R, S>
where
    N: Network,
    R: Routing + 'static,
    S: BlockStore + 'static,
{
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn want_state(&self, key: &BlockKey) -> Option<WantState> {
        let live = self.wants.lock().get(key).map(|e| e.state);
        live.or_else(|| self.finished.lock().peek(key).copied())
    }

    /// Whether want `id` for `key` is still pending.
    fn is_live(&self, key: &BlockKey, id: u64) -> bool {
        self.wants
            .lock()
            .get(key)
            .is_some_and(|e| e.id == id && e.state.is_pending())
    }

    fn wantlist(&self) -> Vec<BlockKey> {
        self.wants.lock().keys().cloned().collect()
    }

    /// Remove the pending want for `key` if `pred` accepts it, recording
    /// `state` as its outcome. This is the only way a want leaves the table,
    /// so exactly one caller wins each want.
    fn take_if(
        &self,
        key: &BlockKey,
        state: WantState,
        pred: impl FnOnce(&mut WantEntry) -> bool,
    ) -> Option<WantEntry> {
        let mut wants = self.wants.lock();
        let entry = wants.get_mut(key)?;
        if !entry.state.is_pending() || !pred(entry) {
            return None;
        }
        let mut entry = wants.remove(key)?;
        entry.state = state;
        self.finished.lock().insert(key.clone(), state);
        Some(entry)
    }

    fn cancel(&self, key: &BlockKey, pred: impl FnOnce(&mut WantEntry) -> bool) -> bool {
        let Some(entry) = self.take_if(key, WantState::Cancelled, pred) else {
            return false;
        };
        debug!(%key, "want cancelled");
        entry.abort();
        entry.resolve(Err(ExchangeError::Cancelled { key: key.clone() }));
        true
    }

    /// Pipeline for one want: find providers, send them the want, then wait
    /// out the want timeout. Aborted as soon as the want leaves the table.
    async fn run_want(self: Arc<Self>, key: BlockKey, id: u64) {
        if !self.is_live(&key, id) {
            return;
        }
        let failure = match self.fetch(&key, id).await {
            Ok(()) => {
                if !self.is_live(&key, id) {
                    trace!(%key, id, "want finished during dispatch");
                    return;
                }
                tokio::time::sleep(self.args.want_timeout()).await;
                None
            }
            Err(error) => Some(error),
        };
        let state = match failure {
            None => WantState::TimedOut,
            Some(_) => WantState::Unresolvable,
        };

        let Some(entry) = self.take_if(&key, state, |e| e.id == id) else {
            return;
        };
        let error = failure.unwrap_or_else(|| ExchangeError::TimedOut {
            key: key.clone(),
            providers: entry.providers.len(),
        });
        debug!(%key, %state, %error, "want failed");
        if state == WantState::TimedOut {
            self.observe(false, entry.started.elapsed());
        }
        entry.resolve(Err(error));
    }

    async fn fetch(&self, key: &BlockKey, id: u64) -> Result<(), ExchangeError> {
        self.tracker.find_provider(key, Instant::now());
        let resolver = self.tracker.resolver(key);
        let providers = self.find_providers(key, resolver.as_deref()).await;
        if providers.is_empty() {
            return Err(ExchangeError::NotFound { key: key.clone() });
        }
        self.tracker.found_provider(key, Instant::now());

        let fanout = self.fanout.lock().adjuster.fanout();
        debug!(%key, providers = providers.len(), fanout, "providers found");
        self.send_wants(key, id, providers, fanout).await
    }

    /// Collect up to `provider_limit` distinct providers other than the
    /// local peer, giving up on the stream at the search deadline.
    async fn find_providers(
        &self,
        key: &BlockKey,
        resolver: Option<&ResolveTracker>,
    ) -> Vec<PeerId> {
        let limit = self.args.provider_limit;
        let deadline = tokio::time::Instant::now() + self.args.search_timeout();
        let started = Instant::now();
        let mut waited = Duration::ZERO;
        let mut stream = self.routing.find_providers(key, limit);
        let mut found = Vec::new();

        while found.len() < limit {
            let polled = Instant::now();
            let next = tokio::time::timeout_at(deadline, stream.next()).await;
            waited += polled.elapsed();
            match next {
                Ok(Some(peer)) if peer != self.local && !found.contains(&peer) => found.push(peer),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    debug!(%key, found = found.len(), "provider search timed out");
                    break;
                }
            }
        }

        if let Some(resolver) = resolver {
            resolver.add_communication(waited);
            resolver.add_scheduling(started.elapsed().saturating_sub(waited));
        }
        found
    }

    /// Send the want to `fanout` providers at once. Each provider that
    /// cannot be reached is replaced by the next candidate.
    async fn send_wants(
        &self,
        key: &BlockKey,
        id: u64,
        candidates: Vec<PeerId>,
        fanout: usize,
    ) -> Result<(), ExchangeError> {
        let mut candidates = candidates.into_iter();
        let mut pending: FuturesUnordered<_> = candidates
            .by_ref()
            .take(fanout.max(1))
            .map(|peer| self.dispatch(key, id, peer))
            .collect();

        let mut tried = 0;
        let mut sent = 0;
        let mut last = None;
        while let Some((peer, result)) = pending.next().await {
            tried += 1;
            match result {
                Ok(()) => sent += 1,
                Err(error) => {
                    debug!(%key, %peer, %error, "want not delivered");
                    last = Some(error);
                    if let Some(next) = candidates.next() {
                        pending.push(self.dispatch(key, id, next));
                    }
                }
            }
        }

        if sent == 0 {
            return Err(ExchangeError::Unresolvable {
                key: key.clone(),
                providers: tried,
                last,
            });
        }
        trace!(%key, sent, tried, "want sent");
        Ok(())
    }

    /// Record `peer` as asked, then send it the want. Recording happens
    /// before the future is polled so `providers` keeps dispatch order.
    fn dispatch<'a>(
        &'a self,
        key: &'a BlockKey,
        id: u64,
        peer: PeerId,
    ) -> impl Future<Output = (PeerId, Result<(), NetworkError>)> + 'a {
        if let Some(entry) = self.wants.lock().get_mut(key).filter(|e| e.id == id) {
            entry.providers.push(peer);
        }
        self.send_want(key, id, peer)
    }

    async fn send_want(
        &self,
        key: &BlockKey,
        id: u64,
        peer: PeerId,
    ) -> (PeerId, Result<(), NetworkError>) {
        let result = async {
            self.network.connect(peer).await?;
            self.tracker.connected(key, Instant::now());

            let message = Message::want_block(id, key.clone(), self.wantlist());
            self.network.send_message(peer, message).await
        }
        .await;

        let mut wants = self.wants.lock();
        if let Some(entry) = wants.get_mut(key).filter(|e| e.id == id) {
            match &result {
                Ok(()) => entry.state = WantState::Sent,
                Err(_) => entry.providers.retain(|p| *p != peer),
            }
        }
        drop(wants);
        (peer, result)
    }

    async fn serve(&self, peer: PeerId, message: Message) -> Result<(), ExchangeError> {
        let key = message.key().clone();
        let should_send = {
            let mut ledgers = self.ledgers.lock();
            let ledger = ledgers.get_or_create(peer);
            for wanted in message.wantlist() {
                ledger.wants(wanted.clone());
            }
            ledger.wants(key.clone());
            ledger.should_send()
        };

        let Some(block) = self.store.get(&key)? else {
            trace!(%peer, %key, kind = %message.kind(), "requested block not held");
            if message.kind() == MessageType::GetBlock {
                self.network
                    .send_message(peer, Message::not_found(message.id(), key))
                    .await?;
            }
            return Ok(());
        };

        if !should_send {
            debug!(%peer, %key, "strategy declined to send");
            self.metrics.inc_refusals();
            return Ok(());
        }
        self.send_block(peer, message.id(), block).await
    }

    async fn send_block(&self, peer: PeerId, id: u64, block: Block) -> Result<(), ExchangeError> {
        let key = block.key().clone();
        let len = block.len() as u64;
        self.network.send_message(peer, Message::block(id, block)).await?;

        {
            let mut ledgers = self.ledgers.lock();
            let ledger = ledgers.get_or_create(peer);
            ledger.sent_bytes(len);
            ledger.cancel_want(&key);
        }
        self.metrics.inc_blocks_sent();
        debug!(%peer, %key, bytes = len, "block sent");
        Ok(())
    }

    async fn receive_block(&self, peer: PeerId, id: u64, block: Block) -> Result<(), ExchangeError> {
        let key = block.key().clone();
        if !block.is_valid() {
            warn!(%peer, %key, "received block does not match its key");
            return Err(ExchangeError::InvalidBlock { key, peer });
        }

        let Some(entry) = self.take_if(&key, WantState::Fulfilled, |_| true) else {
            self.tracker.record_redundant();
            self.metrics.inc_duplicates();
            debug!(%peer, %key, id, state = ?self.want_state(&key), "dropping unwanted block");
            return Ok(());
        };
        entry.abort();

        self.ledgers
            .lock()
            .get_or_create(peer)
            .received_bytes(block.len() as u64);
        self.tracker.finish(&key, Instant::now());
        self.metrics.inc_blocks_received();
        debug!(%peer, %key, id, bytes = block.len(), "want fulfilled");

        if let Err(error) = self.store.put(block.clone()) {
            warn!(%key, %error, "failed to store received block");
        }

        let hit = entry.providers.first() == Some(&peer);
        self.observe(hit, entry.started.elapsed());
        entry.resolve(Ok(block.clone()));

        self.provide(&block, Some(peer)).await;
        Ok(())
    }

    /// Send `block` to every partner wanting it whose strategy allows it,
    /// except `except`. Returns the number of partners served.
    async fn provide(&self, block: &Block, except: Option<PeerId>) -> usize {
        let key = block.key();
        let (targets, refused) = {
            let ledgers = self.ledgers.lock();
            let (targets, refused): (Vec<_>, Vec<_>) = ledgers
                .peers_wanting(key)
                .into_iter()
                .filter(|peer| Some(*peer) != except)
                .partition(|peer| ledgers.get(peer).is_some_and(Ledger::should_send));
            (targets, refused.len())
        };
        for _ in 0..refused {
            self.metrics.inc_refusals();
        }

        let sends = targets
            .into_iter()
            .map(|peer| async move {
                match self.send_block(peer, UNSOLICITED_ID, block.clone()).await {
                    Ok(()) => true,
                    Err(error) => {
                        warn!(%peer, %key, %error, "failed to provide block");
                        false
                    }
                }
            })
            .collect::<FuturesUnordered<_>>();
        sends.filter(|sent| futures::future::ready(*sent)).count().await
    }

    /// Feed a completed want into the fan-out controller.
    fn observe(&self, hit: bool, elapsed: Duration) {
        let variance = self
            .fanout
            .lock()
            .record(hit, elapsed, self.args.observation_batch);
        if let Some(variance) = variance {
            self.tracker.record_variance(variance);
        }
    }
}

impl<N, R, S> Release for Inner<N, R, S>
where
    N: Network,
    R: Routing + 'static,
    S: BlockStore + 'static,
{
    fn release(&self, key: &BlockKey) {
        self.cancel(key, |entry| {
            entry.waiters.retain(|waiter| !waiter.is_closed());
            entry.waiters.is_empty()
        });
    }
}

impl<N, R, S> std::fmt::Debug for Exchange<N, R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("local", &self.inner.local)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
