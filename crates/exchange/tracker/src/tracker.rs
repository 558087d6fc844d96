//! Per-want pipeline timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use cairn_primitives::BlockKey;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;
use web_time::Instant;

use crate::ResolveTracker;

/// Timestamps for one want.
///
/// Every stage is write-once: the first record wins and later ones are
/// ignored, so concurrent stages of the same want never need a shared lock.
#[derive(Debug, Default)]
pub struct FTracker {
    want_blocks_at: OnceLock<Instant>,
    find_provider_at: OnceLock<Instant>,
    found_provider_at: OnceLock<Instant>,
    connect_at: OnceLock<Instant>,
    finish_at: OnceLock<Instant>,
    resolver: Arc<ResolveTracker>,
}

impl FTracker {
    fn new(want_blocks_at: Instant) -> Self {
        let tracker = Self::default();
        let _ = tracker.want_blocks_at.set(want_blocks_at);
        tracker
    }

    /// When the want was registered.
    pub fn want_blocks_at(&self) -> Option<Instant> {
        self.want_blocks_at.get().copied()
    }

    /// When the provider search started.
    pub fn find_provider_at(&self) -> Option<Instant> {
        self.find_provider_at.get().copied()
    }

    /// When the first provider was found.
    pub fn found_provider_at(&self) -> Option<Instant> {
        self.found_provider_at.get().copied()
    }

    /// When the first provider connection was established.
    pub fn connect_at(&self) -> Option<Instant> {
        self.connect_at.get().copied()
    }

    /// When the block arrived.
    pub fn finish_at(&self) -> Option<Instant> {
        self.finish_at.get().copied()
    }

    /// Resolve-path timing for this want.
    pub fn resolver(&self) -> &ResolveTracker {
        &self.resolver
    }

    /// Per-stage durations, when every stage was recorded in order.
    fn stages(&self) -> Option<[Duration; 3]> {
        let want = self.want_blocks_at()?;
        let find = self.find_provider_at()?;
        let found = self.found_provider_at()?;
        let connect = self.connect_at()?;
        let finish = self.finish_at()?;

        if find < want || connect < found || finish < connect {
            return None;
        }
        Some([find - want, connect - found, finish - connect])
    }
}

/// Averages over the wants whose pipeline completed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencySummary {
    /// Wants tracked.
    pub entries: usize,
    /// Wants with every stage recorded in order; the averages cover these.
    pub effective: usize,
    /// Want registered → provider search started.
    pub want_to_find: Duration,
    /// Time waiting on the network while resolving providers.
    pub resolve_communication: Duration,
    /// Remaining time spent resolving providers.
    pub resolve_scheduling: Duration,
    /// Provider found → connected.
    pub found_to_connect: Duration,
    /// Connected → block received.
    pub connect_to_finish: Duration,
    /// Redundant deliveries per tracked want.
    pub average_redundant: f64,
    /// Accumulated variance per tracked want.
    pub average_variance: f64,
}

/// Pipeline timestamps keyed by block, plus redundancy and variance totals.
///
/// Entries are created by [`want_blocks`](Self::want_blocks) and never
/// removed. Stage records for keys with no entry are ignored.
#[derive(Debug, Default)]
pub struct Tracker {
    entries: DashMap<BlockKey, Arc<FTracker>>,
    redundant: AtomicU64,
    variance: Mutex<f64>,
}

impl Tracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry(&self, key: &BlockKey, f: impl FnOnce(&FTracker)) {
        if let Some(entry) = self.entry(key) {
            f(&entry);
        }
    }

    /// Start tracking `key`. A key already tracked keeps its original entry.
    pub fn want_blocks(&self, key: &BlockKey, at: Instant) {
        if self.entries.contains_key(key) {
            return;
        }
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(FTracker::new(at)));
    }

    /// Provider search for `key` started.
    pub fn find_provider(&self, key: &BlockKey, at: Instant) {
        self.with_entry(key, |e| {
            let _ = e.find_provider_at.set(at);
        });
    }

    /// A provider for `key` was found.
    pub fn found_provider(&self, key: &BlockKey, at: Instant) {
        self.with_entry(key, |e| {
            let _ = e.found_provider_at.set(at);
        });
    }

    /// A connection to a provider of `key` was established.
    pub fn connected(&self, key: &BlockKey, at: Instant) {
        self.with_entry(key, |e| {
            let _ = e.connect_at.set(at);
        });
    }

    /// The block for `key` arrived.
    pub fn finish(&self, key: &BlockKey, at: Instant) {
        self.with_entry(key, |e| {
            let _ = e.finish_at.set(at);
        });
    }

    /// The entry for `key`.
    pub fn entry(&self, key: &BlockKey) -> Option<Arc<FTracker>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    /// The resolve-path tracker for `key`.
    pub fn resolver(&self, key: &BlockKey) -> Option<Arc<ResolveTracker>> {
        self.entries.get(key).map(|e| Arc::clone(&e.resolver))
    }

    /// Count one redundant delivery.
    pub fn record_redundant(&self) {
        self.redundant.fetch_add(1, Ordering::Relaxed);
    }

    /// Add to the variance total.
    pub fn record_variance(&self, variance: f64) {
        *self.variance.lock() += variance;
    }

    /// Number of tracked wants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregate the tracked wants.
    pub fn summary(&self) -> LatencySummary {
        let mut summary = LatencySummary {
            entries: self.entries.len(),
            ..Default::default()
        };
        let mut totals = [Duration::ZERO; 5];

        for entry in self.entries.iter() {
            let Some([want_to_find, found_to_connect, connect_to_finish]) = entry.stages() else {
                continue;
            };
            let (communication, scheduling) = entry.resolver.collect();

            summary.effective += 1;
            for (total, d) in totals.iter_mut().zip([
                want_to_find,
                communication,
                scheduling,
                found_to_connect,
                connect_to_finish,
            ]) {
                *total += d;
            }
        }

        if summary.effective > 0 {
            let n = u32::try_from(summary.effective).unwrap_or(u32::MAX);
            let [a, b, c, d, e] = totals.map(|t| t / n);
            summary.want_to_find = a;
            summary.resolve_communication = b;
            summary.resolve_scheduling = c;
            summary.found_to_connect = d;
            summary.connect_to_finish = e;
        }

        if summary.entries > 0 {
            let n = summary.entries as f64;
            summary.average_redundant = self.redundant.load(Ordering::Relaxed) as f64 / n;
            summary.average_variance = *self.variance.lock() / n;
        }

        summary
    }

    /// Log the summary.
    pub fn report(&self) {
        let s = self.summary();
        info!(
            entries = s.entries,
            effective = s.effective,
            want_to_find_ms = s.want_to_find.as_secs_f64() * 1000.0,
            resolve_communication_ms = s.resolve_communication.as_secs_f64() * 1000.0,
            resolve_scheduling_ms = s.resolve_scheduling.as_secs_f64() * 1000.0,
            found_to_connect_ms = s.found_to_connect.as_secs_f64() * 1000.0,
            connect_to_finish_ms = s.connect_to_finish.as_secs_f64() * 1000.0,
            average_redundant = s.average_redundant,
            average_variance = s.average_variance,
            "want latency summary"
        );
    }
}
