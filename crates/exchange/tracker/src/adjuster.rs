//! Adaptive fan-out control.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::debug;

use crate::AdjusterArgs;

/// One batch of completed wants, as seen by the adjuster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Fraction of the batch served by the providers asked first.
    pub hit_ratio: f64,
    /// Total time spent on the batch.
    pub elapsed: Duration,
    /// Number of requests in the batch.
    pub requests: usize,
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    /// Not yet consistently above the hit-ratio threshold; fan-out grows in
    /// coarse steps on every hit.
    CoWorker,
    /// Above the threshold for longer than the window; fan-out follows the
    /// latency trend in fine steps.
    FullProvider,
}

/// Produces the fan-out width used for new wants.
pub trait FanoutAdjuster: Send {
    /// Current width.
    fn fanout(&self) -> usize;

    /// Feed one observation and return the updated width.
    fn observe(&mut self, observation: Observation) -> usize;
}

/// Hit-ratio and latency driven fan-out controller.
///
/// While a [`Role::CoWorker`], every batch whose hit ratio exceeds the
/// threshold widens the fan-out by the coarse step. After more consecutive
/// hits than the window size the adjuster becomes a [`Role::FullProvider`]
/// and compares each batch's per-request latency with the window average:
///
/// - worse than the average by more than the allowed variation (relative to
///   the distance from the best latency seen) halves the width, floored at 1
/// - better by more than the allowed variation widens it by the fine step
///
/// Any batch at or under the threshold drops back to cooperating and resets
/// the hit count. The width never exceeds the configured maximum.
#[derive(Debug, Clone)]
pub struct DynamicAdjuster {
    args: AdjusterArgs,
    role: Role,
    fanout: usize,
    consecutive_hits: usize,
    min_request_secs: f64,
    history: VecDeque<f64>,
}

impl DynamicAdjuster {
    /// Adjuster starting at `args.initial` as a co-worker.
    pub fn new(args: AdjusterArgs) -> Self {
        let window = args.window.max(1);
        Self {
            role: Role::CoWorker,
            fanout: args.initial.clamp(1, args.max.max(1)),
            consecutive_hits: 0,
            min_request_secs: f64::INFINITY,
            history: VecDeque::with_capacity(window),
            args,
        }
    }

    /// Current role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Best per-request latency seen so far.
    pub fn min_request_time(&self) -> Option<Duration> {
        self.min_request_secs
            .is_finite()
            .then(|| Duration::from_secs_f64(self.min_request_secs))
    }

    /// Average per-request latency over the filled part of the window.
    pub fn average_request_time(&self) -> Option<Duration> {
        self.average_secs().map(Duration::from_secs_f64)
    }

    fn average_secs(&self) -> Option<f64> {
        (!self.history.is_empty())
            .then(|| self.history.iter().sum::<f64>() / self.history.len() as f64)
    }

    fn widen(&mut self, step: usize) {
        self.fanout = self.fanout.saturating_add(step).min(self.args.max.max(1));
    }

    fn narrow(&mut self) {
        self.fanout = (self.fanout / 2).max(1);
    }

    fn record_latency(&mut self, secs: f64) {
        if self.history.len() >= self.args.window.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(secs);
        self.min_request_secs = self.min_request_secs.min(secs);
    }
}

impl Default for DynamicAdjuster {
    fn default() -> Self {
        Self::new(AdjusterArgs::default())
    }
}

/// Deviations below this many seconds are rounding noise.
const NOISE_SECS: f64 = 1e-9;

/// Whether `diff` is a deviation beyond `allowed` of `spread`.
///
/// A non-positive spread means the latest latency is the best seen, so any
/// positive deviation counts.
fn exceeds(diff: f64, spread: f64, allowed: f64) -> bool {
    diff > NOISE_SECS && (spread <= 0.0 || diff / spread > allowed)
}

impl FanoutAdjuster for DynamicAdjuster {
    fn fanout(&self) -> usize {
        self.fanout
    }

    fn observe(&mut self, observation: Observation) -> usize {
        if observation.requests == 0 {
            return self.fanout;
        }

        let last = observation.elapsed.as_secs_f64() / observation.requests as f64;
        let hit = observation.hit_ratio > self.args.hit_ratio;
        let before = self.fanout;

        match self.role {
            Role::CoWorker => {
                if hit {
                    self.widen(self.args.coarse_step);
                }
            }
            Role::FullProvider => {
                let average = self.average_secs().unwrap_or(last);
                let spread = last - self.min_request_secs;
                if exceeds(last - average, spread, self.args.allowed_variation) {
                    self.narrow();
                } else if exceeds(average - last, spread, self.args.allowed_variation) {
                    self.widen(self.args.fine_step);
                }
            }
        }

        if hit {
            self.consecutive_hits += 1;
            if self.consecutive_hits > self.args.window {
                self.role = Role::FullProvider;
            }
        } else {
            self.consecutive_hits = 0;
            self.role = Role::CoWorker;
        }

        self.record_latency(last);

        if self.fanout != before {
            debug!(
                from = before,
                to = self.fanout,
                role = %self.role,
                hit_ratio = observation.hit_ratio,
                "fan-out adjusted"
            );
        }
        self.fanout
    }
}
