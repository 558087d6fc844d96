//! Dial error types.

use std::time::Duration;

use cairn_primitives::{Multiaddr, PeerId};

/// Upper bound on per-address failures kept in an aggregate error.
pub const MAX_RECORDED_FAILURES: usize = 16;

/// One failed attempt against a single address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{addr}: {reason}")]
pub struct AttemptFailure {
    /// Address that was tried.
    pub addr: Multiaddr,
    /// Why it failed (transport error or identity mismatch).
    pub reason: String,
}

impl AttemptFailure {
    pub(crate) fn new(addr: Multiaddr, reason: impl Into<String>) -> Self {
        Self {
            addr,
            reason: reason.into(),
        }
    }
}

/// Errors returned by [`Swarm::dial`](crate::Swarm::dial).
#[derive(Debug, Clone, thiserror::Error)]
pub enum DialError {
    /// Attempted to dial the local peer.
    #[error("attempted connection to self ({peer})")]
    SelfDialRejected {
        /// The local peer.
        peer: PeerId,
    },

    /// Every known address was filtered out (unusable or our own).
    #[error("peer {peer} has no usable addresses")]
    NoUsableAddresses {
        /// Peer being dialed.
        peer: PeerId,
    },

    /// Every remaining address was tried and none produced a connection.
    #[error("failed to dial {peer} on {} address(es)", .failures.len())]
    AllAddressesFailed {
        /// Peer being dialed.
        peer: PeerId,
        /// Per-address failures, in the order tried.
        failures: Vec<AttemptFailure>,
    },

    /// A single dial attempt exceeded its time budget.
    #[error("dial to {peer} timed out after {timeout:?}")]
    Timeout {
        /// Peer being dialed.
        peer: PeerId,
        /// Per-attempt budget.
        timeout: Duration,
    },

    /// Connection setup was refused because the table is full.
    #[error("connection limit of {limit} reached")]
    ConnectionLimit {
        /// Configured maximum.
        limit: usize,
    },

    /// The swarm has been shut down.
    #[error("swarm is closed")]
    Closed,

    /// All dial rounds failed.
    #[error("{local} failed to dial {peer} after {attempts} attempts")]
    Exhausted {
        /// Local peer.
        local: PeerId,
        /// Peer being dialed.
        peer: PeerId,
        /// Rounds made.
        attempts: u32,
        /// Per-address failures across all rounds, capped at
        /// [`MAX_RECORDED_FAILURES`].
        failures: Vec<AttemptFailure>,
        /// Error from the last round this caller dialed itself, if any.
        last: Option<Box<DialError>>,
    },
}

impl DialError {
    /// Whether retrying the dial right away is pointless.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SelfDialRejected { .. } | Self::NoUsableAddresses { .. } | Self::Closed
        )
    }
}

/// Bounded collector for per-address failures.
#[derive(Debug, Default)]
pub(crate) struct FailureLog {
    failures: Vec<AttemptFailure>,
}

impl FailureLog {
    pub(crate) fn extend(&mut self, failures: impl IntoIterator<Item = AttemptFailure>) {
        let room = MAX_RECORDED_FAILURES.saturating_sub(self.failures.len());
        self.failures.extend(failures.into_iter().take(room));
    }

    pub(crate) fn into_vec(self) -> Vec<AttemptFailure> {
        self.failures
    }
}
