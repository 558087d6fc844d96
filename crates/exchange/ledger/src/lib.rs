//! Exchange ledgers.
//!
//! # Components
//!
//! - [`Ledger`] - bytes sent/received, exchange timestamps and want-list for
//!   one partner
//! - [`Strategy`] - decides whether to send a block to a partner, given its
//!   ledger
//! - [`LedgerMap`] - the set of ledgers keyed by partner, with per-partner
//!   strategy overrides
//!
//! Ledgers have no internal locking. The exchange engine owns the
//! [`LedgerMap`] and serializes every mutation behind a single lock.

mod ledger;
mod map;
mod strategy;

pub use ledger::{DEFAULT_MAX_WANTS, DebtRatio, Ledger, LedgerSnapshot};
pub use map::LedgerMap;
pub use strategy::{AlwaysSend, DEFAULT_DEBT_RATIO, DebtRatioStrategy, FnStrategy, Strategy, StrategyKind};
