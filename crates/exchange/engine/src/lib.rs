//! Bitswap-style block exchange.
//!
//! [`Exchange`] owns the partner ledgers and the local want table. Three
//! entry points drive it:
//!
//! - [`Exchange::want_block`] registers interest in a block and returns a
//!   [`WantHandle`] right away. A background task searches for providers,
//!   connects to as many of them as the current fan-out allows and sends each
//!   a `WANT_BLOCK`. The first delivery fulfills the want; later duplicates
//!   are dropped.
//! - [`Exchange::has_block`] stores a block and offers it to every partner
//!   whose want-list holds it and whose strategy allows sending.
//! - [`Exchange::receive_message`] handles inbound messages: requests are
//!   recorded in the sender's ledger and served when the strategy allows;
//!   deliveries are verified, accounted and handed to waiters.
//!
//! # Want lifecycle
//!
//! ```text
//! Unsent ──► Sent ──► Fulfilled
//!   │          ├────► Cancelled
//!   │          └────► TimedOut
//!   ├────────────────► Unresolvable
//!   └────────────────► Fulfilled | Cancelled
//! ```

mod args;
mod error;
mod exchange;
mod metrics;
mod network;
mod want;

pub use args::ExchangeArgs;
pub use error::ExchangeError;
pub use exchange::Exchange;
pub use network::SwarmNetwork;
pub use want::{WantHandle, WantState};

pub use cairn_exchange_ledger::{LedgerSnapshot, Strategy, StrategyKind};
pub use cairn_exchange_tracker::{AdjusterArgs, LatencySummary};
