//! Peer dialing for the block exchange.
//!
//! Two layers:
//!
//! - [`DialSync`] makes sure at most one dial per destination peer is in
//!   flight. Concurrent callers either own the dial or get a [`DialWait`]
//!   that resolves when the owner is done.
//! - [`Swarm`] owns the open-connections table and runs the dial loop:
//!   reuse an open connection, otherwise take the dial lock (or wait on the
//!   current holder), filter the peer's addresses and try them one at a
//!   time, retrying whole rounds up to the configured number of attempts.
//!
//! Transport security, address translation and peer discovery stay outside
//! this crate behind the [`Transport`] and [`PeerBook`] traits.

pub mod addrs;
mod args;
mod config;
mod connection;
mod error;
mod metrics;
mod swarm;
mod sync;
mod traits;

pub use args::DialArgs;
pub use config::{DefaultDialConfig, DialConfig};
pub use connection::{Connection, ConnectionId, Direction};
pub use error::{AttemptFailure, DialError, MAX_RECORDED_FAILURES};
pub use swarm::Swarm;
pub use sync::{DialLock, DialSync, DialWait};
pub use traits::{DialRequest, PeerBook, RawConnection, Transport};
