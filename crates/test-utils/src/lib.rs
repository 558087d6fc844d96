//! Test fixtures for cairn crates.
//!
//! Everything here is in-memory and deterministic: peer identities are
//! derived from a single seed byte, transports and networks never touch a
//! socket, and every mock records what it was asked to do.

mod identity;
mod network;
mod routing;
mod store;
mod transport;

pub use identity::{MemoryPeerBook, keypair, memory_addr, peer_id};
pub use network::{Inbox, MemoryHub, MemoryNetwork};
pub use routing::MockRouting;
pub use store::MemoryBlockStore;
pub use transport::{DialBehaviour, MockConnection, MockTransport};
