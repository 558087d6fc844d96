use std::collections::HashMap;

use cairn_net_dialer::PeerBook;
use cairn_primitives::{Multiaddr, PeerId};
use libp2p::identity::{Keypair, ed25519};
use libp2p::multiaddr::Protocol;
use parking_lot::RwLock;

/// Deterministic ed25519 keypair derived from `seed`.
pub fn keypair(seed: u8) -> Keypair {
    let secret = ed25519::SecretKey::try_from_bytes([seed; 32]).expect("32 bytes is a valid key");
    ed25519::Keypair::from(secret).into()
}

/// Deterministic peer id derived from `seed`.
pub fn peer_id(seed: u8) -> PeerId {
    keypair(seed).public().to_peer_id()
}

/// `/memory/<port>` address.
pub fn memory_addr(port: u64) -> Multiaddr {
    Multiaddr::empty().with(Protocol::Memory(port))
}

/// Address book backed by a hash map.
#[derive(Default)]
pub struct MemoryPeerBook {
    addrs: RwLock<HashMap<PeerId, Vec<Multiaddr>>>,
    keys: RwLock<HashMap<PeerId, Keypair>>,
}

impl MemoryPeerBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Book holding the key for `local`.
    pub fn with_local(local: Keypair) -> Self {
        let book = Self::default();
        book.keys.write().insert(local.public().to_peer_id(), local);
        book
    }

    /// Append an address for `peer`.
    pub fn add_address(&self, peer: PeerId, addr: Multiaddr) {
        self.addrs.write().entry(peer).or_default().push(addr);
    }

    /// Replace all addresses for `peer`.
    pub fn set_addresses(&self, peer: PeerId, addrs: Vec<Multiaddr>) {
        self.addrs.write().insert(peer, addrs);
    }
}

impl PeerBook for MemoryPeerBook {
    fn addresses(&self, peer: &PeerId) -> Vec<Multiaddr> {
        self.addrs.read().get(peer).cloned().unwrap_or_default()
    }

    fn keypair(&self, peer: &PeerId) -> Option<Keypair> {
        self.keys.read().get(peer).cloned()
    }
}
