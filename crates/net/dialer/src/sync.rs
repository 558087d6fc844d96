//! Per-peer dial deduplication.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use cairn_primitives::PeerId;
use parking_lot::Mutex;
use tokio::sync::watch;

/// Outcome of [`DialSync::lock`].
#[derive(Debug)]
pub enum DialLock {
    /// No dial was in flight; the caller now owns it and must call
    /// [`DialSync::unlock`] once the attempt ends, whatever the outcome.
    Acquired,
    /// Another caller is dialing this peer.
    InFlight(DialWait),
}

impl DialLock {
    /// Whether the caller became the dial owner.
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}

/// Signal released when the in-flight dial to a peer ends.
///
/// Release says nothing about success: waiters must re-check for a
/// connection and decide again.
#[derive(Debug)]
pub struct DialWait(watch::Receiver<()>);

impl DialWait {
    /// Wait until the owning dial has finished.
    pub async fn wait(mut self) {
        // The owner never sends; the channel only ever closes.
        let _ = self.0.changed().await;
    }

    /// Whether the owning dial has already finished.
    pub fn is_released(&self) -> bool {
        self.0.has_changed().is_err()
    }
}

/// Tracks which peers currently have a dial in flight.
///
/// Each entry holds the sending half of a watch channel that nobody writes
/// to; dropping it on [`unlock`](Self::unlock) closes the channel and wakes
/// every waiter at once, including ones that subscribed after the last poll.
#[derive(Debug, Default)]
pub struct DialSync {
    ongoing: Mutex<HashMap<PeerId, watch::Sender<()>>>,
}

impl DialSync {
    /// Create an empty dial tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a dial to `peer`, or join the one already in flight.
    pub fn lock(&self, peer: PeerId) -> DialLock {
        match self.ongoing.lock().entry(peer) {
            Entry::Occupied(entry) => DialLock::InFlight(DialWait(entry.get().subscribe())),
            Entry::Vacant(entry) => {
                let (tx, _) = watch::channel(());
                entry.insert(tx);
                DialLock::Acquired
            }
        }
    }

    /// End the dial to `peer` and release everyone waiting on it.
    ///
    /// # Panics
    ///
    /// Panics if no dial to `peer` is in flight: only the caller that got
    /// [`DialLock::Acquired`] may unlock, and only once.
    pub fn unlock(&self, peer: &PeerId) {
        let released = self.ongoing.lock().remove(peer);
        if released.is_none() {
            panic!("dial unlock called with no ongoing dial to peer {peer}");
        }
    }

    /// Whether a dial to `peer` is in flight.
    pub fn is_dialing(&self, peer: &PeerId) -> bool {
        self.ongoing.lock().contains_key(peer)
    }

    /// Number of peers currently being dialed.
    pub fn len(&self) -> usize {
        self.ongoing.lock().len()
    }

    /// Whether no dial is in flight.
    pub fn is_empty(&self) -> bool {
        self.ongoing.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_peer(n: u8) -> PeerId {
        let bytes = [n; 32];
        let key = libp2p::identity::ed25519::SecretKey::try_from_bytes(bytes).unwrap();
        let keypair =
            libp2p::identity::Keypair::from(libp2p::identity::ed25519::Keypair::from(key));
        keypair.public().to_peer_id()
    }

    #[test]
    fn test_lock_unlock_cycle() {
        let ds = DialSync::new();
        let peer = test_peer(1);

        assert!(ds.lock(peer).is_acquired());
        assert!(ds.is_dialing(&peer));

        let second = ds.lock(peer);
        assert!(!second.is_acquired());

        ds.unlock(&peer);
        assert!(!ds.is_dialing(&peer));

        // A fresh dial may start once the previous one is done.
        assert!(ds.lock(peer).is_acquired());
        ds.unlock(&peer);
        assert!(ds.is_empty());
    }

    #[test]
    fn test_peers_are_independent() {
        let ds = DialSync::new();
        assert!(ds.lock(test_peer(1)).is_acquired());
        assert!(ds.lock(test_peer(2)).is_acquired());
        assert_eq!(ds.len(), 2);
    }

    #[test]
    #[should_panic(expected = "no ongoing dial")]
    fn test_unlock_without_lock_panics() {
        let ds = DialSync::new();
        ds.unlock(&test_peer(1));
    }

    #[test]
    #[should_panic(expected = "no ongoing dial")]
    fn test_double_unlock_panics() {
        let ds = DialSync::new();
        let peer = test_peer(1);
        assert!(ds.lock(peer).is_acquired());
        ds.unlock(&peer);
        ds.unlock(&peer);
    }

    #[test]
    fn test_wait_released_even_if_unlocked_before_polling() {
        let ds = DialSync::new();
        let peer = test_peer(1);
        assert!(ds.lock(peer).is_acquired());

        let DialLock::InFlight(wait) = ds.lock(peer) else {
            panic!("expected in-flight dial");
        };
        assert!(!wait.is_released());

        ds.unlock(&peer);
        assert!(wait.is_released());
    }

    #[tokio::test]
    async fn test_waiters_released_together() {
        let ds = Arc::new(DialSync::new());
        let peer = test_peer(1);
        assert!(ds.lock(peer).is_acquired());

        let released = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let DialLock::InFlight(wait) = ds.lock(peer) else {
                panic!("expected in-flight dial");
            };
            let released = released.clone();
            handles.push(tokio::spawn(async move {
                wait.wait().await;
                released.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tokio::task::yield_now().await;
        assert_eq!(released.load(Ordering::SeqCst), 0);

        ds.unlock(&peer);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lock_single_owner() {
        let ds = Arc::new(DialSync::new());
        let peer = test_peer(7);
        let owners = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ds = ds.clone();
            let owners = owners.clone();
            handles.push(tokio::spawn(async move {
                if ds.lock(peer).is_acquired() {
                    owners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(owners.load(Ordering::SeqCst), 1);
    }
}
