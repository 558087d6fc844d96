use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cairn_exchange_api::{Network, NetworkError};
use cairn_exchange_message::Message;
use cairn_net_dialer::DialError;
use cairn_primitives::PeerId;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

/// Messages delivered to one peer, tagged with the sender.
pub type Inbox = mpsc::UnboundedReceiver<(PeerId, Message)>;

/// Switchboard connecting [`MemoryNetwork`]s.
#[derive(Debug, Default)]
pub struct MemoryHub {
    inboxes: RwLock<HashMap<PeerId, mpsc::UnboundedSender<(PeerId, Message)>>>,
    unreachable: RwLock<HashSet<PeerId>>,
}

impl MemoryHub {
    /// Empty hub.
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// Attach `peer`, returning its network handle and inbox.
    pub fn join(self: &Arc<Self>, peer: PeerId) -> (MemoryNetwork, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.write().insert(peer, tx);
        let network = MemoryNetwork {
            local: peer,
            hub: Arc::clone(self),
            sent: Mutex::default(),
            connects: AtomicUsize::new(0),
        };
        (network, rx)
    }

    /// Make every connect and send to `peer` fail.
    pub fn set_unreachable(&self, peer: PeerId) {
        self.unreachable.write().insert(peer);
    }

    fn route(&self, peer: &PeerId) -> Option<mpsc::UnboundedSender<(PeerId, Message)>> {
        if self.unreachable.read().contains(peer) {
            return None;
        }
        self.inboxes.read().get(peer).cloned()
    }
}

/// [`Network`] delivering through a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryNetwork {
    local: PeerId,
    hub: Arc<MemoryHub>,
    sent: Mutex<Vec<(PeerId, Message)>>,
    connects: AtomicUsize,
}

impl MemoryNetwork {
    /// Messages sent so far, with their destination.
    pub fn sent(&self) -> Vec<(PeerId, Message)> {
        self.sent.lock().clone()
    }

    /// Messages sent to `peer`.
    pub fn sent_to(&self, peer: &PeerId) -> Vec<Message> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to == peer)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Number of `connect` calls.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    async fn connect(&self, peer: PeerId) -> Result<(), NetworkError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        match self.hub.route(&peer) {
            Some(_) => Ok(()),
            None => Err(DialError::NoUsableAddresses { peer }.into()),
        }
    }

    async fn send_message(&self, peer: PeerId, message: Message) -> Result<(), NetworkError> {
        let inbox = self.hub.route(&peer).ok_or(NetworkError::Send {
            peer,
            reason: "peer unreachable".to_string(),
        })?;
        self.sent.lock().push((peer, message.clone()));
        inbox
            .send((self.local, message))
            .map_err(|_| NetworkError::Send {
                peer,
                reason: "inbox closed".to_string(),
            })
    }
}
