use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cairn_exchange_api::MessageSink;
use cairn_exchange_message::Message;
use cairn_net_dialer::{DialRequest, RawConnection, Transport};
use cairn_primitives::{Multiaddr, PeerId};
use futures::future::BoxFuture;
use parking_lot::Mutex;

/// What a [`MockTransport`] does when an address is dialed.
#[derive(Debug, Clone)]
pub enum DialBehaviour {
    /// Fail with `ConnectionRefused`.
    Refuse,
    /// Connect; the remote end proves the given identity.
    Accept(PeerId),
    /// Never complete.
    Hang,
}

/// Connection handed out by [`MockTransport`].
///
/// Clones share state, so a test can keep one and inspect what the code under
/// test sent through it.
#[derive(Debug, Clone)]
pub struct MockConnection {
    peer: PeerId,
    addr: Multiaddr,
    closed: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<Message>>>,
}

impl MockConnection {
    /// Open connection to `peer` at `addr`.
    pub fn new(peer: PeerId, addr: Multiaddr) -> Self {
        Self {
            peer,
            addr,
            closed: Arc::new(AtomicBool::new(false)),
            sent: Arc::default(),
        }
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }
}

impl RawConnection for MockConnection {
    fn remote_peer(&self) -> PeerId {
        self.peer
    }

    fn remote_addr(&self) -> Multiaddr {
        self.addr.clone()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl MessageSink for MockConnection {
    fn send_message(&self, message: Message) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

/// Scripted transport. Unknown addresses are refused.
#[derive(Default)]
pub struct MockTransport {
    behaviours: Mutex<HashMap<Multiaddr, DialBehaviour>>,
    latency: Option<Duration>,
    dials: Mutex<Vec<DialRequest>>,
    connections: Mutex<Vec<MockConnection>>,
}

impl MockTransport {
    /// Transport that completes dials immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every dial outcome by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Script the outcome of dialing `addr`.
    pub fn set(&self, addr: Multiaddr, behaviour: DialBehaviour) {
        self.behaviours.lock().insert(addr, behaviour);
    }

    /// Number of dials performed.
    pub fn dial_count(&self) -> usize {
        self.dials.lock().len()
    }

    /// Addresses dialed, in order.
    pub fn dialed_addrs(&self) -> Vec<Multiaddr> {
        self.dials.lock().iter().map(|r| r.addr.clone()).collect()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<DialRequest> {
        self.dials.lock().clone()
    }

    /// Every connection handed out, in order.
    pub fn connections(&self) -> Vec<MockConnection> {
        self.connections.lock().clone()
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;

    fn dial(&self, request: DialRequest) -> BoxFuture<'static, io::Result<MockConnection>> {
        let behaviour = self
            .behaviours
            .lock()
            .get(&request.addr)
            .cloned()
            .unwrap_or(DialBehaviour::Refuse);
        let addr = request.addr.clone();
        self.dials.lock().push(request);

        let latency = self.latency;
        let outcome = match behaviour {
            DialBehaviour::Hang => return Box::pin(futures::future::pending()),
            DialBehaviour::Refuse => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
            DialBehaviour::Accept(peer) => {
                let conn = MockConnection::new(peer, addr);
                self.connections.lock().push(conn.clone());
                Ok(conn)
            }
        };

        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            outcome
        })
    }
}
