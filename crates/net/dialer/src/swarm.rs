//! Connection table and the bounded-retry dial loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use cairn_primitives::{Multiaddr, PeerId};
use libp2p::identity::Keypair;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::addrs;
use crate::connection::{Connection, ConnectionId, Direction};
use crate::error::{AttemptFailure, FailureLog};
use crate::metrics::DialMetrics;
use crate::{DefaultDialConfig, DialConfig, DialError, DialLock, DialRequest, DialSync, PeerBook};
use crate::{RawConnection, Transport};

/// Connection handle shared between the table and its users.
type SharedConnection<T> = Arc<Connection<<T as Transport>::Connection>>;

/// Owns the open-connections table and dials peers on demand.
///
/// # Concurrency
///
/// - `conns: RwLock` - read on every dial and lookup, written on setup/close
/// - `dsync` - at most one dial per peer in flight
/// - `listen_addrs: RwLock` - rarely written
pub struct Swarm<T: Transport, B, C = DefaultDialConfig> {
    local: PeerId,
    transport: T,
    peers: B,
    config: C,
    dsync: DialSync,
    conns: RwLock<HashMap<PeerId, Vec<SharedConnection<T>>>>,
    listen_addrs: RwLock<Vec<Multiaddr>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    metrics: DialMetrics,
}

impl<T, B, C> Swarm<T, B, C>
where
    T: Transport,
    B: PeerBook,
    C: DialConfig,
{
    /// Create a swarm for `local` dialing through `transport`.
    pub fn new(local: PeerId, transport: T, peers: B, config: C) -> Self {
        Self {
            local,
            transport,
            peers,
            config,
            dsync: DialSync::new(),
            conns: RwLock::new(HashMap::new()),
            listen_addrs: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            metrics: DialMetrics::default(),
        }
    }

    /// Local peer identity.
    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    /// The address book this swarm dials from.
    pub fn peer_book(&self) -> &B {
        &self.peers
    }

    /// Connect to `peer`, reusing an open connection when there is one.
    ///
    /// Runs up to [`DialConfig::dial_attempts`] rounds. Each round re-checks
    /// the connection table, then either performs the dial (bounded by
    /// [`DialConfig::dial_timeout`]) or waits on the dial already in flight.
    /// Dropping the returned future cancels the dial and releases the lock.
    pub async fn dial(&self, peer: PeerId) -> Result<SharedConnection<T>, DialError> {
        if peer == self.local {
            warn!(%peer, "refusing to dial self");
            return Err(DialError::SelfDialRejected { peer });
        }

        let attempts = self.config.dial_attempts().max(1);
        let mut failures = FailureLog::default();
        let mut last = None;

        for round in 1..=attempts {
            if self.is_closed() {
                return Err(DialError::Closed);
            }
            if let Some(conn) = self.connection_to(&peer) {
                trace!(%peer, id = %conn.id(), "reusing open connection");
                return Ok(conn);
            }

            match self.dsync.lock(peer) {
                DialLock::InFlight(wait) => {
                    debug!(%peer, round, "dial already in flight, waiting");
                    self.metrics.inc_waits();
                    wait.wait().await;
                    if let Some(conn) = self.connection_to(&peer) {
                        return Ok(conn);
                    }
                }
                DialLock::Acquired => {
                    let _release = scopeguard::guard((), |()| self.dsync.unlock(&peer));
                    self.metrics.inc_dials();

                    let timeout = self.config.dial_timeout();
                    let result = tokio::time::timeout(timeout, self.dial_once(peer))
                        .await
                        .unwrap_or(Err(DialError::Timeout { peer, timeout }));

                    match result {
                        Ok(conn) => {
                            debug!(%peer, round, addr = %conn.addr(), "dial succeeded");
                            return Ok(conn);
                        }
                        Err(err) => {
                            self.metrics.inc_failures();
                            debug!(%peer, round, %err, "dial round failed");
                            if let DialError::AllAddressesFailed { failures: f, .. } = &err {
                                failures.extend(f.iter().cloned());
                            }
                            if err.is_terminal() {
                                return Err(err);
                            }
                            last = Some(Box::new(err));
                        }
                    }
                }
            }
        }

        warn!(local = %self.local, %peer, attempts, "dial attempts exhausted");
        Err(DialError::Exhausted {
            local: self.local,
            peer,
            attempts,
            failures: failures.into_vec(),
            last,
        })
    }

    /// One dial round. The caller holds the dial lock for `peer`.
    async fn dial_once(&self, peer: PeerId) -> Result<SharedConnection<T>, DialError> {
        if peer == self.local {
            return Err(DialError::SelfDialRejected { peer });
        }

        let keypair = self.peers.keypair(&self.local);
        if keypair.is_none() {
            warn!(local = %self.local, "no local key material, dialing without it");
        }

        let local_addrs = self.listen_addrs();
        let mut own = local_addrs.clone();
        own.extend(self.peers.addresses(&self.local));

        let remote = addrs::subtract(addrs::filter_usable(self.peers.addresses(&peer)), &own);
        if remote.is_empty() {
            debug!(%peer, "no usable addresses");
            return Err(DialError::NoUsableAddresses { peer });
        }

        let raw = self.dial_addrs(peer, local_addrs, keypair, remote).await?;
        self.setup_connection(raw, Direction::Outbound)
    }

    /// Try each address in order; the first authenticated match wins.
    async fn dial_addrs(
        &self,
        peer: PeerId,
        local_addrs: Vec<Multiaddr>,
        keypair: Option<Keypair>,
        remote: Vec<Multiaddr>,
    ) -> Result<T::Connection, DialError> {
        let mut failures = Vec::new();

        for addr in remote {
            let request = DialRequest {
                local: self.local,
                local_addrs: local_addrs.clone(),
                keypair: keypair.clone(),
                peer,
                addr: addr.clone(),
            };

            match self.transport.dial(request).await {
                Ok(conn) => {
                    let remote_peer = conn.remote_peer();
                    if remote_peer == self.local {
                        conn.close();
                        debug!(%peer, %addr, "address leads back to the local peer");
                        failures.push(AttemptFailure::new(addr, "connected to self"));
                    } else if remote_peer != peer {
                        conn.close();
                        debug!(%peer, %addr, %remote_peer, "identity mismatch");
                        failures.push(AttemptFailure::new(
                            addr,
                            format!("identity mismatch: connected to {remote_peer}"),
                        ));
                    } else {
                        return Ok(conn);
                    }
                }
                Err(error) => {
                    debug!(%peer, %addr, %error, "dial attempt failed");
                    failures.push(AttemptFailure::new(addr, error.to_string()));
                }
            }
        }

        Err(DialError::AllAddressesFailed { peer, failures })
    }

    /// Register a connection in the table, closing it if that fails.
    fn setup_connection(
        &self,
        raw: T::Connection,
        direction: Direction,
    ) -> Result<SharedConnection<T>, DialError> {
        let mut conns = self.conns.write();

        if self.is_closed() {
            drop(conns);
            raw.close();
            return Err(DialError::Closed);
        }

        if let Some(limit) = self.config.max_connections() {
            if conns.values().map(Vec::len).sum::<usize>() >= limit {
                drop(conns);
                raw.close();
                debug!(limit, "connection limit reached");
                return Err(DialError::ConnectionLimit { limit });
            }
        }

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let conn = Arc::new(Connection::new(id, raw, direction));
        conns.entry(conn.peer()).or_default().push(Arc::clone(&conn));
        self.metrics
            .set_connections(conns.values().map(Vec::len).sum());

        debug!(peer = %conn.peer(), %id, %direction, "connection established");
        Ok(conn)
    }

    /// Register a connection accepted from a remote dialer.
    pub fn add_inbound(&self, raw: T::Connection) -> Result<SharedConnection<T>, DialError> {
        let peer = raw.remote_peer();
        if peer == self.local {
            raw.close();
            return Err(DialError::SelfDialRejected { peer });
        }
        self.setup_connection(raw, Direction::Inbound)
    }

    /// The oldest open connection to `peer`.
    pub fn connection_to(&self, peer: &PeerId) -> Option<SharedConnection<T>> {
        self.conns
            .read()
            .get(peer)
            .and_then(|list| list.first())
            .cloned()
    }

    /// Every open connection to `peer`.
    pub fn connections_to_peer(&self, peer: &PeerId) -> Vec<SharedConnection<T>> {
        self.conns.read().get(peer).cloned().unwrap_or_default()
    }

    /// Peers with at least one open connection.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.conns.read().keys().copied().collect()
    }

    /// Total number of open connections.
    pub fn connection_count(&self) -> usize {
        self.conns.read().values().map(Vec::len).sum()
    }

    /// Whether a dial to `peer` is currently in flight.
    pub fn is_dialing(&self, peer: &PeerId) -> bool {
        self.dsync.is_dialing(peer)
    }

    /// Close and forget every connection to `peer`. Returns how many were closed.
    pub fn close_peer(&self, peer: &PeerId) -> usize {
        let removed = {
            let mut conns = self.conns.write();
            let removed = conns.remove(peer).unwrap_or_default();
            self.metrics
                .set_connections(conns.values().map(Vec::len).sum());
            removed
        };

        for conn in &removed {
            conn.close();
        }
        if !removed.is_empty() {
            debug!(%peer, count = removed.len(), "closed peer connections");
        }
        removed.len()
    }

    /// Shut down: close every connection and refuse new ones.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<_> = self.conns.write().drain().flat_map(|(_, v)| v).collect();
        self.metrics.set_connections(0);
        for conn in &drained {
            conn.close();
        }
        debug!(local = %self.local, closed = drained.len(), "swarm closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Record an address we listen on; it is never dialed as a remote.
    pub fn add_listen_addr(&self, addr: Multiaddr) {
        let mut addrs = self.listen_addrs.write();
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }

    /// Addresses we listen on.
    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs.read().clone()
    }
}
