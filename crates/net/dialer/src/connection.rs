//! Tracked connections.

use core::fmt;

use cairn_primitives::{Multiaddr, PeerId};
use web_time::Instant;

use crate::RawConnection;

/// Swarm-local connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    /// We dialed.
    Outbound,
    /// The remote dialed us.
    Inbound,
}

/// A connection registered in the swarm's connection table.
pub struct Connection<C> {
    id: ConnectionId,
    peer: PeerId,
    addr: Multiaddr,
    direction: Direction,
    established: Instant,
    inner: C,
}

impl<C: RawConnection> Connection<C> {
    pub(crate) fn new(id: ConnectionId, inner: C, direction: Direction) -> Self {
        Self {
            id,
            peer: inner.remote_peer(),
            addr: inner.remote_addr(),
            direction,
            established: Instant::now(),
            inner,
        }
    }

    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote peer.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Remote address.
    pub fn addr(&self) -> &Multiaddr {
        &self.addr
    }

    /// Which side opened it.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// When the swarm registered it.
    pub fn established(&self) -> Instant {
        self.established
    }

    /// The transport connection.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub(crate) fn close(&self) {
        self.inner.close();
    }
}

impl<C> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("addr", &self.addr)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}
