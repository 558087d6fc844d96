//! Collaborator interfaces consumed by the dialer.

use std::io;

use cairn_primitives::{Multiaddr, PeerId};
use futures::future::BoxFuture;
use libp2p::identity::Keypair;

/// Address book lookups.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait PeerBook: Send + Sync {
    /// Known addresses for `peer`, in preference order.
    fn addresses(&self, peer: &PeerId) -> Vec<Multiaddr>;

    /// Key material for `peer`, if held. Only ever present for the local peer.
    fn keypair(&self, peer: &PeerId) -> Option<Keypair>;
}

/// Everything a transport needs to open one outbound connection.
#[derive(Debug, Clone)]
pub struct DialRequest {
    /// Local peer identity.
    pub local: PeerId,
    /// Local addresses the transport may bind from.
    pub local_addrs: Vec<Multiaddr>,
    /// Local key used to secure the connection; `None` dials unsecured.
    pub keypair: Option<Keypair>,
    /// Identity the remote end is expected to prove.
    pub peer: PeerId,
    /// Address to dial.
    pub addr: Multiaddr,
}

/// An authenticated connection produced by a [`Transport`].
pub trait RawConnection: Send + Sync + 'static {
    /// Identity the remote end proved during the secure handshake.
    fn remote_peer(&self) -> PeerId;

    /// Address the connection was made on.
    fn remote_addr(&self) -> Multiaddr;

    /// Close the connection. Idempotent.
    fn close(&self);
}

/// Secure transport dialer.
///
/// Given an address and an expected identity, returns an authenticated
/// connection or an I/O error. The returned future owns everything it needs so
/// the swarm can bound it with a timeout.
#[auto_impl::auto_impl(Arc, Box)]
pub trait Transport: Send + Sync + 'static {
    /// Connection type produced by this transport.
    type Connection: RawConnection;

    /// Open a connection as described by `request`.
    fn dial(&self, request: DialRequest) -> BoxFuture<'static, io::Result<Self::Connection>>;
}
