use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use cairn_exchange_message::Message;
use cairn_net_dialer::DialError;
use cairn_primitives::PeerId;

/// Errors from a [`Network`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    /// Could not connect to the peer.
    #[error(transparent)]
    Dial(#[from] DialError),

    /// Connected, but delivering the message failed.
    #[error("failed to send to {peer}: {reason}")]
    Send {
        /// Destination peer.
        peer: PeerId,
        /// Transport-level reason.
        reason: String,
    },
}

/// Message delivery to remote peers.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// The local peer.
    fn local_peer(&self) -> PeerId;

    /// Make sure a connection to `peer` exists.
    async fn connect(&self, peer: PeerId) -> Result<(), NetworkError>;

    /// Deliver one message to `peer`, connecting first if needed.
    async fn send_message(&self, peer: PeerId, message: Message) -> Result<(), NetworkError>;
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
    fn local_peer(&self) -> PeerId {
        (**self).local_peer()
    }

    async fn connect(&self, peer: PeerId) -> Result<(), NetworkError> {
        (**self).connect(peer).await
    }

    async fn send_message(&self, peer: PeerId, message: Message) -> Result<(), NetworkError> {
        (**self).send_message(peer, message).await
    }
}

/// A connection able to carry exchange messages.
///
/// Implemented by transport connection types so the dialer's swarm can be
/// used as a [`Network`].
pub trait MessageSink {
    /// Queue one message for delivery.
    fn send_message(&self, message: Message) -> io::Result<()>;
}
