//! Message channels.
//!
//! Ad-hoc discovery runs over a [`DuplexChannel`]: one-way datagrams, sent to
//! the multicast group or to a single peer, with inbound traffic delivered as
//! [`Received`] values on a separate receiver. Managed discovery runs over a
//! [`RequestReplyChannel`] where every request yields at most one reply.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::Result;

pub mod memory;
#[cfg(feature = "udp")]
pub mod udp;

/// An inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Message text.
    pub message: String,
    /// Sender address; replies go back here.
    pub from: SocketAddr,
}

/// Destination of an outbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every member of the multicast group.
    Multicast,
    /// A single peer.
    Peer(SocketAddr),
}

/// A one-way datagram channel.
#[async_trait]
pub trait DuplexChannel: Send + Sync + 'static {
    /// Send a message.
    async fn send(&self, message: &str, target: Target) -> Result<()>;
}

/// A request-response channel.
#[async_trait]
pub trait RequestReplyChannel: Send + Sync + 'static {
    /// Send a request and wait for the reply, if any.
    async fn request(&self, message: String) -> Result<Option<String>>;
}
