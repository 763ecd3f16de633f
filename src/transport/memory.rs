//! In-process transports.
//!
//! [`MemoryNetwork`] behaves like a multicast segment: each member gets a
//! synthetic loopback address, multicast reaches every other member and
//! datagrams to full or unknown receivers are lost. [`LoopbackRequestChannel`]
//! connects a managed client directly to a [`ServiceHost`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{DuplexChannel, Received, RequestReplyChannel, Target};
use crate::service::ServiceHost;
use crate::Result;

const FIRST_PORT: u16 = 49152;
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug)]
struct NetworkState {
    next_host: u8,
    next_port: u16,
    members: HashMap<SocketAddr, mpsc::Sender<Received>>,
}

impl NetworkState {
    /// Next address not held by a live member. Ports run from `FIRST_PORT`
    /// upward; when they wrap, allocation moves on to the next 127.0.0.x host.
    fn allocate(&mut self) -> SocketAddr {
        loop {
            let addr = SocketAddr::from(([127, 0, 0, self.next_host], self.next_port));
            match self.next_port.checked_add(1) {
                Some(port) => self.next_port = port,
                None => {
                    self.next_port = FIRST_PORT;
                    self.next_host = self.next_host % 254 + 1;
                }
            }
            if !self.members.contains_key(&addr) {
                return addr;
            }
        }
    }
}

/// A simulated multicast segment.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
    capacity: usize,
}

impl MemoryNetwork {
    /// An empty network.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// An empty network whose members buffer at most `capacity` datagrams.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState {
                next_host: 1,
                next_port: FIRST_PORT,
                members: HashMap::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    /// Join the network, returning the send side and the inbound receiver.
    pub fn join(&self) -> (MemoryChannel, mpsc::Receiver<Received>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut state = self.state.lock();
        let addr = state.allocate();
        state.members.insert(addr, tx);
        tracing::trace!(%addr, "joined memory network");
        (
            MemoryChannel {
                network: self.clone(),
                addr,
            },
            rx,
        )
    }

    /// Number of current members.
    pub fn len(&self) -> usize {
        self.state.lock().members.len()
    }

    /// Whether nobody has joined.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deliver(&self, from: SocketAddr, message: &str, target: Target) {
        let mut state = self.state.lock();
        let recipients: Vec<SocketAddr> = match target {
            Target::Multicast => state
                .members
                .keys()
                .copied()
                .filter(|addr| *addr != from)
                .collect(),
            Target::Peer(addr) => vec![addr],
        };

        for addr in recipients {
            let Some(tx) = state.members.get(&addr) else {
                tracing::trace!(%from, to = %addr, "no such peer, datagram lost");
                continue;
            };
            let datagram = Received {
                message: message.to_string(),
                from,
            };
            match tx.try_send(datagram) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(%from, to = %addr, "receiver full, datagram lost");
                }
                Err(TrySendError::Closed(_)) => {
                    state.members.remove(&addr);
                }
            }
        }
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Send side of a [`MemoryNetwork`] member. Leaves the network on drop.
#[derive(Debug)]
pub struct MemoryChannel {
    network: MemoryNetwork,
    addr: SocketAddr,
}

impl MemoryChannel {
    /// This member's synthetic address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl DuplexChannel for MemoryChannel {
    async fn send(&self, message: &str, target: Target) -> Result<()> {
        self.network.deliver(self.addr, message, target);
        Ok(())
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.network.state.lock().members.remove(&self.addr);
    }
}

/// A request channel answered in-process by a [`ServiceHost`].
#[derive(Clone)]
pub struct LoopbackRequestChannel {
    host: Arc<ServiceHost>,
}

impl LoopbackRequestChannel {
    /// Route requests to `host`.
    pub fn new(host: Arc<ServiceHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl RequestReplyChannel for LoopbackRequestChannel {
    async fn request(&self, message: String) -> Result<Option<String>> {
        self.host.handle_request(&message).await
    }
}
