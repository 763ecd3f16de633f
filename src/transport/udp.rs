//! SOAP-over-UDP multicast transport.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{DuplexChannel, Received, Target};
use crate::{Error, Result};

/// The WS-Discovery multicast group.
pub const DISCOVERY_MULTICAST_GROUP: SocketAddrV4 =
    SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 3702);

/// Configuration for a [`UdpChannel`].
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Multicast group and port.
    pub multicast_group: SocketAddrV4,
    /// Local bind address.
    pub bind_addr: SocketAddr,
    /// Whether to join the multicast group (services do, clients need not).
    pub join_multicast: bool,
    /// Interface used for multicast.
    pub interface: Ipv4Addr,
    /// Multicast TTL.
    pub ttl: u32,
    /// Retransmissions after the first send.
    pub repeat: u32,
    /// Delay between retransmissions.
    pub repeat_delay: Duration,
    /// Largest datagram accepted or sent.
    pub max_datagram: usize,
    /// Inbound queue length.
    pub queue: usize,
}

impl UdpConfig {
    /// Listen on the discovery port and join the group.
    pub fn service() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DISCOVERY_MULTICAST_GROUP.port())),
            join_multicast: true,
            ..Self::client()
        }
    }

    /// Bind an ephemeral port; responses arrive by unicast.
    pub fn client() -> Self {
        Self {
            multicast_group: DISCOVERY_MULTICAST_GROUP,
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            join_multicast: false,
            interface: Ipv4Addr::UNSPECIFIED,
            ttl: 1,
            repeat: 1,
            repeat_delay: Duration::from_millis(50),
            max_datagram: 65_507,
            queue: 256,
        }
    }

    /// Set the multicast interface.
    pub fn interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = interface;
        self
    }

    /// Set the local bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the multicast TTL.
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the retransmission count and delay.
    pub fn repeat(mut self, repeat: u32, delay: Duration) -> Self {
        self.repeat = repeat;
        self.repeat_delay = delay;
        self
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self::client()
    }
}

fn open_socket(config: &UdpConfig) -> Result<UdpSocket> {
    let socket = Socket::new(
        Domain::for_address(config.bind_addr),
        Type::DGRAM,
        Some(Protocol::UDP),
    )?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&config.bind_addr.into())?;
    socket.set_multicast_ttl_v4(config.ttl)?;
    socket.set_multicast_loop_v4(true)?;
    if !config.interface.is_unspecified() {
        socket.set_multicast_if_v4(&config.interface)?;
    }
    if config.join_multicast {
        socket.join_multicast_v4(config.multicast_group.ip(), &config.interface)?;
    }
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Bind a UDP channel and start its receive loop.
pub async fn bind(config: UdpConfig) -> Result<(UdpChannel, mpsc::Receiver<Received>)> {
    let socket = Arc::new(open_socket(&config)?);
    let local_addr = socket.local_addr()?;
    let (tx, rx) = mpsc::channel(config.queue.max(1));

    let recv_socket = socket.clone();
    let max_datagram = config.max_datagram;
    let span = tracing::debug_span!("udp_recv", local = %local_addr);
    let recv_task = tokio::spawn(
        async move {
            let mut buf = vec![0u8; max_datagram];
            loop {
                let (len, from) = match recv_socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::error!("udp receive failed: {e}");
                        break;
                    }
                };
                let message = match std::str::from_utf8(&buf[..len]) {
                    Ok(text) => text.to_string(),
                    Err(_) => {
                        tracing::debug!(%from, len, "dropping non-UTF-8 datagram");
                        continue;
                    }
                };
                if tx.send(Received { message, from }).await.is_err() {
                    tracing::debug!("udp receiver dropped, stopping");
                    break;
                }
            }
        }
        .instrument(span),
    );

    tracing::debug!(
        local = %local_addr,
        group = %config.multicast_group,
        joined = config.join_multicast,
        "udp channel bound"
    );

    Ok((
        UdpChannel {
            socket,
            local_addr,
            group: SocketAddr::V4(config.multicast_group),
            repeat: config.repeat,
            repeat_delay: config.repeat_delay,
            max_datagram,
            recv_task,
        },
        rx,
    ))
}

/// A bound UDP socket. The receive loop stops when the channel is dropped.
#[derive(Debug)]
pub struct UdpChannel {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    group: SocketAddr,
    repeat: u32,
    repeat_delay: Duration,
    max_datagram: usize,
    recv_task: JoinHandle<()>,
}

impl UdpChannel {
    /// The bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl DuplexChannel for UdpChannel {
    async fn send(&self, message: &str, target: Target) -> Result<()> {
        if message.len() > self.max_datagram {
            return Err(Error::transport(format!(
                "message of {} bytes exceeds datagram limit {}",
                message.len(),
                self.max_datagram
            )));
        }
        let addr = match target {
            Target::Multicast => self.group,
            Target::Peer(addr) => addr,
        };
        for attempt in 0..=self.repeat {
            if attempt > 0 {
                tokio::time::sleep(self.repeat_delay).await;
            }
            self.socket.send_to(message.as_bytes(), addr).await?;
        }
        tracing::trace!(to = %addr, bytes = message.len(), "datagram sent");
        Ok(())
    }
}

impl Drop for UdpChannel {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}
