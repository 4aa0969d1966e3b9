//! Shared half-duplex radio channel.
//!
//! Every frame sent is heard by every other node on the channel. Frames are
//! opaque here; the codec lives in `buoy-proto`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Largest frame on air, legacy Status plus headroom.
const MAX_FRAME: usize = 64;

pub trait Radio {
    /// Broadcast one frame to the channel.
    fn send(&mut self, frame: &[u8]) -> impl Future<Output = Result<()>>;

    /// Next frame from another node, or `None` once `timeout` passes.
    fn recv(&mut self, timeout: Duration) -> impl Future<Output = Result<Option<Vec<u8>>>>;
}

/// The channel emulated over UDP: each datagram is one frame, fanned out to
/// every peer address.
pub struct UdpRadio {
    socket: UdpSocket,
    local: SocketAddr,
    peers: Vec<SocketAddr>,
    buf: [u8; MAX_FRAME],
}

impl UdpRadio {
    pub async fn bind(addr: SocketAddr, channel: &[SocketAddr]) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("bind radio socket {}", addr))?;
        let local = socket.local_addr()?;
        let peers: Vec<_> = channel.iter().copied().filter(|p| *p != local).collect();
        debug!(%local, peers = peers.len(), "udp radio up");
        Ok(Self { socket, local, peers, buf: [0; MAX_FRAME] })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

impl Radio for UdpRadio {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        for peer in &self.peers {
            self.socket
                .send_to(frame, peer)
                .await
                .with_context(|| format!("send to {}", peer))?;
        }
        trace!(len = frame.len(), peers = self.peers.len(), "tx");
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut self.buf)).await {
            Err(_) => Ok(None),
            Ok(res) => {
                let (n, from) = res.context("radio recv")?;
                trace!(len = n, %from, "rx");
                Ok(Some(self.buf[..n].to_vec()))
            }
        }
    }
}

/// In-process channel for simulations and tests.
#[derive(Clone)]
pub struct MemoryChannel {
    tx: broadcast::Sender<(usize, Vec<u8>)>,
    next: std::sync::Arc<AtomicUsize>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx, next: Default::default() }
    }

    pub fn join(&self) -> MemoryRadio {
        MemoryRadio {
            me: self.next.fetch_add(1, Ordering::Relaxed),
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MemoryRadio {
    me: usize,
    tx: broadcast::Sender<(usize, Vec<u8>)>,
    rx: broadcast::Receiver<(usize, Vec<u8>)>,
}

impl Radio for MemoryRadio {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        // No subscribers is just an empty channel.
        let _ = self.tx.send((self.me, frame.to_vec()));
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_) => return Ok(None),
                Ok(Ok((from, frame))) if from != self.me => return Ok(Some(frame)),
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    warn!(node = self.me, missed = n, "radio overrun");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => bail!("radio channel closed"),
            }
        }
    }
}
