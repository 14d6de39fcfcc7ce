#[cfg(test)]
mod endpoint_test;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use log::{info, warn};
use tokio::sync::mpsc;
use tokio::sync::Notify;
use util::Conn;

/// At most this many records may sit in the adapter between the ICE read
/// path and the DTLS engine.
pub(crate) const MAX_PENDING_PACKETS: usize = 2;
/// Largest DTLS datagram the adapter accepts.
pub(crate) const MAX_DTLS_PACKET_LEN: usize = 2048;

/// Stream-like adapter between the ICE channel and the DTLS engine: the
/// demux feeds received records in with [`IceEndpoint::feed`], engine reads
/// drain the bounded queue, and engine writes are forwarded to the ICE
/// channel through `outbound`.
pub struct IceEndpoint {
    queue: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    closed: AtomicBool,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl IceEndpoint {
    pub fn new(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
    ) -> Self {
        IceEndpoint {
            queue: Mutex::new(VecDeque::with_capacity(MAX_PENDING_PACKETS)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            outbound,
            local_addr,
            peer_addr,
        }
    }

    /// Queues one received datagram for the engine. Oversized or overflow
    /// datagrams are dropped; DTLS retransmits.
    pub fn feed(&self, data: &[u8]) -> bool {
        if data.len() > MAX_DTLS_PACKET_LEN {
            warn!("dropping oversized DTLS datagram ({} bytes)", data.len());
            return false;
        }
        {
            let mut queue = self.queue.lock().expect("endpoint queue poisoned");
            if !queue.is_empty() {
                info!("packet already in DTLS buffer queue");
            }
            if queue.len() >= MAX_PENDING_PACKETS {
                warn!("failed to write packet to DTLS buffer queue");
                return false;
            }
            queue.push_back(data.to_vec());
        }
        self.notify.notify_one();
        true
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl Conn for IceEndpoint {
    async fn connect(&self, _addr: SocketAddr) -> util::Result<()> {
        Err(util::Error::Other("not applicable".to_owned()))
    }

    async fn recv(&self, buf: &mut [u8]) -> util::Result<usize> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(util::Error::Other("endpoint closed".to_owned()));
            }
            {
                let mut queue = self.queue.lock().expect("endpoint queue poisoned");
                if let Some(data) = queue.pop_front() {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    return Ok(len);
                }
            }
            self.notify.notified().await;
        }
    }

    async fn recv_from(&self, buf: &mut [u8]) -> util::Result<(usize, SocketAddr)> {
        let n = self.recv(buf).await?;
        Ok((n, self.peer_addr))
    }

    async fn send(&self, buf: &[u8]) -> util::Result<usize> {
        self.outbound
            .send(buf.to_vec())
            .map_err(|_| util::Error::Other("ice channel gone".to_owned()))?;
        Ok(buf.len())
    }

    async fn send_to(&self, buf: &[u8], _target: SocketAddr) -> util::Result<usize> {
        self.send(buf).await
    }

    fn local_addr(&self) -> util::Result<SocketAddr> {
        Ok(self.local_addr)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.peer_addr)
    }

    async fn close(&self) -> util::Result<()> {
        IceEndpoint::close(self);
        Ok(())
    }
}

impl IceEndpoint {
    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync) {
        self
    }
}
