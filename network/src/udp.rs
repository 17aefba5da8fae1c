//! UDP socket service.
//!
//! One task owns the socket's receive half and feeds a fixed-capacity ring
//! of datagram slots; `packet_threads` worker tasks drain the ring, parse,
//! and dispatch. When producers outrun consumers the oldest unserviced
//! datagram is dropped — under flood, stale packets are worth the least.

use std::collections::VecDeque;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tokio::sync::Notify;

use keva_messages::MAX_SAFE_UDP_MESSAGE_SIZE;

/// Pre-allocated receive ring capacity.
pub const RECEIVE_BUFFER_SLOTS: usize = 512;

/// One received datagram.
#[derive(Clone, Debug)]
pub struct Datagram {
    pub from: SocketAddrV6,
    pub bytes: Vec<u8>,
}

/// Bounded multi-producer/multi-consumer ring with drop-oldest overflow.
pub struct DatagramQueue {
    slots: Mutex<VecDeque<Datagram>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl DatagramQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue, evicting the oldest entry when full.
    pub fn push(&self, datagram: Datagram) {
        {
            let mut slots = self.slots.lock().unwrap();
            if slots.len() == self.capacity {
                slots.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            slots.push_back(datagram);
        }
        self.notify.notify_one();
    }

    /// Dequeue, waiting until an entry arrives or `stopped` is set.
    pub async fn pop(&self, stopped: &AtomicBool) -> Option<Datagram> {
        loop {
            // Arm the waiter before checking so a push between the check and
            // the await still wakes us.
            let notified = self.notify.notified();
            if let Some(datagram) = self.slots.lock().unwrap().pop_front() {
                return Some(datagram);
            }
            if stopped.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Wake every waiter (used at shutdown).
    pub fn notify_all(&self) {
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Normalize any socket address to IPv6 (mapping IPv4).
pub fn to_v6(addr: SocketAddr) -> SocketAddrV6 {
    match addr {
        SocketAddr::V6(v6) => v6,
        SocketAddr::V4(v4) => SocketAddrV6::new(v4.ip().to_ipv6_mapped(), v4.port(), 0, 0),
    }
}

/// The node's UDP socket plus its receive ring.
pub struct UdpChannels {
    socket: UdpSocket,
    pub queue: Arc<DatagramQueue>,
}

impl UdpChannels {
    /// Bind the node socket on `port` (dual-stack v6 wildcard).
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, port)).await?;
        Ok(Self {
            socket,
            queue: Arc::new(DatagramQueue::new(RECEIVE_BUFFER_SLOTS)),
        })
    }

    pub fn local_port(&self) -> u16 {
        self.socket.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    /// Receive datagrams into the ring until `stopped` is set.
    pub async fn run_receiver(&self, stopped: Arc<AtomicBool>) {
        let mut buffer = [0u8; MAX_SAFE_UDP_MESSAGE_SIZE + 1];
        while !stopped.load(Ordering::Acquire) {
            match self.socket.recv_from(&mut buffer).await {
                Ok((len, from)) => {
                    self.queue.push(Datagram {
                        from: to_v6(from),
                        bytes: buffer[..len].to_vec(),
                    });
                }
                Err(err) => {
                    tracing::debug!(%err, "udp receive failed");
                }
            }
        }
        self.queue.notify_all();
    }

    /// Fire-and-forget send; UDP loss is expected and uncounted here.
    pub async fn send(&self, bytes: &[u8], to: SocketAddrV6) {
        if let Err(err) = self.socket.send_to(bytes, to).await {
            tracing::debug!(%to, %err, "udp send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datagram(byte: u8) -> Datagram {
        Datagram {
            from: SocketAddrV6::new(Ipv6Addr::LOCALHOST, 54000, 0, 0),
            bytes: vec![byte],
        }
    }

    #[tokio::test]
    async fn push_pop_in_order() {
        let queue = DatagramQueue::new(4);
        let stopped = AtomicBool::new(false);
        queue.push(datagram(1));
        queue.push(datagram(2));
        assert_eq!(queue.pop(&stopped).await.unwrap().bytes, vec![1]);
        assert_eq!(queue.pop(&stopped).await.unwrap().bytes, vec![2]);
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let queue = DatagramQueue::new(2);
        let stopped = AtomicBool::new(false);
        queue.push(datagram(1));
        queue.push(datagram(2));
        queue.push(datagram(3));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop(&stopped).await.unwrap().bytes, vec![2]);
        assert_eq!(queue.pop(&stopped).await.unwrap().bytes, vec![3]);
    }

    #[tokio::test]
    async fn pop_returns_none_when_stopped() {
        let queue = Arc::new(DatagramQueue::new(2));
        let stopped = Arc::new(AtomicBool::new(true));
        assert!(queue.pop(&stopped).await.is_none());
    }

    #[tokio::test]
    async fn socket_send_receive_loopback() {
        let a = UdpChannels::bind(0).await.unwrap();
        let b = UdpChannels::bind(0).await.unwrap();
        let stopped = Arc::new(AtomicBool::new(false));

        let b_queue = b.queue.clone();
        let b = Arc::new(b);
        let receiver = {
            let b = b.clone();
            let stopped = stopped.clone();
            tokio::spawn(async move { b.run_receiver(stopped).await })
        };

        let to = SocketAddrV6::new(Ipv6Addr::LOCALHOST, b.local_port(), 0, 0);
        a.send(b"hello", to).await;

        let got = b_queue.pop(&stopped).await.unwrap();
        assert_eq!(got.bytes, b"hello");

        stopped.store(true, Ordering::Release);
        receiver.abort();
    }

    #[test]
    fn v4_addresses_normalized() {
        let v4: SocketAddr = "127.0.0.1:54000".parse().unwrap();
        let v6 = to_v6(v4);
        assert_eq!(v6.port(), 54000);
        assert!(v6.ip().to_ipv4_mapped().is_some());
    }
}
