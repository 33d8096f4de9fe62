//! Ingress receiver - UDP datagrams to owned payloads.
//!
//! One thread, one job: move bytes from the kernel into the input channel
//! as fast as possible. Parsing happens downstream on the processing
//! thread. Delivery is best-effort UDP; nothing is acknowledged.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::config::MAX_PACKET_SIZE;

pub struct UdpReceiver {
    socket: UdpSocket,
    running: Arc<AtomicBool>,
}

/// Unblocks a receiver that is parked inside `recv_from`.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl UdpReceiver {
    /// Bind the ingress socket on any local address.
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        Ok(Self {
            socket,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stop_handle(&self) -> io::Result<StopHandle> {
        let port = self.socket.local_addr()?.port();
        Ok(StopHandle {
            running: Arc::clone(&self.running),
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        })
    }

    /// Receive loop. One datagram carries one command line; the payload is
    /// copied out of the scratch buffer and handed to the input channel.
    /// Runs until the stop handle fires or the consumer goes away.
    pub fn run(self, tx: Sender<Vec<u8>>) {
        let mut scratch = [0u8; MAX_PACKET_SIZE];

        while self.running.load(Ordering::Acquire) {
            match self.socket.recv_from(&mut scratch) {
                Ok((len, _peer)) => {
                    // Zero-length datagrams are wake-ups, not commands.
                    if len == 0 {
                        continue;
                    }
                    if tx.send(scratch[..len].to_vec()).is_err() {
                        break; // processing thread is gone
                    }
                }
                Err(err) if self.running.load(Ordering::Acquire) => {
                    tracing::warn!(%err, "udp receive failed");
                }
                Err(_) => break,
            }
        }
        // Dropping `tx` here is the termination signal for the parser.
    }
}

impl StopHandle {
    /// Cooperative stop: flip the flag, then fire an empty datagram at the
    /// bound port so a pending receive returns and observes it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Ok(waker) = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)) {
            let _ = waker.send_to(&[], self.addr);
        }
    }
}
