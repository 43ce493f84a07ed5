//! UDP socket layer managing incoming/outgoing messages.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tracing::{debug, trace};

use crate::messages::{ErrorSpecific, Message, MessageType, RequestSpecific, ResponseSpecific};
use crate::Result;

const MTU: usize = 2048;

/// How long `recv_from` blocks before returning, so the serve loop can
/// observe a shutdown request between packets.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// A UdpSocket wrapper that frames and correlates Kademlia requests and
/// responses.
#[derive(Debug)]
pub struct KadSocket {
    socket: UdpSocket,
    next_tid: AtomicU16,
    local_addr: SocketAddr,
}

impl KadSocket {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            next_tid: AtomicU16::new(0),
            local_addr,
        })
    }

    // === Getters ===

    /// Returns the address this socket is listening on.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    // === Public Methods ===

    /// Allocates the next transaction id.
    pub(crate) fn next_tid(&self) -> u16 {
        // Wrapping; the request timeout is short enough that 65536 ids
        // cannot be simultaneously inflight.
        self.next_tid.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request to the given address.
    pub fn request(
        &self,
        address: SocketAddr,
        transaction_id: u16,
        request: RequestSpecific,
    ) -> Result<()> {
        let message = Message {
            transaction_id,
            message_type: MessageType::Request(request),
        };
        trace!(context = "socket_message_sending", ?message);

        self.send(address, message)
    }

    /// Send a response to the given address.
    pub fn response(&self, address: SocketAddr, transaction_id: u16, response: ResponseSpecific) {
        let message = Message {
            transaction_id,
            message_type: MessageType::Response(response),
        };
        trace!(context = "socket_message_sending", ?message);

        let _ = self.send(address, message).map_err(|e| {
            debug!(?e, "Error sending response message");
        });
    }

    /// Send an error to the given address.
    pub fn error(&self, address: SocketAddr, transaction_id: u16, error: ErrorSpecific) {
        let message = Message {
            transaction_id,
            message_type: MessageType::Error(error),
        };

        let _ = self.send(address, message).map_err(|e| {
            debug!(?e, "Error sending error message");
        });
    }

    /// Receives a single message on the socket.
    /// On success, returns the message and its origin.
    pub fn recv_from(&self) -> Option<(Message, SocketAddr)> {
        let mut buf = [0u8; MTU];

        match self.socket.recv_from(&mut buf) {
            Ok((amt, from)) => {
                if from.port() == 0 {
                    trace!(
                        context = "socket_validation",
                        message = "Message from port 0"
                    );
                    return None;
                }

                match Message::from_bytes(&buf[..amt]) {
                    Ok(message) => {
                        trace!(context = "socket_message_receiving", ?message, ?from);
                        Some((message, from))
                    }
                    Err(error) => {
                        trace!(
                            context = "socket_error",
                            ?error,
                            ?from,
                            message = ?String::from_utf8_lossy(&buf[..amt]),
                            "Received invalid bencode message."
                        );
                        None
                    }
                }
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                None
            }
            Err(e) => {
                trace!(context = "socket_error", ?e, "recv_from failed unexpectedly");
                None
            }
        }
    }

    // === Private Methods ===

    fn send(&self, address: SocketAddr, message: Message) -> Result<()> {
        self.socket.send_to(&message.to_bytes()?, address)?;
        Ok(())
    }
}
