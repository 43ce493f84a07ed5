//! Blocking remote-call client on top of [KadSocket].

mod socket;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use tracing::trace;

use crate::messages::{RequestSpecific, RequestTypeSpecific, ResponseSpecific};

pub use socket::KadSocket;

/// A remote call that was dispatched but did not complete normally.
#[derive(thiserror::Error, Debug)]
pub enum RemoteCallError {
    /// No response arrived within the configured request timeout.
    #[error("request to {0} timed out")]
    Timeout(SocketAddr),

    /// The remote node answered with a protocol error.
    #[error("remote error {code}: {description}")]
    Remote { code: i32, description: String },

    /// The request could not be encoded or sent.
    #[error("failed to send request: {0}")]
    Send(#[from] crate::Error),
}

pub type CallResult = Result<ResponseSpecific, RemoteCallError>;

/// Performs a single named call against a destination endpoint, blocking
/// until a typed response, a remote error, or a timeout.
///
/// Every lookup and handler is written against this trait so tests can
/// substitute scripted peers.
pub trait RpcClient: Send + Sync {
    fn call(&self, address: SocketAddr, request: RequestTypeSpecific) -> CallResult;
}

/// The production [RpcClient]: correlates responses to inflight requests by
/// transaction id.
///
/// Sending happens on the caller's thread; the owning node's serve loop
/// feeds incoming responses back through [Rpc::route_response].
#[derive(Debug)]
pub struct Rpc {
    socket: KadSocket,
    source: String,
    request_timeout: Duration,
    inflight: Mutex<HashMap<u16, flume::Sender<CallResult>>>,
}

impl Rpc {
    /// `source` is the canonical endpoint stamped on every outgoing request,
    /// so callees can insert us into their routing tables.
    pub fn new(socket: KadSocket, source: String, request_timeout: Duration) -> Self {
        Rpc {
            socket,
            source,
            request_timeout,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    // === Getters ===

    pub fn socket(&self) -> &KadSocket {
        &self.socket
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    // === Public Methods ===

    /// Routes an incoming response (or remote error) to the call waiting on
    /// its transaction id. Unknown ids are dropped; they belong to calls
    /// that already timed out.
    pub(crate) fn route_response(&self, transaction_id: u16, result: CallResult) {
        let sender = self
            .inflight
            .lock()
            .expect("rpc inflight lock poisoned")
            .remove(&transaction_id);

        match sender {
            Some(sender) => {
                let _ = sender.send(result);
            }
            None => {
                trace!(transaction_id, "response for unknown transaction id");
            }
        }
    }
}

impl RpcClient for Rpc {
    fn call(&self, address: SocketAddr, request: RequestTypeSpecific) -> CallResult {
        let transaction_id = self.socket.next_tid();
        let (sender, receiver) = flume::bounded(1);

        // Register before sending, so a fast reply can't race the insert.
        self.inflight
            .lock()
            .expect("rpc inflight lock poisoned")
            .insert(transaction_id, sender);

        let request = RequestSpecific {
            source: self.source.clone(),
            request_type: request,
        };

        if let Err(error) = self.socket.request(address, transaction_id, request) {
            self.inflight
                .lock()
                .expect("rpc inflight lock poisoned")
                .remove(&transaction_id);

            return Err(error.into());
        }

        match receiver.recv_timeout(self.request_timeout) {
            Ok(result) => result,
            Err(_) => {
                self.inflight
                    .lock()
                    .expect("rpc inflight lock poisoned")
                    .remove(&transaction_id);

                Err(RemoteCallError::Timeout(address))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::messages::AckResponseArguments;

    fn rpc(timeout: Duration) -> Rpc {
        let socket = KadSocket::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        let source = socket.local_addr().to_string();

        Rpc::new(socket, source, timeout)
    }

    #[test]
    fn call_times_out_without_a_responder() {
        let rpc = rpc(Duration::from_millis(100));

        // Nothing is listening there.
        let dead: SocketAddr = "127.0.0.1:1".parse().unwrap();

        assert!(matches!(
            rpc.call(dead, RequestTypeSpecific::Ping),
            Err(RemoteCallError::Timeout(_))
        ));
    }

    #[test]
    fn routed_response_completes_the_call() {
        let rpc = std::sync::Arc::new(rpc(Duration::from_secs(2)));
        let local = rpc.local_addr();

        let router = rpc.clone();
        let handle = std::thread::spawn(move || {
            // The first allocated transaction id is 0.
            std::thread::sleep(Duration::from_millis(50));
            router.route_response(
                0,
                Ok(ResponseSpecific::Ack(AckResponseArguments {
                    responder: local.to_string(),
                })),
            );
        });

        let result = rpc.call(local, RequestTypeSpecific::Ping);

        handle.join().unwrap();
        assert!(matches!(result, Ok(ResponseSpecific::Ack(_))));
    }

    #[test]
    fn late_response_is_dropped() {
        let rpc = rpc(Duration::from_millis(50));

        // No call registered id 42; routing must be a no-op.
        rpc.route_response(
            42,
            Ok(ResponseSpecific::Ack(AckResponseArguments {
                responder: "127.0.0.1:1".to_string(),
            })),
        );
    }
}
