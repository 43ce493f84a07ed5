//! A Kademlia node: one UDP socket, a routing table, a local store, and a
//! serve loop answering the four remote operations.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::common::{Contact, Id, KvEntry, KvStore, RoutingTable};
use crate::messages::{
    AckResponseArguments, ErrorSpecific, MessageType, NodesResponseArguments, RequestSpecific,
    RequestTypeSpecific, ResponseSpecific, ValueResponseArguments,
};
use crate::rpc::{KadSocket, RemoteCallError, Rpc, RpcClient};
use crate::{Config, Result};

/// Protocol error code returned to callers whose request cannot be served,
/// for example a source endpoint no identifier can be derived from.
const ERROR_CODE_BAD_REQUEST: i32 = 203;

/// A running Kademlia node.
///
/// Cheap to clone; all clones drive the same underlying node.
#[derive(Debug, Clone)]
pub struct Node(pub(crate) Arc<NodeInner>);

#[derive(Debug)]
pub(crate) struct NodeInner {
    id: Id,
    addr: SocketAddr,
    config: Config,
    pub(crate) routing_table: Mutex<RoutingTable>,
    pub(crate) store: Mutex<KvStore>,
    pub(crate) rpc: Arc<Rpc>,
    shutdown: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Binds a UDP socket, derives this node's identifier from its canonical
    /// endpoint, and starts the serve loop.
    pub fn bind(config: Config) -> Result<Node> {
        let socket = KadSocket::bind(config.bind_addr)?;

        let addr = config.public_addr.unwrap_or_else(|| socket.local_addr());
        let id = Id::from_endpoint(&addr);

        let rpc = Arc::new(Rpc::new(socket, addr.to_string(), config.request_timeout));

        let inner = Arc::new(NodeInner {
            id,
            addr,
            routing_table: Mutex::new(RoutingTable::new(id, config.k)),
            store: Mutex::new(KvStore::new()),
            rpc: rpc.clone(),
            config,
            shutdown: AtomicBool::new(false),
            handle: Mutex::new(None),
        });

        let serve_inner = Arc::downgrade(&inner);
        let handle = std::thread::spawn(move || serve(serve_inner, rpc));

        *inner.handle.lock().expect("node handle lock poisoned") = Some(handle);

        info!(?id, %addr, "Node listening");

        Ok(Node(inner))
    }

    // === Getters ===

    /// This node's identifier, the SHA-1 digest of its canonical endpoint.
    pub fn id(&self) -> Id {
        self.0.id
    }

    /// The canonical endpoint the identifier was derived from.
    pub fn addr(&self) -> SocketAddr {
        self.0.addr
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    // === Public Methods ===

    /// Checks liveness of the node at `address`.
    ///
    /// A positive reply inserts the responder into the routing table.
    pub fn ping(&self, address: SocketAddr) -> bool {
        match self.0.rpc.call(address, RequestTypeSpecific::Ping) {
            Ok(ResponseSpecific::Ack(args)) => {
                if let Ok(contact) = Contact::from_endpoint(&args.responder) {
                    self.0.table().add(contact);
                }
                true
            }
            Ok(response) => {
                debug!(?response, %address, "Unexpected ping response");
                false
            }
            Err(error) => {
                debug!(?error, %address, "Ping failed");
                false
            }
        }
    }

    /// Joins the network through a known node: pings it, then walks towards
    /// this node's own identifier to populate the routing table.
    ///
    /// Returns `false` if the bootstrap node did not respond.
    pub fn bootstrap(&self, address: SocketAddr) -> bool {
        if !self.ping(address) {
            return false;
        }

        let own_id = self.id();
        self.iterative_find_node(&own_id);

        true
    }

    /// Stores a value in this node's own store, marking it as published here.
    pub fn store_local(&self, key: String, value: Bytes) {
        self.0.kv().put(key, value, true);
    }

    /// Snapshot of the local store, for inspection.
    pub fn store_entries(&self) -> Vec<KvEntry> {
        self.0.kv().entries()
    }

    /// Looks up a contact already known to the routing table.
    pub fn contact_by_id(&self, id: &Id) -> Option<Contact> {
        self.0.table().contact(id)
    }

    /// Snapshot of the routing table, for inspection.
    pub fn routing_contacts(&self) -> Vec<Contact> {
        self.0.table().contacts()
    }

    /// Stops the serve loop and waits for it to exit.
    pub fn shutdown(&self) {
        self.0.shutdown.store(true, Ordering::Relaxed);

        let handle = self.0.handle.lock().expect("node handle lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl NodeInner {
    pub(crate) fn table(&self) -> MutexGuard<'_, RoutingTable> {
        self.routing_table.lock().expect("routing table lock poisoned")
    }

    pub(crate) fn kv(&self) -> MutexGuard<'_, KvStore> {
        self.store.lock().expect("store lock poisoned")
    }
}

/// The serve loop: dispatches responses to waiting calls and answers
/// requests until shutdown, or until the last [Node] handle is dropped.
fn serve(inner: Weak<NodeInner>, rpc: Arc<Rpc>) {
    loop {
        let node = match inner.upgrade() {
            Some(node) => node,
            None => break,
        };
        if node.shutdown.load(Ordering::Relaxed) {
            break;
        }

        let (message, from) = match rpc.socket().recv_from() {
            Some(incoming) => incoming,
            None => continue,
        };

        match message.message_type {
            MessageType::Request(request) => match handle_request(&node, &request) {
                Ok(response) => rpc.socket().response(from, message.transaction_id, response),
                Err(error) => {
                    debug!(?error, %from, "Refusing request");
                    rpc.socket().error(
                        from,
                        message.transaction_id,
                        ErrorSpecific {
                            code: ERROR_CODE_BAD_REQUEST,
                            description: error.to_string(),
                        },
                    );
                }
            },
            MessageType::Response(response) => {
                rpc.route_response(message.transaction_id, Ok(response));
            }
            MessageType::Error(error) => {
                rpc.route_response(
                    message.transaction_id,
                    Err(RemoteCallError::Remote {
                        code: error.code,
                        description: error.description,
                    }),
                );
            }
        }
    }

    trace!("Serve loop terminated");
}

/// Answers one request. Every request, whatever its kind, first inserts the
/// caller into the routing table.
fn handle_request(node: &NodeInner, request: &RequestSpecific) -> Result<ResponseSpecific> {
    let caller = Contact::from_endpoint(&request.source)?;
    node.table().add(caller);

    let responder = node.addr.to_string();

    match &request.request_type {
        RequestTypeSpecific::Ping => Ok(ResponseSpecific::Ack(AckResponseArguments { responder })),
        RequestTypeSpecific::Store(args) => {
            node.kv().put(args.key.clone(), args.value.clone(), false);

            Ok(ResponseSpecific::Ack(AckResponseArguments { responder }))
        }
        RequestTypeSpecific::FindNode(args) => {
            let target = Id::from_hex(&args.target)?;

            Ok(ResponseSpecific::Nodes(NodesResponseArguments {
                responder,
                contacts: node.table().find_k_nearest(&target),
            }))
        }
        RequestTypeSpecific::FindValue(args) => {
            if let Some(value) = node.kv().get(&args.key) {
                return Ok(ResponseSpecific::Value(ValueResponseArguments {
                    responder,
                    value,
                }));
            }

            let target = Id::from_hex(&args.key)?;

            Ok(ResponseSpecific::Nodes(NodesResponseArguments {
                responder,
                contacts: node.table().find_k_nearest(&target),
            }))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::messages::StoreRequestArguments;

    fn local_node() -> Node {
        Node::bind(Config {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            request_timeout: std::time::Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn id_is_derived_from_the_endpoint() {
        let node = local_node();

        assert_eq!(node.id(), Id::from_endpoint(&node.addr()));

        node.shutdown();
    }

    #[test]
    fn ping_inserts_both_sides() {
        let a = local_node();
        let b = local_node();

        assert!(a.ping(b.addr()));

        // The caller learned the responder, and serving the request taught
        // the responder the caller.
        assert!(a.contact_by_id(&b.id()).is_some());
        assert!(b.contact_by_id(&a.id()).is_some());

        a.shutdown();
        b.shutdown();
    }

    #[test]
    fn ping_an_unresponsive_endpoint_fails() {
        let a = local_node();

        assert!(!a.ping("127.0.0.1:1".parse().unwrap()));

        a.shutdown();
    }

    #[test]
    fn store_request_writes_a_replica() {
        let a = local_node();
        let b = local_node();

        let key = Id::random().to_hex();
        let response = a.0.rpc.call(
            b.addr(),
            RequestTypeSpecific::Store(StoreRequestArguments {
                key: key.clone(),
                value: Bytes::from_static(b"payload"),
            }),
        );

        assert!(matches!(response, Ok(ResponseSpecific::Ack(_))));

        let entries = b.store_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, key);
        assert!(!entries[0].is_origin);

        a.shutdown();
        b.shutdown();
    }

    #[test]
    fn find_value_prefers_the_stored_value() {
        let a = local_node();
        let b = local_node();

        let key = Id::random().to_hex();
        b.store_local(key.clone(), Bytes::from_static(b"here"));

        let response = a.0.rpc.call(
            b.addr(),
            RequestTypeSpecific::FindValue(crate::messages::FindValueRequestArguments { key }),
        );

        match response {
            Ok(ResponseSpecific::Value(args)) => {
                assert_eq!(args.value, Bytes::from_static(b"here"));
            }
            other => panic!("expected a value response, got {:?}", other),
        }

        a.shutdown();
        b.shutdown();
    }

    #[test]
    fn find_node_misses_fall_back_to_contacts() {
        let a = local_node();
        let b = local_node();

        assert!(a.ping(b.addr()));

        let response = a.0.rpc.call(
            b.addr(),
            RequestTypeSpecific::FindNode(crate::messages::FindNodeRequestArguments {
                target: Id::random().to_hex(),
            }),
        );

        match response {
            Ok(ResponseSpecific::Nodes(args)) => {
                // The only contact b knows is a itself.
                assert_eq!(args.contacts, vec![Contact::from_addr(a.addr())]);
            }
            other => panic!("expected a nodes response, got {:?}", other),
        }

        a.shutdown();
        b.shutdown();
    }

    #[test]
    fn malformed_target_yields_a_remote_error() {
        let a = local_node();
        let b = local_node();

        let response = a.0.rpc.call(
            b.addr(),
            RequestTypeSpecific::FindNode(crate::messages::FindNodeRequestArguments {
                target: "not hex".to_string(),
            }),
        );

        assert!(matches!(
            response,
            Err(RemoteCallError::Remote { code: 203, .. })
        ));

        a.shutdown();
        b.shutdown();
    }
}
