//! Typed Kademlia wire messages and their bencode codec.
//!
//! Public, fully-typed message structs on top of the serde wire structs in
//! [internal]; the closed set of operation kinds is the whole protocol.

mod internal;

use std::convert::TryInto;

use bytes::Bytes;

use crate::common::Contact;
use crate::{Error, Result};

#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    pub transaction_id: u16,
    pub message_type: MessageType,
}

#[derive(Debug, PartialEq, Clone)]
pub enum MessageType {
    Request(RequestSpecific),

    Response(ResponseSpecific),

    Error(ErrorSpecific),
}

#[derive(Debug, PartialEq, Clone)]
pub struct ErrorSpecific {
    pub code: i32,
    pub description: String,
}

/// An inbound or outbound request: the caller's endpoint in canonical text
/// form, plus the operation.
#[derive(Debug, PartialEq, Clone)]
pub struct RequestSpecific {
    pub source: String,
    pub request_type: RequestTypeSpecific,
}

#[derive(Debug, PartialEq, Clone)]
pub enum RequestTypeSpecific {
    Ping,
    Store(StoreRequestArguments),
    FindNode(FindNodeRequestArguments),
    FindValue(FindValueRequestArguments),
}

#[derive(Debug, PartialEq, Clone)]
pub enum ResponseSpecific {
    Ack(AckResponseArguments),
    Nodes(NodesResponseArguments),
    Value(ValueResponseArguments),
}

// === STORE ===
#[derive(Debug, PartialEq, Clone)]
pub struct StoreRequestArguments {
    /// Textual base-16 encoding of a 160-bit identifier.
    pub key: String,
    pub value: Bytes,
}

// === FIND_NODE ===
#[derive(Debug, PartialEq, Clone)]
pub struct FindNodeRequestArguments {
    /// Target key or id, hex text on the wire.
    pub target: String,
}

// === FIND_VALUE ===
#[derive(Debug, PartialEq, Clone)]
pub struct FindValueRequestArguments {
    pub key: String,
}

// === Responses ===
#[derive(Debug, PartialEq, Clone)]
pub struct AckResponseArguments {
    /// The responder's canonical endpoint.
    pub responder: String,
}

#[derive(Debug, PartialEq, Clone)]
pub struct NodesResponseArguments {
    pub responder: String,
    pub contacts: Vec<Contact>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ValueResponseArguments {
    pub responder: String,
    pub value: Bytes,
}

impl Message {
    fn into_serde_message(self) -> internal::KadMessage {
        internal::KadMessage {
            transaction_id: self.transaction_id.to_be_bytes().to_vec(),
            variant: match self.message_type {
                MessageType::Request(RequestSpecific {
                    source,
                    request_type,
                }) => internal::KadMessageVariant::Request(match request_type {
                    RequestTypeSpecific::Ping => internal::KadRequestSpecific::Ping {
                        arguments: internal::KadPingRequestArguments { source },
                    },
                    RequestTypeSpecific::Store(args) => internal::KadRequestSpecific::Store {
                        arguments: internal::KadStoreRequestArguments {
                            source,
                            key: args.key,
                            value: args.value.to_vec(),
                        },
                    },
                    RequestTypeSpecific::FindNode(args) => {
                        internal::KadRequestSpecific::FindNode {
                            arguments: internal::KadFindNodeRequestArguments {
                                source,
                                target: args.target,
                            },
                        }
                    }
                    RequestTypeSpecific::FindValue(args) => {
                        internal::KadRequestSpecific::FindValue {
                            arguments: internal::KadFindValueRequestArguments {
                                source,
                                key: args.key,
                            },
                        }
                    }
                }),
                MessageType::Response(response) => {
                    internal::KadMessageVariant::Response(match response {
                        ResponseSpecific::Ack(args) => internal::KadResponseSpecific::Ack {
                            arguments: internal::KadAckResponseArguments {
                                responder: args.responder,
                            },
                        },
                        ResponseSpecific::Nodes(args) => internal::KadResponseSpecific::Nodes {
                            arguments: internal::KadNodesResponseArguments {
                                responder: args.responder,
                                nodes: args
                                    .contacts
                                    .into_iter()
                                    .map(|contact| internal::KadContact {
                                        id: contact.id.to_vec(),
                                        addr: contact.addr.to_string(),
                                    })
                                    .collect(),
                            },
                        },
                        ResponseSpecific::Value(args) => internal::KadResponseSpecific::Value {
                            arguments: internal::KadValueResponseArguments {
                                responder: args.responder,
                                value: args.value.to_vec(),
                            },
                        },
                    })
                }
                MessageType::Error(error) => {
                    internal::KadMessageVariant::Error(internal::KadErrorSpecific {
                        error_info: vec![
                            serde_bencode::value::Value::Int(error.code.into()),
                            serde_bencode::value::Value::Bytes(error.description.into_bytes()),
                        ],
                    })
                }
            },
        }
    }

    fn from_serde_message(msg: internal::KadMessage) -> Result<Message> {
        Ok(Message {
            transaction_id: transaction_id(&msg.transaction_id)?,
            message_type: match msg.variant {
                internal::KadMessageVariant::Request(request) => {
                    let (source, request_type) = match request {
                        internal::KadRequestSpecific::Ping { arguments } => {
                            (arguments.source, RequestTypeSpecific::Ping)
                        }
                        internal::KadRequestSpecific::Store { arguments } => (
                            arguments.source,
                            RequestTypeSpecific::Store(StoreRequestArguments {
                                key: arguments.key,
                                value: arguments.value.into(),
                            }),
                        ),
                        internal::KadRequestSpecific::FindNode { arguments } => (
                            arguments.source,
                            RequestTypeSpecific::FindNode(FindNodeRequestArguments {
                                target: arguments.target,
                            }),
                        ),
                        internal::KadRequestSpecific::FindValue { arguments } => (
                            arguments.source,
                            RequestTypeSpecific::FindValue(FindValueRequestArguments {
                                key: arguments.key,
                            }),
                        ),
                    };

                    MessageType::Request(RequestSpecific {
                        source,
                        request_type,
                    })
                }
                internal::KadMessageVariant::Response(response) => {
                    MessageType::Response(match response {
                        internal::KadResponseSpecific::Ack { arguments } => {
                            ResponseSpecific::Ack(AckResponseArguments {
                                responder: arguments.responder,
                            })
                        }
                        internal::KadResponseSpecific::Nodes { arguments } => {
                            ResponseSpecific::Nodes(NodesResponseArguments {
                                responder: arguments.responder,
                                contacts: arguments
                                    .nodes
                                    .into_iter()
                                    .map(contact_from_wire)
                                    .collect::<Result<_>>()?,
                            })
                        }
                        internal::KadResponseSpecific::Value { arguments } => {
                            ResponseSpecific::Value(ValueResponseArguments {
                                responder: arguments.responder,
                                value: arguments.value.into(),
                            })
                        }
                    })
                }
                internal::KadMessageVariant::Error(error) => {
                    MessageType::Error(error_from_wire(error.error_info))
                }
            },
        })
    }

    pub fn to_bytes(self) -> Result<Vec<u8>> {
        self.into_serde_message().to_bytes()
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Message> {
        Message::from_serde_message(internal::KadMessage::from_bytes(bytes)?)
    }
}

fn transaction_id(bytes: &[u8]) -> Result<u16> {
    let bytes: [u8; 2] = bytes
        .try_into()
        .map_err(|_| Error::InvalidTransactionId(bytes.to_vec()))?;

    Ok(u16::from_be_bytes(bytes))
}

fn contact_from_wire(wire: internal::KadContact) -> Result<Contact> {
    let id = crate::common::Id::from_bytes(&wire.id)?;
    let addr = wire
        .addr
        .parse()
        .map_err(|_| Error::Address(wire.addr.clone()))?;

    Ok(Contact::new(id, addr))
}

fn error_from_wire(error_info: Vec<serde_bencode::value::Value>) -> ErrorSpecific {
    let mut code = 0;
    let mut description = String::new();

    for value in error_info {
        match value {
            serde_bencode::value::Value::Int(n) => code = n as i32,
            serde_bencode::value::Value::Bytes(bytes) => {
                description = String::from_utf8_lossy(&bytes).into_owned()
            }
            _ => {}
        }
    }

    ErrorSpecific { code, description }
}
