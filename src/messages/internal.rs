use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KadMessage {
    #[serde(rename = "t", with = "serde_bytes")]
    pub transaction_id: Vec<u8>,

    #[serde(flatten)]
    pub variant: KadMessageVariant,
}

impl KadMessage {
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<KadMessage> {
        let obj = serde_bencode::from_bytes(bytes.as_ref())?;
        Ok(obj)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_bencode::to_bytes(self).map_err(Error::Bencode)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "y")]
pub enum KadMessageVariant {
    #[serde(rename = "q")]
    Request(KadRequestSpecific),

    #[serde(rename = "r")]
    Response(KadResponseSpecific),

    #[serde(rename = "e")]
    Error(KadErrorSpecific),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "q")]
pub enum KadRequestSpecific {
    #[serde(rename = "ping")]
    Ping {
        #[serde(rename = "a")]
        arguments: KadPingRequestArguments,
    },

    #[serde(rename = "store")]
    Store {
        #[serde(rename = "a")]
        arguments: KadStoreRequestArguments,
    },

    #[serde(rename = "find_node")]
    FindNode {
        #[serde(rename = "a")]
        arguments: KadFindNodeRequestArguments,
    },

    #[serde(rename = "find_value")]
    FindValue {
        #[serde(rename = "a")]
        arguments: KadFindValueRequestArguments,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)] // This means order matters! Order these from most to least detailed
pub enum KadResponseSpecific {
    Value {
        #[serde(rename = "r")]
        arguments: KadValueResponseArguments,
    },

    Nodes {
        #[serde(rename = "r")]
        arguments: KadNodesResponseArguments,
    },

    Ack {
        #[serde(rename = "r")]
        arguments: KadAckResponseArguments,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KadErrorSpecific {
    #[serde(rename = "e")]
    pub error_info: Vec<serde_bencode::value::Value>,
}

// === PING ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KadPingRequestArguments {
    pub source: String,
}

// === STORE ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KadStoreRequestArguments {
    pub source: String,
    pub key: String,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

// === FIND_NODE ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KadFindNodeRequestArguments {
    pub source: String,
    pub target: String,
}

// === FIND_VALUE ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KadFindValueRequestArguments {
    pub source: String,
    pub key: String,
}

// === Responses ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KadAckResponseArguments {
    pub responder: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KadNodesResponseArguments {
    pub responder: String,
    pub nodes: Vec<KadContact>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KadValueResponseArguments {
    pub responder: String,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

/// A contact on the wire: `(identifier, endpoint)`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KadContact {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
    pub addr: String,
}
