#![doc = include_str!("../README.md")]

mod common;
mod config;
mod error;
mod lookup;
pub mod messages;
mod node;
pub mod rpc;
mod testnet;

pub use crate::common::{
    Contact, Distance, Id, KBucket, KvEntry, KvStore, RoutingTable, ID_BITS, ID_SIZE,
};
pub use crate::config::{Config, DEFAULT_ALPHA, DEFAULT_K, DEFAULT_REQUEST_TIMEOUT};
pub use crate::error::{Error, Result};
pub use crate::node::Node;
pub use crate::testnet::Testnet;

pub use bytes::Bytes;
