//! Shared types: identifiers, contacts, the routing table, and the local store.

mod contact;
mod id;
mod routing_table;
mod store;

pub use contact::Contact;
pub use id::{Distance, Id, ID_BITS, ID_SIZE};
pub use routing_table::{KBucket, RoutingTable};
pub use store::{KvEntry, KvStore};
