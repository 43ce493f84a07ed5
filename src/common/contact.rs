//! Contact entries in the Kademlia routing table.

use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use crate::common::Id;
use crate::{Error, Result};

#[derive(Clone, Eq)]
/// A remote peer: an identifier and the endpoint it was derived from.
///
/// Contacts are immutable value objects. Two contacts are equal iff their
/// identifiers match; identifiers are derived from endpoints, so a peer that
/// reuses another's endpoint with a different id cannot arise from honest
/// derivation.
pub struct Contact {
    pub id: Id,
    pub addr: SocketAddr,
}

impl Contact {
    pub fn new(id: Id, addr: SocketAddr) -> Contact {
        Contact { id, addr }
    }

    /// Creates a Contact for an endpoint by hashing its canonical form.
    pub fn from_addr(addr: SocketAddr) -> Contact {
        Contact {
            id: Id::from_endpoint(&addr),
            addr,
        }
    }

    /// Parses a textual endpoint and derives its identifier.
    ///
    /// Returns [Error::Address] when the endpoint is malformed.
    pub fn from_endpoint(endpoint: &str) -> Result<Contact> {
        let addr: SocketAddr = endpoint
            .parse()
            .map_err(|_| Error::Address(endpoint.to_string()))?;

        Ok(Contact::from_addr(addr))
    }

    #[cfg(test)]
    pub(crate) fn random() -> Contact {
        use std::sync::atomic::{AtomicU16, Ordering};

        static NEXT_PORT: AtomicU16 = AtomicU16::new(1);
        let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);

        Contact {
            id: Id::random(),
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
        }
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for Contact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for Contact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Contact({}, {})", self.id, self.addr)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn equality_is_id_only() {
        let a = Contact::random();
        let b = Contact::new(a.id, "10.0.0.1:4000".parse().unwrap());

        assert_eq!(a, b);
        assert_ne!(a, Contact::random());
    }

    #[test]
    fn from_endpoint_rejects_malformed_input() {
        assert!(Contact::from_endpoint("127.0.0.1:6881").is_ok());
        assert!(matches!(
            Contact::from_endpoint("not an endpoint"),
            Err(Error::Address(_))
        ));
    }

    #[test]
    fn derived_id_matches_endpoint_hash() {
        let addr: SocketAddr = "127.0.0.1:6881".parse().unwrap();
        let contact = Contact::from_endpoint("127.0.0.1:6881").unwrap();

        assert_eq!(contact.id, Id::from_endpoint(&addr));
        assert_eq!(contact.addr, addr);
    }
}
