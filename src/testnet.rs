//! A local network of nodes on the loopback interface, for tests and demos.

use std::net::SocketAddr;
use std::time::Duration;

use crate::{Config, Node, Result};

/// A bunch of nodes on localhost, bootstrapped through the first one.
#[derive(Debug)]
pub struct Testnet {
    pub nodes: Vec<Node>,
}

impl Testnet {
    pub fn new(count: usize) -> Result<Testnet> {
        let mut nodes: Vec<Node> = Vec::with_capacity(count);

        for _ in 0..count {
            let node = Node::bind(Config {
                bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
                // Loopback peers either answer quickly or not at all.
                request_timeout: Duration::from_millis(500),
                ..Default::default()
            })?;

            if let Some(first) = nodes.first() {
                node.bootstrap(first.addr());
            }

            nodes.push(node);
        }

        Ok(Testnet { nodes })
    }
}

impl Drop for Testnet {
    fn drop(&mut self) {
        for node in &self.nodes {
            node.shutdown();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nodes_discover_each_other() {
        let testnet = Testnet::new(4).unwrap();

        for node in &testnet.nodes {
            assert!(!node.routing_contacts().is_empty());
        }
    }
}
