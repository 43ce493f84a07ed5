//! Run a node, optionally joining an existing network through a known
//! endpoint, and publish one value.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};

use kadmos::{Bytes, Config, Id, Node};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Endpoint of a known node to bootstrap through, e.g. 203.0.113.7:9000
    bootstrap: Option<SocketAddr>,
}

fn main() -> kadmos::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();

    let node = Node::bind(Config::default())?;
    info!(id = %node.id(), addr = %node.addr(), "Running");

    if let Some(endpoint) = cli.bootstrap {
        if node.bootstrap(endpoint) {
            info!(contacts = node.routing_contacts().len(), "Joined the network");
        } else {
            info!(%endpoint, "Bootstrap node did not respond");
        }
    }

    let key = Id::random().to_hex();
    let stored = node.iterative_store(key.clone(), Bytes::from_static(b"hello"))?;
    info!(%key, count = stored.len(), "Published a value");

    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
