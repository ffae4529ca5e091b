use parking_lot::RwLock;
use tracing::info;

/// Known peer addresses in insertion order. Peers are never removed.
#[derive(Debug)]
pub struct PeerRegistry {
    own_address: String,
    peers: RwLock<Vec<String>>,
}

impl PeerRegistry {
    pub fn new(own_address: impl Into<String>) -> Self {
        Self {
            own_address: own_address.into(),
            peers: RwLock::new(Vec::new()),
        }
    }

    /// Idempotent; the node's own address is never registered.
    /// Returns `true` if the address was new.
    pub fn add(&self, address: &str) -> bool {
        if address.is_empty() || address == self.own_address {
            return false;
        }
        let mut peers = self.peers.write();
        if peers.iter().any(|p| p == address) {
            return false;
        }
        info!(peer = address, "adding peer");
        peers.push(address.to_string());
        true
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.read().iter().any(|p| p == address)
    }

    pub fn list(&self) -> Vec<String> {
        self.peers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
