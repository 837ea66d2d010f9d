//! Peer registry construction.

use crate::config::{SelectionMode, ServerConfig};
use crate::digest;
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::debug;

/// One upstream peer a request can be routed to.
///
/// Immutable once the registry is built; the fingerprint is computed exactly
/// once, at construction.
#[derive(Debug, Clone)]
pub struct BackendPeer {
    address: SocketAddr,
    name: String,
    fingerprint: Option<String>,
}

impl BackendPeer {
    /// Get the peer address.
    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Get the human-readable peer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Digest of this peer's address; present in digest modes only.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }
}

/// Immutable ordered list of peers for one upstream group.
///
/// Primary servers come first in declaration order, then backup servers in
/// declaration order. A peer's position in this list is its canonical index
/// for the lifetime of the registry.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: Vec<BackendPeer>,
    by_fingerprint: HashMap<String, usize>,
    by_address: HashMap<SocketAddr, usize>,
}

impl PeerRegistry {
    /// Build the registry for an upstream group.
    ///
    /// Returns `None` when the group has no servers; routing then falls
    /// through entirely to the fallback selector.
    #[must_use]
    pub fn build(servers: &[ServerConfig], mode: &SelectionMode) -> Option<Self> {
        if servers.is_empty() {
            return None;
        }

        let primary = servers.iter().filter(|server| !server.backup);
        let backup = servers.iter().filter(|server| server.backup);

        let mut peers = Vec::with_capacity(servers.len());
        for server in primary.chain(backup) {
            let address = server.socket_addr();
            peers.push(BackendPeer {
                address,
                name: server.display_name(),
                fingerprint: digest::fingerprint(mode, &address),
            });
        }

        // First peer wins on duplicate fingerprints or addresses, matching
        // first-match scan order.
        let mut by_fingerprint = HashMap::new();
        let mut by_address = HashMap::new();
        for (position, peer) in peers.iter().enumerate() {
            if let Some(fingerprint) = &peer.fingerprint {
                by_fingerprint.entry(fingerprint.clone()).or_insert(position);
            }
            by_address.entry(peer.address).or_insert(position);
        }

        debug!(peers = peers.len(), "built peer registry");

        Some(Self {
            peers,
            by_fingerprint,
            by_address,
        })
    }

    /// Get the number of peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Check whether the registry holds no peers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Get the peer at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&BackendPeer> {
        self.peers.get(position)
    }

    /// Get all peers in registry order.
    #[must_use]
    pub fn peers(&self) -> &[BackendPeer] {
        &self.peers
    }

    /// Position of the first peer whose fingerprint equals `route` exactly.
    ///
    /// The comparison requires full-length equality; a route sharing only a
    /// prefix with a fingerprint does not match.
    #[must_use]
    pub fn find_by_fingerprint(&self, route: &str) -> Option<usize> {
        self.by_fingerprint.get(route).copied()
    }

    /// Position of the first peer with this address.
    #[must_use]
    pub fn position_of(&self, address: SocketAddr) -> Option<usize> {
        self.by_address.get(&address).copied()
    }

    /// Affinity cookie value identifying the peer at `position`.
    ///
    /// The peer's fingerprint in digest modes, its decimal position in index
    /// mode.
    #[must_use]
    pub fn route_value(&self, position: usize) -> Option<String> {
        let peer = self.peers.get(position)?;
        match &peer.fingerprint {
            Some(fingerprint) => Some(fingerprint.clone()),
            None => Some(position.to_string()),
        }
    }
}
