use std::sync::{PoisonError, RwLock};

/// Known peer addresses, in the order they were learned.
///
/// The bootstrap address is seeded at construction and is always a member,
/// including on the bootstrap node itself. The node's own address is never
/// added through [`PeerSet::add`].
pub struct PeerSet {
    node_addr: String,
    bootstrap: String,
    inner: RwLock<Vec<String>>,
}

impl PeerSet {
    pub fn new(node_addr: &str, bootstrap: &str) -> PeerSet {
        PeerSet {
            node_addr: node_addr.to_string(),
            bootstrap: bootstrap.to_string(),
            inner: RwLock::new(vec![bootstrap.to_string()]),
        }
    }

    pub fn node_addr(&self) -> &str {
        &self.node_addr
    }

    pub fn bootstrap(&self) -> &str {
        &self.bootstrap
    }

    pub fn is_bootstrap_node(&self) -> bool {
        self.node_addr == self.bootstrap
    }

    /// Add `addr` unless it is this node or already known. Returns whether it was added.
    pub fn add(&self, addr: &str) -> bool {
        if addr.is_empty() || addr == self.node_addr {
            return false;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.iter().any(|known| known == addr) {
            return false;
        }
        inner.push(addr.to_string());
        true
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|known| known == addr)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every known address except this node and `exclude`.
    pub fn gossip_targets(&self, exclude: &[&str]) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|addr| **addr != self.node_addr && !exclude.contains(&addr.as_str()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}
