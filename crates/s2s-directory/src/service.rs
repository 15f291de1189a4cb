use parking_lot::Mutex;
use s2s_common::{NodeStatus, ServiceOverview};
use std::sync::{Arc, Weak};

use crate::node::Node;

/// Handle to a selected node, valid for one call attempt.
///
/// It holds a weak reference plus the node's identity, never ownership: a
/// concurrent eviction can drop the node at any time, after which
/// [`NodeRef::is_live`] turns false and failure reports against it are
/// ignored. Select again for the next attempt instead of caching this.
#[derive(Debug, Clone)]
pub struct NodeRef {
    service: String,
    addr: String,
    node: Weak<Node>,
}

impl NodeRef {
    pub(crate) fn new(service: &str, node: &Arc<Node>) -> Self {
        Self {
            service: service.to_string(),
            addr: node.addr().to_string(),
            node: Arc::downgrade(node),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// `true` while the node is still registered.
    pub fn is_live(&self) -> bool {
        self.upgrade()
            .is_some_and(|node| node.status() != NodeStatus::Dead)
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<Node>> {
        self.node.upgrade()
    }
}

/// Outcome of [`Service::admit`].
#[derive(Debug)]
pub(crate) enum Admission {
    /// A new node was appended
    Added(Arc<Node>),
    /// The address was already present. Its tag was refreshed and it was
    /// made active; `previous` is the status it left
    Existing { node: Arc<Node>, previous: NodeStatus },
}

struct Members {
    nodes: Vec<Arc<Node>>,
    counter: u64,
}

/// A named group of interchangeable nodes.
///
/// The node list and the selection counter share one structural lock. It is
/// held for list edits and for the selection scan, and never across a
/// liveness check or a remote call. Per-node fields have their own locks,
/// always taken after this one.
pub struct Service {
    name: String,
    members: Mutex<Members>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Mutex::new(Members {
                nodes: Vec::new(),
                counter: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Picks the next node with round robin, skipping nodes that aren't
    /// active.
    ///
    /// The scan starts at `counter mod len`, bumps the counter, and walks
    /// forward at most once around the list. Returns `None` if the service
    /// is empty or no node is active.
    pub fn select(&self) -> Option<Arc<Node>> {
        let chosen = {
            let mut members = self.members.lock();
            let len = members.nodes.len();
            if len == 0 {
                return None;
            }

            let start = (members.counter % len as u64) as usize;
            members.counter = members.counter.wrapping_add(1);

            let nodes = &members.nodes;
            (0..len)
                .map(|offset| &nodes[(start + offset) % len])
                .find(|node| node.is_active())
                .cloned()?
        };

        chosen.record_selection();
        Some(chosen)
    }

    pub fn find(&self, addr: &str) -> Option<Arc<Node>> {
        self.members
            .lock()
            .nodes
            .iter()
            .find(|node| node.addr() == addr)
            .cloned()
    }

    /// Adds an active node for `addr`, or refreshes and reactivates the one
    /// already there. Addresses stay unique within the service.
    ///
    /// Reactivation happens under the list lock, so an eviction can't slip
    /// in between finding the node and making it active.
    pub(crate) fn admit(&self, addr: &str, tag: &str) -> Admission {
        let mut members = self.members.lock();
        if let Some(index) = members.nodes.iter().position(|node| node.addr() == addr) {
            let existing = Arc::clone(&members.nodes[index]);
            existing.set_tag(tag);
            if let Some(previous) = existing.reactivate() {
                return Admission::Existing {
                    node: existing,
                    previous,
                };
            }
            // A dead entry is replaced by a fresh node
            members.nodes.remove(index);
        }

        let node = Arc::new(Node::new(addr, tag));
        members.nodes.push(Arc::clone(&node));
        Admission::Added(node)
    }

    /// Marks the node at `addr` dead and drops it from the list.
    pub(crate) fn remove(&self, addr: &str) -> Option<Arc<Node>> {
        let mut members = self.members.lock();
        let index = members.nodes.iter().position(|node| node.addr() == addr)?;
        let node = members.nodes.remove(index);
        node.kill();
        Some(node)
    }

    /// Evicts `node` after a failed probe.
    ///
    /// Only removes that exact instance, and only if it is still probing: a
    /// node that was paused, restored or re-registered while the probe ran
    /// is left alone.
    pub(crate) fn evict(&self, node: &Arc<Node>) -> bool {
        let mut members = self.members.lock();
        let Some(index) = members.nodes.iter().position(|n| Arc::ptr_eq(n, node)) else {
            return false;
        };
        if !node.kill_if_probing() {
            return false;
        }
        members.nodes.remove(index);
        true
    }

    /// Snapshot of the node list in round-robin order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.members.lock().nodes.clone()
    }

    pub fn len(&self) -> usize {
        self.members.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_count(&self) -> usize {
        self.nodes().iter().filter(|node| node.is_active()).count()
    }

    pub fn overview(&self) -> ServiceOverview {
        let members: Vec<_> = self.nodes().iter().map(|node| node.overview()).collect();
        let counter = members.iter().map(|m| m.counter).sum();
        ServiceOverview {
            name: self.name.clone(),
            members,
            counter,
        }
    }
}
