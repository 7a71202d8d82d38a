//! Path summary writer shim.
//!
//! The path summary is a secondary tree keyed by distinct root-to-node name
//! paths; name nodes link into it through their `path_node_key`. The write
//! transaction consumes the [`PathSummaryWriter`] contract; the in-memory
//! implementation here keeps a refcounted path tree and can rebuild itself
//! from the stored records (which are the durable source of truth) after
//! commit, rollback and revert.

use std::collections::HashMap;

use xylem_error::{Result, XylemError};
use xylem_page::PageReadTx;
use xylem_types::{NodeKey, NodeKind, QName};

use crate::axis;
use crate::names::resolve_qname;

/// Path-node key of the conceptual root (the document root's path).
pub const ROOT_PATH_NODE: u64 = 0;

/// Operation type passed to [`PathSummaryWriter::adapt_path_for_changed_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOp {
    SetName,
    Moved,
    /// A move that kept the parent; a no-op for the summary.
    MovedOnSameLevel,
}

/// Maintains the path summary alongside the write transaction.
pub trait PathSummaryWriter: Send {
    /// Key of the path node for `name` under the parent path, creating it
    /// (or bumping its reference count) as needed.
    fn get_path_node_key(
        &mut self,
        parent_path_key: u64,
        name: &QName,
        kind: NodeKind,
    ) -> Result<u64>;

    /// Re-home a node's path after a rename or move; returns the new path
    /// node key.
    fn adapt_path_for_changed_node(
        &mut self,
        old_path_key: u64,
        parent_path_key: u64,
        new_name: &QName,
        kind: NodeKind,
        op: PathOp,
    ) -> Result<u64>;

    /// Drop one reference from a removed name node.
    fn remove(&mut self, path_key: u64, kind: NodeKind);

    /// Rebuild from the stored records after the page transaction was
    /// swapped out.
    fn reinstantiate(&mut self, page: &dyn PageReadTx) -> Result<()>;

    /// Whether the summary contains the given root-to-node path.
    fn contains(&self, steps: &[(QName, NodeKind)]) -> bool;

    /// Reference count of a path node, 0 when absent.
    fn reference_count(&self, path_key: u64) -> u64;
}

#[derive(Debug, Clone)]
struct PathNode {
    parent: u64,
    name: QName,
    kind: NodeKind,
    refs: u64,
}

/// Refcounted in-memory path tree.
#[derive(Debug, Default)]
pub struct InMemoryPathSummary {
    nodes: HashMap<u64, PathNode>,
    next: u64,
}

impl InMemoryPathSummary {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next: 1,
        }
    }

    fn find_child(&self, parent: u64, name: &QName, kind: NodeKind) -> Option<u64> {
        self.nodes
            .iter()
            .find(|(_, n)| n.parent == parent && n.kind == kind && n.name == *name)
            .map(|(&k, _)| k)
    }

    /// Record one reference to path node `key`, creating the node if it is
    /// not yet known (used during rebuild, where keys are dictated by the
    /// stored records).
    fn reference(&mut self, key: u64, parent: u64, name: QName, kind: NodeKind) {
        self.nodes
            .entry(key)
            .and_modify(|n| n.refs += 1)
            .or_insert(PathNode {
                parent,
                name,
                kind,
                refs: 1,
            });
        if key >= self.next {
            self.next = key + 1;
        }
    }
}

impl PathSummaryWriter for InMemoryPathSummary {
    fn get_path_node_key(
        &mut self,
        parent_path_key: u64,
        name: &QName,
        kind: NodeKind,
    ) -> Result<u64> {
        if let Some(key) = self.find_child(parent_path_key, name, kind) {
            if let Some(node) = self.nodes.get_mut(&key) {
                node.refs += 1;
            }
            return Ok(key);
        }
        let key = self.next;
        self.next += 1;
        self.nodes.insert(
            key,
            PathNode {
                parent: parent_path_key,
                name: name.clone(),
                kind,
                refs: 1,
            },
        );
        Ok(key)
    }

    fn adapt_path_for_changed_node(
        &mut self,
        old_path_key: u64,
        parent_path_key: u64,
        new_name: &QName,
        kind: NodeKind,
        op: PathOp,
    ) -> Result<u64> {
        match op {
            PathOp::MovedOnSameLevel => Ok(old_path_key),
            PathOp::SetName | PathOp::Moved => {
                self.remove(old_path_key, kind);
                self.get_path_node_key(parent_path_key, new_name, kind)
            }
        }
    }

    fn remove(&mut self, path_key: u64, _kind: NodeKind) {
        let Some(node) = self.nodes.get_mut(&path_key) else {
            return;
        };
        node.refs -= 1;
        if node.refs == 0 {
            self.nodes.remove(&path_key);
        }
    }

    fn reinstantiate(&mut self, page: &dyn PageReadTx) -> Result<()> {
        self.nodes.clear();
        self.next = 1;
        for key in axis::descendants(page, NodeKey::DOCUMENT_ROOT)? {
            let record = page
                .get_record(key)
                .ok_or(XylemError::NodeNotFound { key: key.get() })?;
            let parent_path = match record.parent().and_then(|p| page.get_record(p)) {
                Some(parent) => parent.as_name().map_or(ROOT_PATH_NODE, |n| n.path_node_key),
                None => ROOT_PATH_NODE,
            };
            if let (Some(name_del), Some(name)) = (record.as_name(), resolve_qname(page, record)) {
                if name_del.path_node_key != ROOT_PATH_NODE {
                    self.reference(name_del.path_node_key, parent_path, name, record.kind());
                }
            }
            if let Some(element) = record.as_element() {
                let element_path = element.name.path_node_key;
                for &sub in element.namespace_keys.iter().chain(&element.attribute_keys) {
                    let rec = page
                        .get_record(sub)
                        .ok_or(XylemError::NodeNotFound { key: sub.get() })?;
                    if let (Some(nd), Some(name)) = (rec.as_name(), resolve_qname(page, rec)) {
                        if nd.path_node_key != ROOT_PATH_NODE {
                            self.reference(nd.path_node_key, element_path, name, rec.kind());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn contains(&self, steps: &[(QName, NodeKind)]) -> bool {
        let mut parent = ROOT_PATH_NODE;
        for (name, kind) in steps {
            match self.find_child(parent, name, *kind) {
                Some(key) => parent = key,
                None => return false,
            }
        }
        true
    }

    fn reference_count(&self, path_key: u64) -> u64 {
        self.nodes.get(&path_key).map_or(0, |n| n.refs)
    }
}
