//! Index notification shim.
//!
//! The write transaction forwards every node insertion and removal, with
//! the node's associated path-node key, to a pluggable controller. The
//! controller decides which secondary indexes care.

use std::sync::Arc;

use parking_lot::Mutex;

use xylem_error::Result;
use xylem_types::{NodeKey, NodeKind, NodeRecord};

/// Kind of change forwarded to index listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Insert,
    Delete,
}

/// Definition of a secondary index (opaque to the transaction core).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
}

/// Receiver of node change notifications.
pub trait IndexController: Send {
    /// One call per inserted or removed node.
    fn notify_change(
        &mut self,
        change: ChangeType,
        node: &NodeRecord,
        path_node_key: u64,
    ) -> Result<()>;

    /// Rebuild listeners after the page transaction was reinstantiated.
    fn create_index_listeners(&mut self, defs: &[IndexDef]) -> Result<()>;
}

/// Controller that drops every notification.
#[derive(Debug, Default)]
pub struct NoopIndexController;

impl IndexController for NoopIndexController {
    fn notify_change(&mut self, _: ChangeType, _: &NodeRecord, _: u64) -> Result<()> {
        Ok(())
    }

    fn create_index_listeners(&mut self, _: &[IndexDef]) -> Result<()> {
        Ok(())
    }
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEvent {
    pub change: ChangeType,
    pub node_key: NodeKey,
    pub kind: NodeKind,
    pub path_node_key: u64,
}

/// Controller that records every notification; the log handle survives the
/// controller being moved into a transaction.
#[derive(Debug, Default)]
pub struct RecordingIndexController {
    log: Arc<Mutex<Vec<IndexEvent>>>,
}

impl RecordingIndexController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle onto the recorded events.
    #[must_use]
    pub fn log(&self) -> Arc<Mutex<Vec<IndexEvent>>> {
        Arc::clone(&self.log)
    }
}

impl IndexController for RecordingIndexController {
    fn notify_change(
        &mut self,
        change: ChangeType,
        node: &NodeRecord,
        path_node_key: u64,
    ) -> Result<()> {
        self.log.lock().push(IndexEvent {
            change,
            node_key: node.node_key(),
            kind: node.kind(),
            path_node_key,
        });
        Ok(())
    }

    fn create_index_listeners(&mut self, _: &[IndexDef]) -> Result<()> {
        Ok(())
    }
}
