//! Read-only node transaction.
//!
//! Pinned to one committed revision; holds a single current node and moves
//! by key or along the structural pointers. Any number of read
//! transactions may coexist with the writer.

use std::sync::Arc;

use xylem_error::{Result, XylemError};
use xylem_page::{CommitCredentials, PageReadTx, ResourceManager};
use xylem_types::{DeweyId, NodeKey, NodeKind, NodeRecord, QName, Revision};

use crate::names::{resolve_qname, value_string};
use crate::reader::TreeEvent;

pub struct NodeReadTx {
    resource: Arc<dyn ResourceManager>,
    page: Box<dyn PageReadTx>,
    cur: NodeKey,
}

impl NodeReadTx {
    /// Open a read transaction pinned to `revision`, or to the newest
    /// committed revision when `None`.
    pub fn begin(
        resource: Arc<dyn ResourceManager>,
        revision: Option<Revision>,
    ) -> Result<Self> {
        let revision = revision.unwrap_or_else(|| resource.last_committed().revision);
        let page = resource.begin_page_read_tx(revision)?;
        Ok(Self {
            resource,
            page,
            cur: NodeKey::DOCUMENT_ROOT,
        })
    }

    /// The resource manager this transaction was opened on.
    #[must_use]
    pub fn resource_manager(&self) -> &Arc<dyn ResourceManager> {
        &self.resource
    }

    pub(crate) fn record(&self) -> Result<&NodeRecord> {
        self.page
            .get_record(self.cur)
            .ok_or(XylemError::NodeNotFound {
                key: self.cur.get(),
            })
    }

    fn record_of(&self, key: NodeKey) -> Result<&NodeRecord> {
        self.page
            .get_record(key)
            .ok_or(XylemError::NodeNotFound { key: key.get() })
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Move to `key`; stays put and returns `false` if it does not exist.
    pub fn move_to(&mut self, key: NodeKey) -> bool {
        if self.page.get_record(key).is_some() {
            self.cur = key;
            true
        } else {
            false
        }
    }

    pub fn move_to_document_root(&mut self) -> bool {
        self.move_to(NodeKey::DOCUMENT_ROOT)
    }

    pub fn move_to_parent(&mut self) -> bool {
        match self.record().ok().and_then(NodeRecord::parent) {
            Some(parent) => self.move_to(parent),
            None => false,
        }
    }

    pub fn move_to_first_child(&mut self) -> bool {
        match self
            .record()
            .ok()
            .and_then(|r| r.as_struct())
            .and_then(|s| s.first_child)
        {
            Some(child) => self.move_to(child),
            None => false,
        }
    }

    pub fn move_to_left_sibling(&mut self) -> bool {
        match self
            .record()
            .ok()
            .and_then(|r| r.as_struct())
            .and_then(|s| s.left_sibling)
        {
            Some(key) => self.move_to(key),
            None => false,
        }
    }

    pub fn move_to_right_sibling(&mut self) -> bool {
        match self
            .record()
            .ok()
            .and_then(|r| r.as_struct())
            .and_then(|s| s.right_sibling)
        {
            Some(key) => self.move_to(key),
            None => false,
        }
    }

    pub fn move_to_attribute(&mut self, index: usize) -> bool {
        let target = self
            .record()
            .ok()
            .and_then(|r| r.as_element())
            .and_then(|e| e.attribute_keys.get(index).copied());
        match target {
            Some(key) => self.move_to(key),
            None => false,
        }
    }

    pub fn move_to_namespace(&mut self, index: usize) -> bool {
        let target = self
            .record()
            .ok()
            .and_then(|r| r.as_element())
            .and_then(|e| e.namespace_keys.get(index).copied());
        match target {
            Some(key) => self.move_to(key),
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn node_key(&self) -> NodeKey {
        self.cur
    }

    pub fn kind(&self) -> Result<NodeKind> {
        Ok(self.record()?.kind())
    }

    pub fn name(&self) -> Result<Option<QName>> {
        Ok(resolve_qname(&*self.page, self.record()?))
    }

    pub fn value(&self) -> Result<Option<String>> {
        Ok(value_string(self.record()?))
    }

    pub fn hash(&self) -> Result<i64> {
        Ok(self.record()?.hash())
    }

    pub fn dewey_id(&self) -> Result<Option<DeweyId>> {
        Ok(self.record()?.dewey_id().cloned())
    }

    pub fn child_count(&self) -> Result<u64> {
        Ok(self.record()?.as_struct().map_or(0, |s| s.child_count))
    }

    pub fn descendant_count(&self) -> Result<u64> {
        Ok(self.record()?.as_struct().map_or(0, |s| s.descendant_count))
    }

    pub fn attribute_count(&self) -> Result<usize> {
        Ok(self
            .record()?
            .as_element()
            .map_or(0, |e| e.attribute_keys.len()))
    }

    pub fn namespace_count(&self) -> Result<usize> {
        Ok(self
            .record()?
            .as_element()
            .map_or(0, |e| e.namespace_keys.len()))
    }

    pub fn has_first_child(&self) -> Result<bool> {
        Ok(self
            .record()?
            .as_struct()
            .is_some_and(|s| s.first_child.is_some()))
    }

    pub fn has_right_sibling(&self) -> Result<bool> {
        Ok(self
            .record()?
            .as_struct()
            .is_some_and(|s| s.right_sibling.is_some()))
    }

    #[must_use]
    pub fn revision(&self) -> Revision {
        self.page.revision()
    }

    #[must_use]
    pub fn commit_credentials(&self) -> CommitCredentials {
        self.page.commit_credentials()
    }

    // -----------------------------------------------------------------------
    // Subtree serialization
    // -----------------------------------------------------------------------

    /// Serialize the subtree rooted at the current node as an event stream.
    ///
    /// Does not move the cursor. The current node must be structural; a
    /// document root serializes its first child's subtree.
    pub fn events_for_subtree(&self) -> Result<Vec<TreeEvent>> {
        let mut root = self.cur;
        let record = self.record()?;
        if record.kind() == NodeKind::DocumentRoot {
            root = record
                .as_struct()
                .and_then(|s| s.first_child)
                .ok_or(XylemError::WrongCurrentNode {
                    expected: "a non-empty document",
                    found: "empty document root",
                })?;
        } else if record.as_struct().is_none() {
            return Err(XylemError::WrongCurrentNode {
                expected: "a structural node",
                found: record.kind().as_str(),
            });
        }
        let mut events = Vec::new();
        self.emit_subtree(root, &mut events)?;
        Ok(events)
    }

    fn emit_subtree(&self, key: NodeKey, out: &mut Vec<TreeEvent>) -> Result<()> {
        let record = self.record_of(key)?;
        match record.kind() {
            NodeKind::Element => {
                let element = record.as_element().ok_or_else(|| XylemError::StoreCorrupt {
                    detail: format!("element record expected at {key}"),
                })?;
                let name =
                    resolve_qname(&*self.page, record).ok_or_else(|| XylemError::StoreCorrupt {
                        detail: format!("element {key} without a name"),
                    })?;
                let mut namespaces = Vec::new();
                for &ns in &element.namespace_keys {
                    let rec = self.record_of(ns)?;
                    if let Some(qname) = resolve_qname(&*self.page, rec) {
                        namespaces.push(qname);
                    }
                }
                let mut attributes = Vec::new();
                for &att in &element.attribute_keys {
                    let rec = self.record_of(att)?;
                    if let Some(qname) = resolve_qname(&*self.page, rec) {
                        attributes.push((qname, value_string(rec).unwrap_or_default()));
                    }
                }
                out.push(TreeEvent::StartElement {
                    name,
                    namespaces,
                    attributes,
                });
                let mut child = element.struc.first_child;
                while let Some(c) = child {
                    self.emit_subtree(c, out)?;
                    child = self.record_of(c)?.as_struct().and_then(|s| s.right_sibling);
                }
                out.push(TreeEvent::EndElement);
            }
            NodeKind::Text => out.push(TreeEvent::Text(value_string(record).unwrap_or_default())),
            NodeKind::Comment => {
                out.push(TreeEvent::Comment(value_string(record).unwrap_or_default()));
            }
            NodeKind::ProcessingInstruction => {
                let target = resolve_qname(&*self.page, record)
                    .map(|q| q.local_name().to_owned())
                    .unwrap_or_default();
                out.push(TreeEvent::ProcessingInstruction {
                    target,
                    content: value_string(record).unwrap_or_default(),
                });
            }
            kind => {
                return Err(XylemError::WrongCurrentNode {
                    expected: "a structural node",
                    found: kind.as_str(),
                });
            }
        }
        Ok(())
    }
}
