//! The node write transaction.
//!
//! A single writer per resource mutates the tree in place through the page
//! transaction's record-level copy-on-write, keeping per-node rolling
//! hashes, descendant counts, the path summary, secondary-index listeners
//! and (optionally) DeweyIDs in sync with every edit. Readers pinned to
//! committed revisions are unaffected until commit.
//!
//! The public handle wraps the transaction state in a re-entrant lock so a
//! scheduled auto-commit can interleave safely with caller threads; with no
//! scheduler the lock is uncontended.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::ReentrantMutex;
use tracing::{debug, warn};

use xylem_error::{Result, XylemError};
use xylem_page::{Abort, CommitCredentials, PageTx, ResourceManager, UberPage};
use xylem_types::{
    DeweyId, HashMode, InsertPosition, Movement, NodeKey, NodeKind, NodeRecord, QName, Revision,
    StructDelegate,
};

use crate::axis;
use crate::factory::NodeFactory;
use crate::hash::{fold_child, image_hash};
use crate::index::{ChangeType, IndexController, NoopIndexController};
use crate::invariants;
use crate::names::{resolve_qname, value_string};
use crate::path::{InMemoryPathSummary, PathOp, PathSummaryWriter, ROOT_PATH_NODE};
use crate::reader::TreeEvent;
use crate::rtx::NodeReadTx;
use crate::scheduler::AutoCommit;
use xylem_types::qname;

const PRIME: i64 = crate::hash::PRIME;

/// Metadata handed to pre- and post-commit hooks.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// For pre-commit hooks the revision about to be created; for
    /// post-commit hooks the revision that was created.
    pub revision: Revision,
    pub message: Option<String>,
}

/// A commit hook. Pre-commit hook failures abort the commit.
pub type CommitHook = Box<dyn FnMut(&CommitInfo) -> Result<()> + Send>;

/// Options for opening a write transaction.
pub struct WriteTxOptions {
    /// Auto-commit after this many modifications; 0 disables.
    pub max_node_count: u64,
    /// Periodic auto-commit interval; `None` disables the scheduler.
    pub auto_commit_interval: Option<Duration>,
    /// Index controller; defaults to a no-op controller.
    pub index_controller: Option<Box<dyn IndexController>>,
}

impl Default for WriteTxOptions {
    fn default() -> Self {
        Self {
            max_node_count: 0,
            auto_commit_interval: None,
            index_controller: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction state
// ---------------------------------------------------------------------------

pub(crate) struct WtxInner {
    resource: Arc<dyn ResourceManager>,
    page: Box<dyn PageTx>,
    factory: NodeFactory,
    path_summary: Option<Box<dyn PathSummaryWriter>>,
    index_controller: Box<dyn IndexController>,
    cur: NodeKey,
    hash_mode: HashMode,
    dewey_ids: bool,
    compression: bool,
    bulk_insert: bool,
    modification_count: u64,
    max_node_count: u64,
    pre_commit_hooks: Vec<CommitHook>,
    post_commit_hooks: Vec<CommitHook>,
    closed: bool,
}

impl WtxInner {
    // -----------------------------------------------------------------------
    // Record access helpers
    // -----------------------------------------------------------------------

    fn record(&self, key: NodeKey) -> Result<&NodeRecord> {
        self.page
            .get_record(key)
            .ok_or(XylemError::NodeNotFound { key: key.get() })
    }

    fn kind_of(&self, key: NodeKey) -> Result<NodeKind> {
        Ok(self.record(key)?.kind())
    }

    fn struct_of(&self, key: NodeKey) -> Result<StructDelegate> {
        self.record(key)?
            .as_struct()
            .copied()
            .ok_or_else(|| XylemError::StoreCorrupt {
                detail: format!("node {key} is not structural"),
            })
    }

    fn parent_of(&self, key: NodeKey) -> Result<NodeKey> {
        self.record(key)?
            .parent()
            .ok_or_else(|| XylemError::StoreCorrupt {
                detail: format!("node {key} has no parent"),
            })
    }

    fn value_of(&self, key: NodeKey) -> Result<String> {
        value_string(self.record(key)?).ok_or_else(|| XylemError::StoreCorrupt {
            detail: format!("node {key} has no value"),
        })
    }

    fn dewey_of(&self, key: NodeKey) -> Result<DeweyId> {
        self.record(key)?
            .dewey_id()
            .cloned()
            .ok_or_else(|| XylemError::StoreCorrupt {
                detail: format!("node {key} has no order key"),
            })
    }

    fn wrong_kind(&self, expected: &'static str) -> XylemError {
        let found = self
            .record(self.cur)
            .map_or("a missing node", |r| r.kind().as_str());
        XylemError::WrongCurrentNode { expected, found }
    }

    /// Path-node key of `key` when it is a name node, else the root path.
    fn name_path_key_of(&self, key: NodeKey) -> Result<u64> {
        Ok(self
            .record(key)?
            .as_name()
            .map_or(ROOT_PATH_NODE, |n| n.path_node_key))
    }

    /// Path-node key a change notification for `record` is filed under.
    fn notify_path_key_for(&self, record: &NodeRecord) -> Result<u64> {
        if let Some(name) = record.as_name() {
            return Ok(name.path_node_key);
        }
        match record.parent() {
            Some(parent) => self.name_path_key_of(parent),
            None => Ok(ROOT_PATH_NODE),
        }
    }

    fn assert_not_closed(&self) -> Result<()> {
        if self.closed {
            Err(XylemError::TrxClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Count the modification and run the size-triggered intermediate
    /// commit when the threshold is exceeded.
    fn check_access_and_commit(&mut self) -> Result<()> {
        self.assert_not_closed()?;
        self.modification_count += 1;
        if self.max_node_count > 0 && self.modification_count > self.max_node_count {
            self.commit(None)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Insert anchors and order keys
    // -----------------------------------------------------------------------

    /// Resolve `(parent, left, right)` for an insert relative to the cursor.
    fn resolve_insert_anchor(
        &self,
        pos: InsertPosition,
    ) -> Result<(NodeKey, Option<NodeKey>, Option<NodeKey>)> {
        let anchor = self.cur;
        let record = self.record(anchor)?;
        let s = record
            .as_struct()
            .ok_or_else(|| self.wrong_kind("a structural node"))?;
        match pos {
            InsertPosition::AsFirstChild => Ok((anchor, None, s.first_child)),
            InsertPosition::AsLeftSibling => {
                let parent = record
                    .parent()
                    .ok_or_else(|| self.wrong_kind("a non-root structural node"))?;
                Ok((parent, s.left_sibling, Some(anchor)))
            }
            InsertPosition::AsRightSibling => {
                let parent = record
                    .parent()
                    .ok_or_else(|| self.wrong_kind("a non-root structural node"))?;
                Ok((parent, Some(anchor), s.right_sibling))
            }
        }
    }

    /// Reject a second element child under the document root.
    fn ensure_root_accepts_element(&self, parent: NodeKey) -> Result<()> {
        if self.kind_of(parent)? != NodeKind::DocumentRoot {
            return Ok(());
        }
        for child in axis::children(&*self.page, parent)? {
            if self.kind_of(child)? == NodeKind::Element {
                return Err(XylemError::SecondRootElement);
            }
        }
        Ok(())
    }

    /// Order key for a node inserted at `pos` relative to the cursor.
    fn new_position_dewey(&self, pos: InsertPosition) -> Result<Option<DeweyId>> {
        if !self.dewey_ids {
            return Ok(None);
        }
        let s = self.struct_of(self.cur)?;
        let id = match pos {
            InsertPosition::AsFirstChild => match s.first_child {
                Some(fc) => DeweyId::new_between(None, Some(&self.dewey_of(fc)?)),
                None => Some(self.dewey_of(self.cur)?.new_child()),
            },
            InsertPosition::AsLeftSibling => {
                let cur_id = self.dewey_of(self.cur)?;
                match s.left_sibling {
                    Some(l) => DeweyId::new_between(Some(&self.dewey_of(l)?), Some(&cur_id)),
                    None => DeweyId::new_between(None, Some(&cur_id)),
                }
            }
            InsertPosition::AsRightSibling => {
                let cur_id = self.dewey_of(self.cur)?;
                match s.right_sibling {
                    Some(r) => DeweyId::new_between(Some(&cur_id), Some(&self.dewey_of(r)?)),
                    None => DeweyId::new_between(Some(&cur_id), None),
                }
            }
        };
        id.map(Some).ok_or_else(|| XylemError::StoreCorrupt {
            detail: "order key generation failed".to_owned(),
        })
    }

    fn new_attribute_dewey(&self, element: NodeKey) -> Result<Option<DeweyId>> {
        if !self.dewey_ids {
            return Ok(None);
        }
        let record = self.record(element)?;
        let last = record
            .as_element()
            .and_then(|e| e.attribute_keys.last().copied());
        let id = match last {
            Some(att) => DeweyId::new_between(Some(&self.dewey_of(att)?), None),
            None => Some(self.dewey_of(element)?.new_attribute()),
        };
        id.map(Some).ok_or_else(|| XylemError::StoreCorrupt {
            detail: "attribute order key generation failed".to_owned(),
        })
    }

    fn new_namespace_dewey(&self, element: NodeKey) -> Result<Option<DeweyId>> {
        if !self.dewey_ids {
            return Ok(None);
        }
        let record = self.record(element)?;
        let last = record
            .as_element()
            .and_then(|e| e.namespace_keys.last().copied());
        let id = match last {
            Some(ns) => DeweyId::new_between(Some(&self.dewey_of(ns)?), None),
            None => Some(self.dewey_of(element)?.new_namespace()),
        };
        id.map(Some).ok_or_else(|| XylemError::StoreCorrupt {
            detail: "namespace order key generation failed".to_owned(),
        })
    }

    // -----------------------------------------------------------------------
    // Topology surgery
    // -----------------------------------------------------------------------

    /// Splice a freshly created structural node into the sibling chain.
    fn adapt_for_insert(&mut self, new_key: NodeKey) -> Result<()> {
        let (parent, left, right) = {
            let record = self.record(new_key)?;
            let s = record
                .as_struct()
                .copied()
                .ok_or_else(|| XylemError::StoreCorrupt {
                    detail: format!("inserted node {new_key} is not structural"),
                })?;
            (self.parent_of(new_key)?, s.left_sibling, s.right_sibling)
        };
        {
            let rec = self.page.prepare_entry_for_modification(parent)?;
            let s = rec.as_struct_mut().ok_or_else(|| XylemError::StoreCorrupt {
                detail: format!("parent {parent} is not structural"),
            })?;
            s.child_count += 1;
            if left.is_none() {
                s.first_child = Some(new_key);
            }
        }
        if let Some(r) = right {
            if let Some(s) = self.page.prepare_entry_for_modification(r)?.as_struct_mut() {
                s.left_sibling = Some(new_key);
            }
        }
        if let Some(l) = left {
            if let Some(s) = self.page.prepare_entry_for_modification(l)?.as_struct_mut() {
                s.right_sibling = Some(new_key);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Hash and descendant-count maintenance
    // -----------------------------------------------------------------------

    fn adapt_hashes_with_add(&mut self) -> Result<()> {
        if self.bulk_insert {
            return Ok(());
        }
        match self.hash_mode {
            HashMode::Rolling => self.rolling_add(),
            HashMode::Postorder => {
                self.update_ancestor_counts_add()?;
                self.postorder_recompute_to_root()
            }
            HashMode::None => self.update_ancestor_counts_add(),
        }
    }

    /// Remove-side adaptation; runs after the entries are gone, using the
    /// pre-removal snapshot of the removed root.
    fn adapt_hashes_with_remove(
        &mut self,
        parent: Option<NodeKey>,
        removed_hash: i64,
        removed_desc: Option<u64>,
    ) -> Result<()> {
        if self.bulk_insert {
            return Ok(());
        }
        match self.hash_mode {
            HashMode::Rolling => self.rolling_remove(parent, removed_hash, removed_desc),
            HashMode::Postorder => {
                self.update_ancestor_counts_remove(parent, removed_desc)?;
                if let Some(p) = parent {
                    let saved = self.cur;
                    self.cur = p;
                    let result = self.postorder_recompute_to_root();
                    self.cur = saved;
                    result?;
                }
                Ok(())
            }
            HashMode::None => self.update_ancestor_counts_remove(parent, removed_desc),
        }
    }

    fn adapt_hashes_with_update(&mut self, old_image: i64) -> Result<()> {
        if self.bulk_insert {
            return Ok(());
        }
        match self.hash_mode {
            HashMode::Rolling => self.rolling_update(old_image),
            HashMode::Postorder => self.postorder_recompute_to_root(),
            HashMode::None => Ok(()),
        }
    }

    /// Propagate a descendant-count increase from the cursor to the root.
    fn update_ancestor_counts_add(&mut self) -> Result<()> {
        let (parent, desc) = {
            let record = self.record(self.cur)?;
            (
                record.parent(),
                record.as_struct().map(|s| s.descendant_count),
            )
        };
        let Some(desc) = desc else {
            return Ok(());
        };
        let add = desc + 1;
        let mut key_opt = parent;
        while let Some(key) = key_opt {
            let rec = self.page.prepare_entry_for_modification(key)?;
            if let Some(s) = rec.as_struct_mut() {
                s.descendant_count += add;
            }
            key_opt = rec.parent();
        }
        Ok(())
    }

    fn update_ancestor_counts_remove(
        &mut self,
        parent: Option<NodeKey>,
        removed_desc: Option<u64>,
    ) -> Result<()> {
        let Some(desc) = removed_desc else {
            return Ok(());
        };
        let sub = desc + 1;
        let mut key_opt = parent;
        while let Some(key) = key_opt {
            let rec = self.page.prepare_entry_for_modification(key)?;
            if let Some(s) = rec.as_struct_mut() {
                s.descendant_count -= sub;
            }
            key_opt = rec.parent();
        }
        Ok(())
    }

    /// Rolling path-to-root update after an addition at the cursor.
    ///
    /// The start node keeps its hash when it already carries one (a moved
    /// subtree root); a fresh node starts from its image hash.
    fn rolling_add(&mut self) -> Result<()> {
        let start_key = self.cur;
        let (start_parent, start_hash, start_desc, start_image) = {
            let record = self.record(start_key)?;
            (
                record.parent(),
                record.hash(),
                record.as_struct().map(|s| s.descendant_count),
                image_hash(record),
            )
        };
        let desc_add = start_desc.map(|d| d + 1);
        let mut hash_to_add = if start_hash == 0 { start_image } else { start_hash };
        let mut possible_old: i64 = 0;
        let mut key = start_key;
        loop {
            let rec = self.page.prepare_entry_for_modification(key)?;
            let new_hash = if key == start_key {
                hash_to_add
            } else if Some(key) == start_parent {
                possible_old = rec.hash();
                let new_hash = possible_old.wrapping_add(hash_to_add.wrapping_mul(PRIME));
                hash_to_add = new_hash;
                new_hash
            } else {
                let old = rec.hash();
                let new_hash = old
                    .wrapping_sub(possible_old.wrapping_mul(PRIME))
                    .wrapping_add(hash_to_add.wrapping_mul(PRIME));
                hash_to_add = new_hash;
                possible_old = old;
                new_hash
            };
            if key != start_key {
                if let (Some(add), Some(s)) = (desc_add, rec.as_struct_mut()) {
                    s.descendant_count += add;
                }
            }
            rec.set_hash(new_hash);
            match rec.parent() {
                Some(p) => key = p,
                None => break,
            }
        }
        Ok(())
    }

    /// Rolling path-to-root update after a removal below `parent`.
    fn rolling_remove(
        &mut self,
        parent: Option<NodeKey>,
        removed_hash: i64,
        removed_desc: Option<u64>,
    ) -> Result<()> {
        let desc_sub = removed_desc.map(|d| d + 1);
        let mut hash_to_remove = removed_hash;
        let mut hash_to_add: i64 = 0;
        let mut first = true;
        let mut key_opt = parent;
        while let Some(key) = key_opt {
            let rec = self.page.prepare_entry_for_modification(key)?;
            let old = rec.hash();
            let new_hash = if first {
                old.wrapping_sub(hash_to_remove.wrapping_mul(PRIME))
            } else {
                old.wrapping_sub(hash_to_remove.wrapping_mul(PRIME))
                    .wrapping_add(hash_to_add.wrapping_mul(PRIME))
            };
            hash_to_remove = old;
            hash_to_add = new_hash;
            if let (Some(sub), Some(s)) = (desc_sub, rec.as_struct_mut()) {
                s.descendant_count -= sub;
            }
            rec.set_hash(new_hash);
            first = false;
            key_opt = rec.parent();
        }
        Ok(())
    }

    /// Rolling path-to-root update after the cursor node's image changed.
    ///
    /// Tracks the replaced contribution per level so a from-scratch
    /// post-order recomputation reproduces every stored hash.
    fn rolling_update(&mut self, old_image: i64) -> Result<()> {
        let start_key = self.cur;
        let new_image = image_hash(self.record(start_key)?);
        let (mut prev_old, mut prev_new, mut key_opt) = {
            let rec = self.page.prepare_entry_for_modification(start_key)?;
            let old = rec.hash();
            let new = old.wrapping_sub(old_image).wrapping_add(new_image);
            rec.set_hash(new);
            (old, new, rec.parent())
        };
        while let Some(key) = key_opt {
            let rec = self.page.prepare_entry_for_modification(key)?;
            let old = rec.hash();
            let new = old
                .wrapping_sub(prev_old.wrapping_mul(PRIME))
                .wrapping_add(prev_new.wrapping_mul(PRIME));
            rec.set_hash(new);
            prev_old = old;
            prev_new = new;
            key_opt = rec.parent();
        }
        Ok(())
    }

    /// `H(image) + PRIME * Σ hash(child)` over namespaces, attributes and
    /// structural children, from the currently stored child hashes.
    fn postorder_node_hash(&self, key: NodeKey) -> Result<i64> {
        let record = self.record(key)?;
        let mut hash = image_hash(record);
        if let Some(element) = record.as_element() {
            for &sub in element.namespace_keys.iter().chain(&element.attribute_keys) {
                hash = fold_child(hash, self.record(sub)?.hash());
            }
        }
        if let Some(s) = record.as_struct() {
            let mut child = s.first_child;
            while let Some(c) = child {
                let crec = self.record(c)?;
                hash = fold_child(hash, crec.hash());
                child = crec.as_struct().and_then(|cs| cs.right_sibling);
            }
        }
        Ok(hash)
    }

    /// Recompute the cursor node and every ancestor bottom-up.
    fn postorder_recompute_to_root(&mut self) -> Result<()> {
        let mut key = self.cur;
        if self.record(key)?.as_struct().is_none() {
            let image = image_hash(self.record(key)?);
            self.page.prepare_entry_for_modification(key)?.set_hash(image);
            match self.record(key)?.parent() {
                Some(p) => key = p,
                None => return Ok(()),
            }
        }
        loop {
            let hash = self.postorder_node_hash(key)?;
            self.page.prepare_entry_for_modification(key)?.set_hash(hash);
            match self.record(key)?.parent() {
                Some(p) => key = p,
                None => break,
            }
        }
        Ok(())
    }

    /// Post-order hash and descendant-count recomputation over a subtree
    /// (used after bulk insert).
    fn postorder_recompute_subtree(&mut self, root: NodeKey) -> Result<()> {
        let with_hashes = self.hash_mode != HashMode::None;
        for key in axis::post_order(&*self.page, root)? {
            let subs: Vec<NodeKey> = self
                .record(key)?
                .as_element()
                .map(|e| {
                    e.namespace_keys
                        .iter()
                        .chain(&e.attribute_keys)
                        .copied()
                        .collect()
                })
                .unwrap_or_default();
            if with_hashes {
                for sub in subs {
                    let image = image_hash(self.record(sub)?);
                    self.page.prepare_entry_for_modification(sub)?.set_hash(image);
                }
            }
            let mut desc = 0u64;
            for child in axis::children(&*self.page, key)? {
                desc += self.struct_of(child)?.descendant_count + 1;
            }
            let hash = if with_hashes {
                Some(self.postorder_node_hash(key)?)
            } else {
                None
            };
            let rec = self.page.prepare_entry_for_modification(key)?;
            if let Some(s) = rec.as_struct_mut() {
                s.descendant_count = desc;
            }
            if let Some(h) = hash {
                rec.set_hash(h);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Value updates
    // -----------------------------------------------------------------------

    /// Overwrite a value node's bytes and adapt hashes; no index
    /// notifications (callers decide).
    fn update_value_with_hash(&mut self, key: NodeKey, value: Vec<u8>) -> Result<()> {
        let old_image = image_hash(self.record(key)?);
        {
            let rec = self.page.prepare_entry_for_modification(key)?;
            let val = rec
                .as_value_mut()
                .ok_or_else(|| XylemError::StoreCorrupt {
                    detail: format!("node {key} has no value"),
                })?;
            val.value = value;
        }
        let saved = self.cur;
        self.cur = key;
        let result = self.adapt_hashes_with_update(old_image);
        self.cur = saved;
        result
    }

    // -----------------------------------------------------------------------
    // Index notification helpers
    // -----------------------------------------------------------------------

    fn notify(&mut self, change: ChangeType, key: NodeKey) -> Result<()> {
        let record = self.record(key)?.clone();
        let path = self.notify_path_key_for(&record)?;
        self.index_controller.notify_change(change, &record, path)
    }

    /// One notification per node of a subtree (elements, then namespaces
    /// and attributes, then children), in document order.
    fn notify_subtree(&mut self, root: NodeKey, change: ChangeType) -> Result<()> {
        for key in axis::descendants(&*self.page, root)? {
            self.notify(change, key)?;
            let subs: Vec<NodeKey> = self
                .record(key)?
                .as_element()
                .map(|e| {
                    e.namespace_keys
                        .iter()
                        .chain(&e.attribute_keys)
                        .copied()
                        .collect()
                })
                .unwrap_or_default();
            for sub in subs {
                self.notify(change, sub)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Element insert
    // -----------------------------------------------------------------------

    fn insert_element(&mut self, name: &QName, pos: InsertPosition) -> Result<()> {
        if !name.is_valid() {
            return Err(XylemError::InvalidQName {
                name: name.to_string(),
            });
        }
        match pos {
            InsertPosition::AsFirstChild => {
                let kind = self.kind_of(self.cur)?;
                if kind != NodeKind::Element && kind != NodeKind::DocumentRoot {
                    return Err(self.wrong_kind("an element or the document root"));
                }
            }
            _ => {
                let record = self.record(self.cur)?;
                if record.as_struct().is_none() || record.kind() == NodeKind::DocumentRoot {
                    return Err(self.wrong_kind("a non-root structural node"));
                }
            }
        }
        let (parent, left, right) = self.resolve_insert_anchor(pos)?;
        self.ensure_root_accepts_element(parent)?;
        self.check_access_and_commit()?;

        let parent_path = self.name_path_key_of(parent)?;
        let path_key = match self.path_summary.as_mut() {
            Some(ps) => ps.get_path_node_key(parent_path, name, NodeKind::Element)?,
            None => 0,
        };
        let dewey = self.new_position_dewey(pos)?;
        let key =
            self.factory
                .create_element(&mut *self.page, parent, left, right, name, path_key, dewey)?;
        self.cur = key;
        self.adapt_for_insert(key)?;
        self.adapt_hashes_with_add()?;
        self.notify(ChangeType::Insert, key)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Text insert (with sibling merging)
    // -----------------------------------------------------------------------

    fn insert_text(&mut self, value: &str, pos: InsertPosition) -> Result<()> {
        if value.is_empty() {
            return Err(XylemError::EmptyTextValue);
        }
        if pos == InsertPosition::AsFirstChild {
            let kind = self.kind_of(self.cur)?;
            if kind != NodeKind::Element && kind != NodeKind::DocumentRoot {
                return Err(self.wrong_kind("an element or the document root"));
            }
        }
        let (parent, left, right) = self.resolve_insert_anchor(pos)?;
        if self.kind_of(parent)? == NodeKind::DocumentRoot {
            return Err(XylemError::TextUnderDocumentRoot);
        }
        self.check_access_and_commit()?;

        // Merge with an adjacent text node instead of creating a new one.
        match pos {
            InsertPosition::AsFirstChild => {
                if let Some(fc) = right {
                    if self.kind_of(fc)? == NodeKind::Text {
                        let merged = format!("{value}{}", self.value_of(fc)?);
                        self.update_value_with_hash(fc, merged.into_bytes())?;
                        self.cur = fc;
                        return Ok(());
                    }
                }
            }
            InsertPosition::AsLeftSibling => {
                if self.kind_of(self.cur)? == NodeKind::Text {
                    let anchor = self.cur;
                    let merged = format!("{value}{}", self.value_of(anchor)?);
                    self.update_value_with_hash(anchor, merged.into_bytes())?;
                    return Ok(());
                }
                if let Some(l) = left {
                    if self.kind_of(l)? == NodeKind::Text {
                        let merged = format!("{}{value}", self.value_of(l)?);
                        self.update_value_with_hash(l, merged.into_bytes())?;
                        self.cur = l;
                        return Ok(());
                    }
                }
            }
            InsertPosition::AsRightSibling => {
                if self.kind_of(self.cur)? == NodeKind::Text {
                    let anchor = self.cur;
                    let merged = format!("{}{value}", self.value_of(anchor)?);
                    self.update_value_with_hash(anchor, merged.into_bytes())?;
                    return Ok(());
                }
                if let Some(r) = right {
                    if self.kind_of(r)? == NodeKind::Text {
                        let merged = format!("{value}{}", self.value_of(r)?);
                        self.update_value_with_hash(r, merged.into_bytes())?;
                        self.cur = r;
                        return Ok(());
                    }
                }
            }
        }

        let dewey = self.new_position_dewey(pos)?;
        let key = self.factory.create_text(
            &mut *self.page,
            parent,
            left,
            right,
            value.as_bytes().to_vec(),
            self.compression,
            dewey,
        )?;
        self.cur = key;
        self.adapt_for_insert(key)?;
        self.adapt_hashes_with_add()?;
        self.notify(ChangeType::Insert, key)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Comment and processing-instruction insert
    // -----------------------------------------------------------------------

    fn insert_comment(&mut self, value: &str, pos: InsertPosition) -> Result<()> {
        if !qname::is_valid_comment(value) {
            return Err(XylemError::CommentContentForbidden);
        }
        if pos == InsertPosition::AsFirstChild {
            let kind = self.kind_of(self.cur)?;
            if kind != NodeKind::Element && kind != NodeKind::DocumentRoot {
                return Err(self.wrong_kind("an element or the document root"));
            }
        }
        let (parent, left, right) = self.resolve_insert_anchor(pos)?;
        self.check_access_and_commit()?;

        let dewey = self.new_position_dewey(pos)?;
        let key = self.factory.create_comment(
            &mut *self.page,
            parent,
            left,
            right,
            value.as_bytes().to_vec(),
            self.compression,
            dewey,
        )?;
        self.cur = key;
        self.adapt_for_insert(key)?;
        self.adapt_hashes_with_add()?;
        self.notify(ChangeType::Insert, key)?;
        Ok(())
    }

    fn insert_pi(&mut self, target: &str, content: &str, pos: InsertPosition) -> Result<()> {
        if !qname::is_nc_name(target) {
            return Err(XylemError::InvalidPiTarget {
                target: target.to_owned(),
            });
        }
        if !qname::is_valid_pi_content(content) {
            return Err(XylemError::PiContentForbidden);
        }
        if pos == InsertPosition::AsFirstChild {
            let kind = self.kind_of(self.cur)?;
            if kind != NodeKind::Element && kind != NodeKind::DocumentRoot {
                return Err(self.wrong_kind("an element or the document root"));
            }
        }
        let (parent, left, right) = self.resolve_insert_anchor(pos)?;
        self.check_access_and_commit()?;

        let name = QName::local(target);
        let parent_path = self.name_path_key_of(parent)?;
        let path_key = match self.path_summary.as_mut() {
            Some(ps) => {
                ps.get_path_node_key(parent_path, &name, NodeKind::ProcessingInstruction)?
            }
            None => 0,
        };
        let dewey = self.new_position_dewey(pos)?;
        let key = self.factory.create_pi(
            &mut *self.page,
            parent,
            left,
            right,
            &name,
            content.as_bytes().to_vec(),
            self.compression,
            path_key,
            dewey,
        )?;
        self.cur = key;
        self.adapt_for_insert(key)?;
        self.adapt_hashes_with_add()?;
        self.notify(ChangeType::Insert, key)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Attribute and namespace insert
    // -----------------------------------------------------------------------

    fn find_attribute_by_name(
        &self,
        element: NodeKey,
        name: &QName,
    ) -> Result<Option<NodeKey>> {
        let keys: Vec<NodeKey> = self
            .record(element)?
            .as_element()
            .map(|e| e.attribute_keys.clone())
            .unwrap_or_default();
        for key in keys {
            let record = self.record(key)?;
            if let Some(q) = resolve_qname(&*self.page, record) {
                if q.prefix() == name.prefix() && q.local_name() == name.local_name() {
                    return Ok(Some(key));
                }
            }
        }
        Ok(None)
    }

    fn insert_attribute(&mut self, name: &QName, value: &str, movement: Movement) -> Result<()> {
        if !name.is_valid() {
            return Err(XylemError::InvalidQName {
                name: name.to_string(),
            });
        }
        let element = self.cur;
        if self.kind_of(element)? != NodeKind::Element {
            return Err(self.wrong_kind("an element"));
        }
        self.check_access_and_commit()?;

        // A same-named attribute gets its value overwritten in place.
        if let Some(existing) = self.find_attribute_by_name(element, name)? {
            let record = self.record(existing)?.clone();
            let path = record.as_name().map_or(0, |n| n.path_node_key);
            self.index_controller
                .notify_change(ChangeType::Delete, &record, path)?;
            self.update_value_with_hash(existing, value.as_bytes().to_vec())?;
            let updated = self.record(existing)?.clone();
            self.index_controller
                .notify_change(ChangeType::Insert, &updated, path)?;
            self.cur = match movement {
                Movement::ToParent => element,
                Movement::None => existing,
            };
            return Ok(());
        }

        let parent_path = self.name_path_key_of(element)?;
        let path_key = match self.path_summary.as_mut() {
            Some(ps) => ps.get_path_node_key(parent_path, name, NodeKind::Attribute)?,
            None => 0,
        };
        let dewey = self.new_attribute_dewey(element)?;
        let key = self.factory.create_attribute(
            &mut *self.page,
            element,
            name,
            value.as_bytes().to_vec(),
            path_key,
            dewey,
        )?;
        {
            let rec = self.page.prepare_entry_for_modification(element)?;
            let el = rec
                .as_element_mut()
                .ok_or_else(|| XylemError::StoreCorrupt {
                    detail: format!("attribute owner {element} is not an element"),
                })?;
            el.attribute_keys.push(key);
        }
        self.cur = key;
        self.adapt_hashes_with_add()?;
        self.notify(ChangeType::Insert, key)?;
        if movement == Movement::ToParent {
            self.cur = element;
        }
        Ok(())
    }

    fn insert_namespace(&mut self, name: &QName, movement: Movement) -> Result<()> {
        if !name.is_valid() {
            return Err(XylemError::InvalidQName {
                name: name.to_string(),
            });
        }
        let element = self.cur;
        if self.kind_of(element)? != NodeKind::Element {
            return Err(self.wrong_kind("an element"));
        }
        let existing: Vec<NodeKey> = self
            .record(element)?
            .as_element()
            .map(|e| e.namespace_keys.clone())
            .unwrap_or_default();
        for key in existing {
            let record = self.record(key)?;
            if let Some(q) = resolve_qname(&*self.page, record) {
                if q.prefix() == name.prefix() {
                    return Err(XylemError::DuplicateNamespacePrefix {
                        prefix: name.prefix().to_owned(),
                    });
                }
            }
        }
        self.check_access_and_commit()?;

        let parent_path = self.name_path_key_of(element)?;
        let path_key = match self.path_summary.as_mut() {
            Some(ps) => ps.get_path_node_key(parent_path, name, NodeKind::Namespace)?,
            None => 0,
        };
        let dewey = self.new_namespace_dewey(element)?;
        let key =
            self.factory
                .create_namespace(&mut *self.page, element, name, path_key, dewey)?;
        {
            let rec = self.page.prepare_entry_for_modification(element)?;
            let el = rec
                .as_element_mut()
                .ok_or_else(|| XylemError::StoreCorrupt {
                    detail: format!("namespace owner {element} is not an element"),
                })?;
            el.namespace_keys.push(key);
        }
        self.cur = key;
        self.adapt_hashes_with_add()?;
        self.notify(ChangeType::Insert, key)?;
        if movement == Movement::ToParent {
            self.cur = element;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    fn remove_current(&mut self) -> Result<()> {
        self.assert_not_closed()?;
        match self.kind_of(self.cur)? {
            NodeKind::DocumentRoot => Err(XylemError::DocumentRootRemoval),
            NodeKind::Attribute => {
                self.check_access_and_commit()?;
                self.remove_attribute_current()
            }
            NodeKind::Namespace => {
                self.check_access_and_commit()?;
                self.remove_namespace_current()
            }
            _ => {
                self.check_access_and_commit()?;
                self.remove_structural_current()
            }
        }
    }

    /// Release name-page and path-summary references held by `record`.
    fn remove_name_bookkeeping(&mut self, record: &NodeRecord) {
        let kind = record.kind();
        if let Some(name) = record.as_name() {
            if let Some(k) = name.prefix_key {
                self.page.remove_name(k, kind);
            }
            if let Some(k) = name.local_name_key {
                self.page.remove_name(k, kind);
            }
            if let Some(k) = name.uri_key {
                self.page.remove_name(k, NodeKind::Namespace);
            }
            if let Some(ps) = self.path_summary.as_mut() {
                ps.remove(name.path_node_key, kind);
            }
        }
    }

    fn remove_structural_current(&mut self) -> Result<()> {
        let root = self.cur;
        let root_record = self.record(root)?.clone();
        let root_struct =
            root_record
                .as_struct()
                .copied()
                .ok_or_else(|| XylemError::StoreCorrupt {
                    detail: format!("removal target {root} is not structural"),
                })?;
        let parent = self.parent_of(root)?;

        // Tear down the subtree post-order: notifications, name references,
        // non-structural children, then the entries themselves.
        for key in axis::post_order(&*self.page, root)? {
            let record = self.record(key)?.clone();
            let subs: Vec<NodeKey> = record
                .as_element()
                .map(|e| {
                    e.namespace_keys
                        .iter()
                        .chain(&e.attribute_keys)
                        .copied()
                        .collect()
                })
                .unwrap_or_default();
            for sub in subs {
                let sub_record = self.record(sub)?.clone();
                let sub_path = sub_record.as_name().map_or(0, |n| n.path_node_key);
                self.index_controller
                    .notify_change(ChangeType::Delete, &sub_record, sub_path)?;
                self.remove_name_bookkeeping(&sub_record);
                self.page.remove_entry(sub)?;
            }
            let path = self.notify_path_key_for(&record)?;
            self.index_controller
                .notify_change(ChangeType::Delete, &record, path)?;
            self.remove_name_bookkeeping(&record);
            self.page.remove_entry(key)?;
        }

        // Re-link neighbours (merging adjacent texts), then adapt hashes
        // and descendant counts for the removed subtree.
        self.adapt_for_remove(root, &root_struct, parent)?;
        self.adapt_hashes_with_remove(
            Some(parent),
            root_record.hash(),
            Some(root_struct.descendant_count),
        )?;

        // New cursor: right sibling if it survived the merge, else left
        // sibling, else parent.
        if let Some(r) = root_struct.right_sibling {
            if self.page.get_record(r).is_some() {
                self.cur = r;
                return Ok(());
            }
        }
        if let Some(l) = root_struct.left_sibling {
            self.cur = l;
        } else {
            self.cur = parent;
        }
        Ok(())
    }

    /// Pointer surgery around a removed structural node, including the
    /// text-merge of its former neighbours.
    fn adapt_for_remove(
        &mut self,
        root: NodeKey,
        s: &StructDelegate,
        parent: NodeKey,
    ) -> Result<()> {
        let concat = match (s.left_sibling, s.right_sibling) {
            (Some(l), Some(r)) => {
                self.kind_of(l)? == NodeKind::Text && self.kind_of(r)? == NodeKind::Text
            }
            _ => false,
        };

        if concat {
            let (l, r) = match (s.left_sibling, s.right_sibling) {
                (Some(l), Some(r)) => (l, r),
                _ => unreachable!("concat requires both siblings"),
            };
            let right_record = self.record(r)?.clone();
            let right_struct = self.struct_of(r)?;
            let merged = format!("{}{}", self.value_of(l)?, self.value_of(r)?);

            // Link the left text past the removed node and the right text.
            if let Some(sd) = self.page.prepare_entry_for_modification(l)?.as_struct_mut() {
                sd.right_sibling = right_struct.right_sibling;
            }
            if let Some(rr) = right_struct.right_sibling {
                if let Some(sd) = self.page.prepare_entry_for_modification(rr)?.as_struct_mut() {
                    sd.left_sibling = Some(l);
                }
            }
            {
                let rec = self.page.prepare_entry_for_modification(parent)?;
                if let Some(sd) = rec.as_struct_mut() {
                    sd.child_count -= 2;
                }
            }
            let path = self.notify_path_key_for(&right_record)?;
            self.index_controller
                .notify_change(ChangeType::Delete, &right_record, path)?;
            self.page.remove_entry(r)?;
            self.adapt_hashes_with_remove(
                Some(parent),
                right_record.hash(),
                Some(right_struct.descendant_count),
            )?;
            self.update_value_with_hash(l, merged.into_bytes())?;
        } else {
            if let Some(l) = s.left_sibling {
                if let Some(sd) = self.page.prepare_entry_for_modification(l)?.as_struct_mut() {
                    sd.right_sibling = s.right_sibling;
                }
            }
            if let Some(r) = s.right_sibling {
                if let Some(sd) = self.page.prepare_entry_for_modification(r)?.as_struct_mut() {
                    sd.left_sibling = s.left_sibling;
                }
            }
            let rec = self.page.prepare_entry_for_modification(parent)?;
            if let Some(sd) = rec.as_struct_mut() {
                if sd.first_child == Some(root) {
                    sd.first_child = s.right_sibling;
                }
                sd.child_count -= 1;
            }
        }
        Ok(())
    }

    fn remove_attribute_current(&mut self) -> Result<()> {
        let key = self.cur;
        let record = self.record(key)?.clone();
        let parent = self.parent_of(key)?;
        {
            let rec = self.page.prepare_entry_for_modification(parent)?;
            let el = rec
                .as_element_mut()
                .ok_or_else(|| XylemError::StoreCorrupt {
                    detail: format!("attribute owner {parent} is not an element"),
                })?;
            el.attribute_keys.retain(|k| *k != key);
        }
        let path = record.as_name().map_or(0, |n| n.path_node_key);
        self.index_controller
            .notify_change(ChangeType::Delete, &record, path)?;
        self.remove_name_bookkeeping(&record);
        self.page.remove_entry(key)?;
        self.adapt_hashes_with_remove(Some(parent), record.hash(), None)?;
        self.cur = parent;
        Ok(())
    }

    fn remove_namespace_current(&mut self) -> Result<()> {
        let key = self.cur;
        let record = self.record(key)?.clone();
        let parent = self.parent_of(key)?;
        {
            let rec = self.page.prepare_entry_for_modification(parent)?;
            let el = rec
                .as_element_mut()
                .ok_or_else(|| XylemError::StoreCorrupt {
                    detail: format!("namespace owner {parent} is not an element"),
                })?;
            el.namespace_keys.retain(|k| *k != key);
        }
        let path = record.as_name().map_or(0, |n| n.path_node_key);
        self.index_controller
            .notify_change(ChangeType::Delete, &record, path)?;
        self.remove_name_bookkeeping(&record);
        self.page.remove_entry(key)?;
        self.adapt_hashes_with_remove(Some(parent), record.hash(), None)?;
        self.cur = parent;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // setName / setValue
    // -----------------------------------------------------------------------

    fn set_name(&mut self, name: &QName) -> Result<()> {
        if !name.is_valid() {
            return Err(XylemError::InvalidQName {
                name: name.to_string(),
            });
        }
        let key = self.cur;
        {
            let record = self.record(key)?;
            if record.as_name().is_none() {
                return Err(self.wrong_kind("a name node"));
            }
            if resolve_qname(&*self.page, record).as_ref() == Some(name) {
                return Ok(());
            }
        }
        self.check_access_and_commit()?;

        let record = self.record(key)?.clone();
        let kind = record.kind();
        let old_image = image_hash(&record);
        let old_name = record
            .as_name()
            .copied()
            .ok_or_else(|| XylemError::StoreCorrupt {
                detail: format!("name node {key} lost its name"),
            })?;

        if let Some(k) = old_name.prefix_key {
            self.page.remove_name(k, kind);
        }
        if let Some(k) = old_name.local_name_key {
            self.page.remove_name(k, kind);
        }
        if let Some(k) = old_name.uri_key {
            self.page.remove_name(k, NodeKind::Namespace);
        }

        let prefix_key = if name.prefix().is_empty() {
            None
        } else {
            Some(self.page.create_name_key(name.prefix(), kind)?)
        };
        let local_name_key = Some(self.page.create_name_key(name.local_name(), kind)?);
        let uri_key = if name.namespace_uri().is_empty() {
            None
        } else {
            Some(self.page.create_name_key(name.namespace_uri(), NodeKind::Namespace)?)
        };

        let parent_path = match record.parent() {
            Some(p) => self.name_path_key_of(p)?,
            None => ROOT_PATH_NODE,
        };
        let new_path = match self.path_summary.as_mut() {
            Some(ps) => Some(ps.adapt_path_for_changed_node(
                old_name.path_node_key,
                parent_path,
                name,
                kind,
                PathOp::SetName,
            )?),
            None => None,
        };

        {
            let rec = self.page.prepare_entry_for_modification(key)?;
            let nd = rec.as_name_mut().ok_or_else(|| XylemError::StoreCorrupt {
                detail: format!("name node {key} lost its name"),
            })?;
            nd.prefix_key = prefix_key;
            nd.local_name_key = local_name_key;
            nd.uri_key = uri_key;
            if let Some(p) = new_path {
                nd.path_node_key = p;
            }
        }
        self.adapt_hashes_with_update(old_image)?;
        Ok(())
    }

    fn set_value(&mut self, value: &str) -> Result<()> {
        if self.record(self.cur)?.as_value().is_none() {
            return Err(self.wrong_kind("a value node"));
        }
        // An empty value removes the node.
        if value.is_empty() {
            return self.remove_current();
        }
        self.check_access_and_commit()?;

        let key = self.cur;
        let record = self.record(key)?.clone();
        let path = self.notify_path_key_for(&record)?;
        self.index_controller
            .notify_change(ChangeType::Delete, &record, path)?;
        self.update_value_with_hash(key, value.as_bytes().to_vec())?;
        let updated = self.record(key)?.clone();
        self.index_controller
            .notify_change(ChangeType::Insert, &updated, path)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Move
    // -----------------------------------------------------------------------

    fn check_ancestors(&self, from: NodeKey) -> Result<()> {
        let mut key_opt = Some(self.cur);
        while let Some(key) = key_opt {
            if key == from {
                return Err(XylemError::MoveIntoOwnSubtree);
            }
            key_opt = self.record(key)?.parent();
        }
        Ok(())
    }

    fn move_subtree_to_left_sibling(&mut self, from: NodeKey) -> Result<()> {
        let s = self
            .record(self.cur)?
            .as_struct()
            .copied()
            .ok_or_else(|| self.wrong_kind("a structural node"))?;
        if let Some(l) = s.left_sibling {
            self.cur = l;
            self.move_subtree(from, InsertPosition::AsRightSibling)
        } else {
            let parent = self.parent_of(self.cur)?;
            self.cur = parent;
            self.move_subtree(from, InsertPosition::AsFirstChild)
        }
    }

    /// Relocate the subtree rooted at `from`; `pos` is first-child or
    /// right-sibling relative to the cursor.
    fn move_subtree(&mut self, from: NodeKey, pos: InsertPosition) -> Result<()> {
        if from.get() > self.page.max_node_key() {
            return Err(XylemError::KeyOutOfRange {
                key: from.get(),
                max: self.page.max_node_key(),
            });
        }
        if from == self.cur {
            return Err(XylemError::MoveOfSelf);
        }
        let from_record = self.record(from)?.clone();
        if from_record.kind() == NodeKind::DocumentRoot {
            return Err(XylemError::DocumentRootRemoval);
        }
        let from_struct =
            from_record
                .as_struct()
                .copied()
                .ok_or(XylemError::WrongCurrentNode {
                    expected: "a structural node to move",
                    found: from_record.kind().as_str(),
                })?;
        match pos {
            InsertPosition::AsFirstChild => {
                if self.kind_of(self.cur)? != NodeKind::Element {
                    return Err(self.wrong_kind("an element"));
                }
            }
            _ => {
                let record = self.record(self.cur)?;
                if record.as_struct().is_none() || record.kind() == NodeKind::DocumentRoot {
                    return Err(self.wrong_kind("a non-root structural node"));
                }
            }
        }
        self.check_ancestors(from)?;
        self.check_access_and_commit()?;

        // Already in place?
        let anchor = self.cur;
        let anchor_struct = self.struct_of(anchor)?;
        let already = match pos {
            InsertPosition::AsFirstChild => anchor_struct.first_child == Some(from),
            _ => anchor_struct.right_sibling == Some(from),
        };
        if already {
            return Ok(());
        }

        let old_parent = self.parent_of(from)?;

        self.notify_subtree(from, ChangeType::Delete)?;
        self.adapt_for_move(from, &from_struct, old_parent, anchor, pos)?;
        self.adapt_hashes_with_remove(
            Some(old_parent),
            from_record.hash(),
            Some(from_struct.descendant_count),
        )?;
        self.cur = from;
        self.adapt_hashes_with_add()?;

        // Path summary: a move that kept the parent is a no-op.
        let new_parent = self.parent_of(from)?;
        if new_parent != old_parent {
            if let Some(name) = resolve_qname(&*self.page, self.record(from)?) {
                let old_path = self.name_path_key_of(from)?;
                let parent_path = self.name_path_key_of(new_parent)?;
                let kind = self.kind_of(from)?;
                if let Some(ps) = self.path_summary.as_mut() {
                    let new_path = ps.adapt_path_for_changed_node(
                        old_path,
                        parent_path,
                        &name,
                        kind,
                        PathOp::Moved,
                    )?;
                    if let Some(nd) = self
                        .page
                        .prepare_entry_for_modification(from)?
                        .as_name_mut()
                    {
                        nd.path_node_key = new_path;
                    }
                }
            }
        }

        self.notify_subtree(from, ChangeType::Insert)?;

        if self.dewey_ids {
            self.compute_move_dewey_ids(from)?;
        }
        self.cur = from;
        Ok(())
    }

    /// Unlink `from` at its old position (merging stranded text
    /// neighbours) and splice it in at the new one.
    fn adapt_for_move(
        &mut self,
        from: NodeKey,
        fs: &StructDelegate,
        old_parent: NodeKey,
        anchor: NodeKey,
        pos: InsertPosition,
    ) -> Result<()> {
        let new_parent = match pos {
            InsertPosition::AsFirstChild => anchor,
            InsertPosition::AsRightSibling => self.parent_of(anchor)?,
            InsertPosition::AsLeftSibling => {
                return Err(XylemError::StoreCorrupt {
                    detail: "left-sibling moves are resolved before surgery".to_owned(),
                });
            }
        };

        // Unlink at the source.
        {
            let rec = self.page.prepare_entry_for_modification(old_parent)?;
            if let Some(sd) = rec.as_struct_mut() {
                if old_parent != new_parent {
                    sd.child_count -= 1;
                }
                if sd.first_child == Some(from) {
                    sd.first_child = fs.right_sibling;
                }
            }
        }
        if let Some(r) = fs.right_sibling {
            if let Some(sd) = self.page.prepare_entry_for_modification(r)?.as_struct_mut() {
                sd.left_sibling = fs.left_sibling;
            }
        }
        if let Some(l) = fs.left_sibling {
            if let Some(sd) = self.page.prepare_entry_for_modification(l)?.as_struct_mut() {
                sd.right_sibling = fs.right_sibling;
            }
        }

        // The source's neighbours may now be adjacent text nodes.
        if let (Some(l), Some(r)) = (fs.left_sibling, fs.right_sibling) {
            if self.kind_of(l)? == NodeKind::Text && self.kind_of(r)? == NodeKind::Text {
                let merged = format!("{}{}", self.value_of(l)?, self.value_of(r)?);
                // Keep the anchor alive: merge into the right node when the
                // anchor is the right text, else into the left.
                let (survivor, victim) = if r == anchor { (r, l) } else { (l, r) };
                self.remove_merged_text(victim)?;
                self.update_value_with_hash(survivor, merged.into_bytes())?;
            }
        }

        // Splice in at the destination.
        match pos {
            InsertPosition::AsFirstChild => {
                let old_first = self.struct_of(anchor)?.first_child;
                {
                    let rec = self.page.prepare_entry_for_modification(from)?;
                    rec.delegate_mut().parent = Some(anchor);
                    if let Some(sd) = rec.as_struct_mut() {
                        sd.left_sibling = None;
                        sd.right_sibling = old_first;
                    }
                }
                {
                    let rec = self.page.prepare_entry_for_modification(anchor)?;
                    if let Some(sd) = rec.as_struct_mut() {
                        sd.first_child = Some(from);
                        if old_parent != anchor {
                            sd.child_count += 1;
                        }
                    }
                }
                if let Some(of) = old_first {
                    if let Some(sd) =
                        self.page.prepare_entry_for_modification(of)?.as_struct_mut()
                    {
                        sd.left_sibling = Some(from);
                    }
                }
            }
            InsertPosition::AsRightSibling => {
                let old_right = self.struct_of(anchor)?.right_sibling;
                {
                    let rec = self.page.prepare_entry_for_modification(from)?;
                    rec.delegate_mut().parent = Some(new_parent);
                    if let Some(sd) = rec.as_struct_mut() {
                        sd.left_sibling = Some(anchor);
                        sd.right_sibling = old_right;
                    }
                }
                if let Some(sd) = self
                    .page
                    .prepare_entry_for_modification(anchor)?
                    .as_struct_mut()
                {
                    sd.right_sibling = Some(from);
                }
                if let Some(or) = old_right {
                    if let Some(sd) =
                        self.page.prepare_entry_for_modification(or)?.as_struct_mut()
                    {
                        sd.left_sibling = Some(from);
                    }
                }
                if old_parent != new_parent {
                    if let Some(sd) = self
                        .page
                        .prepare_entry_for_modification(new_parent)?
                        .as_struct_mut()
                    {
                        sd.child_count += 1;
                    }
                }
            }
            InsertPosition::AsLeftSibling => unreachable!("resolved before surgery"),
        }

        // A moved text node may now neighbour other text nodes.
        if self.kind_of(from)? == NodeKind::Text {
            self.merge_text_neighbors_into(from)?;
        }
        Ok(())
    }

    /// Remove a single text node that was merged away: pointers, counts,
    /// hashes, notification and the entry itself.
    fn remove_merged_text(&mut self, victim: NodeKey) -> Result<()> {
        let record = self.record(victim)?.clone();
        let vs = self.struct_of(victim)?;
        let parent = self.parent_of(victim)?;
        if let Some(l) = vs.left_sibling {
            if let Some(sd) = self.page.prepare_entry_for_modification(l)?.as_struct_mut() {
                sd.right_sibling = vs.right_sibling;
            }
        }
        if let Some(r) = vs.right_sibling {
            if let Some(sd) = self.page.prepare_entry_for_modification(r)?.as_struct_mut() {
                sd.left_sibling = vs.left_sibling;
            }
        }
        {
            let rec = self.page.prepare_entry_for_modification(parent)?;
            if let Some(sd) = rec.as_struct_mut() {
                if sd.first_child == Some(victim) {
                    sd.first_child = vs.right_sibling;
                }
                sd.child_count -= 1;
            }
        }
        let path = self.notify_path_key_for(&record)?;
        self.index_controller
            .notify_change(ChangeType::Delete, &record, path)?;
        self.page.remove_entry(victim)?;
        self.adapt_hashes_with_remove(Some(parent), record.hash(), Some(vs.descendant_count))?;
        Ok(())
    }

    /// Overwrite a value node's bytes, refreshing only its own stored hash.
    ///
    /// Used when the node's contribution is not yet folded into its current
    /// ancestors (a moved node before the add-side walk); the ancestor
    /// folds happen exactly once, through the pending remove/add walks.
    fn update_value_local_hash(&mut self, key: NodeKey, value: Vec<u8>) -> Result<()> {
        let old_image = image_hash(self.record(key)?);
        let with_hashes = self.hash_mode != HashMode::None && !self.bulk_insert;
        let rec = self.page.prepare_entry_for_modification(key)?;
        let val = rec
            .as_value_mut()
            .ok_or_else(|| XylemError::StoreCorrupt {
                detail: format!("node {key} has no value"),
            })?;
        val.value = value;
        if with_hashes {
            let new_image = image_hash(rec);
            let updated = rec
                .hash()
                .wrapping_sub(old_image)
                .wrapping_add(new_image);
            rec.set_hash(updated);
        }
        Ok(())
    }

    /// Fold adjacent text siblings of `from` into `from` itself.
    ///
    /// Runs between the unlink and the add-side hash walk of a move, so
    /// `from`'s own hash is refreshed locally only.
    fn merge_text_neighbors_into(&mut self, from: NodeKey) -> Result<()> {
        let fs = self.struct_of(from)?;
        if let Some(l) = fs.left_sibling {
            if self.kind_of(l)? == NodeKind::Text {
                let merged = format!("{}{}", self.value_of(l)?, self.value_of(from)?);
                self.remove_merged_text(l)?;
                self.update_value_local_hash(from, merged.into_bytes())?;
            }
        }
        let fs = self.struct_of(from)?;
        if let Some(r) = fs.right_sibling {
            if self.kind_of(r)? == NodeKind::Text {
                let merged = format!("{}{}", self.value_of(from)?, self.value_of(r)?);
                self.remove_merged_text(r)?;
                self.update_value_local_hash(from, merged.into_bytes())?;
            }
        }
        Ok(())
    }

    /// Reassign order keys for a moved subtree: the root from its new
    /// neighbours, then a level-order pass over namespaces, attributes and
    /// children.
    fn compute_move_dewey_ids(&mut self, from: NodeKey) -> Result<()> {
        let fs = self.struct_of(from)?;
        let parent = self.parent_of(from)?;
        let left = match fs.left_sibling {
            Some(k) => Some(self.dewey_of(k)?),
            None => None,
        };
        let right = match fs.right_sibling {
            Some(k) => Some(self.dewey_of(k)?),
            None => None,
        };
        let root_id = match (left.as_ref(), right.as_ref()) {
            (None, None) => Some(self.dewey_of(parent)?.new_child()),
            (l, r) => DeweyId::new_between(l, r),
        }
        .ok_or_else(|| XylemError::StoreCorrupt {
            detail: "order key generation failed for moved subtree".to_owned(),
        })?;
        self.page
            .prepare_entry_for_modification(from)?
            .delegate_mut()
            .dewey_id = Some(root_id);

        let mut queue = VecDeque::from([from]);
        while let Some(key) = queue.pop_front() {
            let base = self.dewey_of(key)?;
            let (namespaces, attributes): (Vec<NodeKey>, Vec<NodeKey>) = {
                let record = self.record(key)?;
                match record.as_element() {
                    Some(e) => (e.namespace_keys.clone(), e.attribute_keys.clone()),
                    None => (Vec::new(), Vec::new()),
                }
            };
            let mut prev: Option<DeweyId> = None;
            for ns in namespaces {
                let id = match prev.as_ref() {
                    None => base.new_namespace(),
                    Some(p) => DeweyId::new_between(Some(p), None).ok_or_else(|| {
                        XylemError::StoreCorrupt {
                            detail: "namespace order key generation failed".to_owned(),
                        }
                    })?,
                };
                self.page
                    .prepare_entry_for_modification(ns)?
                    .delegate_mut()
                    .dewey_id = Some(id.clone());
                prev = Some(id);
            }
            let mut prev: Option<DeweyId> = None;
            for att in attributes {
                let id = match prev.as_ref() {
                    None => base.new_attribute(),
                    Some(p) => DeweyId::new_between(Some(p), None).ok_or_else(|| {
                        XylemError::StoreCorrupt {
                            detail: "attribute order key generation failed".to_owned(),
                        }
                    })?,
                };
                self.page
                    .prepare_entry_for_modification(att)?
                    .delegate_mut()
                    .dewey_id = Some(id.clone());
                prev = Some(id);
            }
            let mut prev: Option<DeweyId> = None;
            for child in axis::children(&*self.page, key)? {
                let id = match prev.as_ref() {
                    None => base.new_child(),
                    Some(p) => DeweyId::new_between(Some(p), None).ok_or_else(|| {
                        XylemError::StoreCorrupt {
                            detail: "child order key generation failed".to_owned(),
                        }
                    })?,
                };
                self.page
                    .prepare_entry_for_modification(child)?
                    .delegate_mut()
                    .dewey_id = Some(id.clone());
                prev = Some(id);
                queue.push_back(child);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Bulk subtree insert, copy and replace
    // -----------------------------------------------------------------------

    /// Drive the insert operations from an event stream describing exactly
    /// one subtree. Returns the key the cursor landed on after the first
    /// event (the subtree root, or the text node it merged into).
    fn build_subtree(
        &mut self,
        events: &mut dyn Iterator<Item = TreeEvent>,
        pos: InsertPosition,
    ) -> Result<NodeKey> {
        let mut first_key: Option<NodeKey> = None;
        let mut place = pos;
        let mut depth: usize = 0;
        let mut started = false;
        for event in events {
            if started && depth == 0 {
                return Err(XylemError::MalformedEventStream);
            }
            match event {
                TreeEvent::StartElement {
                    name,
                    namespaces,
                    attributes,
                } => {
                    self.insert_element(&name, place)?;
                    for ns in &namespaces {
                        self.insert_namespace(ns, Movement::ToParent)?;
                    }
                    for (qn, value) in &attributes {
                        self.insert_attribute(qn, value, Movement::ToParent)?;
                    }
                    started = true;
                    depth += 1;
                    if first_key.is_none() {
                        first_key = Some(self.cur);
                    }
                    place = InsertPosition::AsFirstChild;
                }
                TreeEvent::EndElement => {
                    if depth == 0 {
                        return Err(XylemError::MalformedEventStream);
                    }
                    if place != InsertPosition::AsFirstChild {
                        // The cursor is on the element's last child.
                        let parent = self.parent_of(self.cur)?;
                        self.cur = parent;
                    }
                    depth -= 1;
                    place = InsertPosition::AsRightSibling;
                }
                TreeEvent::Text(value) => {
                    self.insert_text(&value, place)?;
                    started = true;
                    if first_key.is_none() {
                        first_key = Some(self.cur);
                    }
                    place = InsertPosition::AsRightSibling;
                }
                TreeEvent::Comment(value) => {
                    self.insert_comment(&value, place)?;
                    started = true;
                    if first_key.is_none() {
                        first_key = Some(self.cur);
                    }
                    place = InsertPosition::AsRightSibling;
                }
                TreeEvent::ProcessingInstruction { target, content } => {
                    self.insert_pi(&target, &content, place)?;
                    started = true;
                    if first_key.is_none() {
                        first_key = Some(self.cur);
                    }
                    place = InsertPosition::AsRightSibling;
                }
            }
        }
        if depth != 0 {
            return Err(XylemError::MalformedEventStream);
        }
        first_key.ok_or(XylemError::MalformedEventStream)
    }

    /// Bulk insert: per-edit hashing is deferred, the inserted subtree is
    /// recomputed post-order, its root hash folded into every ancestor, and
    /// the transaction committed.
    fn insert_subtree(&mut self, events: Vec<TreeEvent>, pos: InsertPosition) -> Result<()> {
        {
            let record = self.record(self.cur)?;
            if record.as_struct().is_none() {
                return Err(self.wrong_kind("a structural node"));
            }
            if pos != InsertPosition::AsFirstChild && record.kind() == NodeKind::DocumentRoot {
                return Err(self.wrong_kind("a non-root structural node"));
            }
        }
        self.check_access_and_commit()?;

        self.bulk_insert = true;
        let built = self
            .build_subtree(&mut events.into_iter(), pos)
            .and_then(|root| {
                self.postorder_recompute_subtree(root)?;
                self.cur = root;
                match self.hash_mode {
                    HashMode::None => self.update_ancestor_counts_add()?,
                    HashMode::Rolling | HashMode::Postorder => self.rolling_add()?,
                }
                Ok(root)
            });
        self.bulk_insert = false;
        let root = built?;
        self.commit(None)?;
        self.cur = root;
        Ok(())
    }

    /// Replay a source subtree through the regular insert operations.
    fn copy_subtree(&mut self, src: &NodeReadTx, pos: InsertPosition) -> Result<()> {
        self.check_access_and_commit()?;
        let mut events = src.events_for_subtree()?;
        if events.len() == 1 {
            if let Some(event) = events.pop() {
                match event {
                    TreeEvent::Text(value) => return self.insert_text(&value, pos),
                    TreeEvent::Comment(value) => return self.insert_comment(&value, pos),
                    TreeEvent::ProcessingInstruction { target, content } => {
                        return self.insert_pi(&target, &content, pos);
                    }
                    other => events.push(other),
                }
            }
        }
        let root = self.build_subtree(&mut events.into_iter(), pos)?;
        self.cur = root;
        Ok(())
    }

    fn replace_with_events(&mut self, events: Vec<TreeEvent>) -> Result<()> {
        let (left, parent) = {
            let record = self.record(self.cur)?;
            if record.as_struct().is_none() || record.kind() == NodeKind::DocumentRoot {
                return Err(self.wrong_kind("a non-root structural node"));
            }
            let s = record.as_struct().copied().unwrap_or_default();
            (s.left_sibling, record.parent())
        };
        self.check_access_and_commit()?;
        let former = self.cur;
        let (anchor, pos) = match left {
            Some(l) => (l, InsertPosition::AsRightSibling),
            None => (
                parent.ok_or_else(|| self.wrong_kind("a non-root structural node"))?,
                InsertPosition::AsFirstChild,
            ),
        };
        self.cur = anchor;
        let new_root = self.build_subtree(&mut events.into_iter(), pos)?;
        self.cur = former;
        self.remove_current()?;
        self.cur = new_root;
        Ok(())
    }

    fn replace_with(&mut self, src: &NodeReadTx) -> Result<()> {
        match src.kind()? {
            NodeKind::Element
            | NodeKind::Text
            | NodeKind::Comment
            | NodeKind::ProcessingInstruction => {
                let is_text = {
                    let record = self.record(self.cur)?;
                    if record.as_struct().is_none() || record.kind() == NodeKind::DocumentRoot {
                        return Err(self.wrong_kind("a non-root structural node"));
                    }
                    record.kind() == NodeKind::Text
                };
                if is_text {
                    self.remove_then_insert(src)
                } else {
                    self.insert_then_remove(src)
                }
            }
            NodeKind::Attribute => {
                if self.kind_of(self.cur)? != NodeKind::Attribute {
                    return Err(self.wrong_kind("an attribute"));
                }
                let name = src.name()?.ok_or_else(|| XylemError::StoreCorrupt {
                    detail: "source attribute without a name".to_owned(),
                })?;
                let value = src.value()?.unwrap_or_default();
                self.remove_current()?;
                self.insert_attribute(&name, &value, Movement::None)
            }
            NodeKind::Namespace => {
                if self.kind_of(self.cur)? != NodeKind::Namespace {
                    return Err(self.wrong_kind("a namespace"));
                }
                let name = src.name()?.ok_or_else(|| XylemError::StoreCorrupt {
                    detail: "source namespace without a name".to_owned(),
                })?;
                self.remove_current()?;
                self.insert_namespace(&name, Movement::None)
            }
            NodeKind::DocumentRoot => Err(XylemError::WrongCurrentNode {
                expected: "a replaceable source node",
                found: "document root",
            }),
        }
    }

    fn insert_then_remove(&mut self, src: &NodeReadTx) -> Result<()> {
        let former = self.cur;
        let s = self.struct_of(former)?;
        if let Some(l) = s.left_sibling {
            self.cur = l;
            self.copy_subtree(src, InsertPosition::AsRightSibling)?;
        } else {
            let parent = self.parent_of(former)?;
            self.cur = parent;
            self.copy_subtree(src, InsertPosition::AsFirstChild)?;
        }
        let inserted = self.cur;
        self.cur = former;
        self.remove_current()?;
        self.cur = inserted;
        Ok(())
    }

    fn remove_then_insert(&mut self, src: &NodeReadTx) -> Result<()> {
        let former = self.cur;
        let s = self.struct_of(former)?;
        if let Some(l) = s.left_sibling {
            self.remove_current()?;
            self.cur = l;
            self.copy_subtree(src, InsertPosition::AsRightSibling)?;
        } else {
            let parent = self.parent_of(former)?;
            self.remove_current()?;
            self.cur = parent;
            self.copy_subtree(src, InsertPosition::AsFirstChild)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commit, rollback, revert, close
    // -----------------------------------------------------------------------

    fn run_hooks(hooks: &mut Vec<CommitHook>, info: &CommitInfo) -> Result<()> {
        for hook in hooks.iter_mut() {
            hook(info)?;
        }
        Ok(())
    }

    pub(crate) fn commit(&mut self, message: Option<&str>) -> Result<Revision> {
        self.assert_not_closed()?;

        let info = CommitInfo {
            revision: self.resource.last_committed().revision.next(),
            message: message.map(str::to_owned),
        };
        let mut pre = mem::take(&mut self.pre_commit_hooks);
        let pre_result = Self::run_hooks(&mut pre, &info);
        self.pre_commit_hooks = pre;
        pre_result?;

        self.modification_count = 0;
        let uber = self.page.commit(message)?;
        self.resource.set_last_committed(uber);
        debug!(revision = uber.revision.get(), "committed revision");
        self.reinstantiate(Abort::No)?;

        let info = CommitInfo {
            revision: uber.revision,
            message: message.map(str::to_owned),
        };
        let mut post = mem::take(&mut self.post_commit_hooks);
        let post_result = Self::run_hooks(&mut post, &info);
        self.post_commit_hooks = post;
        post_result?;

        Ok(uber.revision)
    }

    fn rollback(&mut self) -> Result<Revision> {
        self.assert_not_closed()?;
        self.modification_count = 0;
        let uber = self.page.rollback()?;
        self.resource.set_last_committed(uber);
        self.page.clear_caches();
        self.page.close_caches();
        self.resource.delete_commit_marker()?;
        debug!(revision = uber.revision.get(), "rolled back to revision");
        self.reinstantiate(Abort::Yes)?;
        Ok(uber.revision)
    }

    fn revert_to(&mut self, revision: Revision) -> Result<()> {
        self.assert_not_closed()?;
        self.resource.assert_revision(revision)?;
        self.page.close_caches();
        self.page = self.resource.begin_page_tx(revision, Abort::No)?;
        self.factory = NodeFactory::new();
        if let Some(ps) = self.path_summary.as_mut() {
            ps.reinstantiate(self.page.as_read_tx())?;
        }
        self.index_controller.create_index_listeners(&[])?;
        self.seed_root_hash()?;
        self.modification_count = 0;
        self.cur = NodeKey::DOCUMENT_ROOT;
        debug!(revision = revision.get(), "reverted to revision");
        Ok(())
    }

    /// Swap in a fresh page transaction on the newest durable revision and
    /// rebuild the node factory, path summary and index listeners.
    fn reinstantiate(&mut self, abort: Abort) -> Result<()> {
        let base = self.resource.last_committed().revision;
        self.page.close_caches();
        self.page = self.resource.begin_page_tx(base, abort)?;
        self.factory = NodeFactory::new();
        if let Some(ps) = self.path_summary.as_mut() {
            ps.reinstantiate(self.page.as_read_tx())?;
        }
        self.index_controller.create_index_listeners(&[])?;
        self.seed_root_hash()?;
        if self.page.get_record(self.cur).is_none() {
            self.cur = NodeKey::DOCUMENT_ROOT;
        }
        Ok(())
    }

    /// Give a fresh (bootstrap) document root its image hash so the
    /// rolling walks stay consistent with from-scratch recomputation.
    pub(crate) fn seed_root_hash(&mut self) -> Result<()> {
        if self.hash_mode == HashMode::None {
            return Ok(());
        }
        if self.record(NodeKey::DOCUMENT_ROOT)?.hash() == 0 {
            let image = image_hash(self.record(NodeKey::DOCUMENT_ROOT)?);
            self.page
                .prepare_entry_for_modification(NodeKey::DOCUMENT_ROOT)?
                .set_hash(image);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.modification_count > 0 {
            return Err(XylemError::UncommittedModifications {
                count: self.modification_count,
            });
        }
        self.resource.delete_commit_marker()?;
        self.page.close_caches();
        self.resource.release_writer();
        self.closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public handle
// ---------------------------------------------------------------------------

/// The write transaction handle.
///
/// Mutation methods return `&Self` so edits chain; each method acquires the
/// shared re-entrant lock, which only ever contends with the optional
/// auto-commit scheduler.
pub struct NodeWriteTx {
    inner: Arc<ReentrantMutex<RefCell<WtxInner>>>,
    auto_commit: Option<AutoCommit>,
}

impl std::fmt::Debug for NodeWriteTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeWriteTx").finish_non_exhaustive()
    }
}

impl NodeWriteTx {
    /// Open the single write transaction of `resource`, pinned to the
    /// newest committed revision.
    pub fn begin(
        resource: Arc<dyn ResourceManager>,
        options: WriteTxOptions,
    ) -> Result<Self> {
        let WriteTxOptions {
            max_node_count,
            auto_commit_interval,
            index_controller,
        } = options;
        resource.try_acquire_writer()?;
        let setup = (|| {
            let config = resource.config().clone();
            let base = resource.last_committed().revision;
            let page = resource.begin_page_tx(base, Abort::No)?;
            let path_summary: Option<Box<dyn PathSummaryWriter>> = if config.path_summary {
                let mut ps = InMemoryPathSummary::new();
                ps.reinstantiate(page.as_read_tx())?;
                Some(Box::new(ps))
            } else {
                None
            };
            let mut inner = WtxInner {
                resource: Arc::clone(&resource),
                page,
                factory: NodeFactory::new(),
                path_summary,
                index_controller: index_controller
                    .unwrap_or_else(|| Box::new(NoopIndexController)),
                cur: NodeKey::DOCUMENT_ROOT,
                hash_mode: config.hash_mode,
                dewey_ids: config.dewey_ids,
                compression: config.text_compression,
                bulk_insert: false,
                modification_count: 0,
                max_node_count,
                pre_commit_hooks: Vec::new(),
                post_commit_hooks: Vec::new(),
                closed: false,
            };
            inner.seed_root_hash()?;
            Ok(inner)
        })();
        let inner = match setup {
            Ok(inner) => inner,
            Err(e) => {
                resource.release_writer();
                return Err(e);
            }
        };
        let inner = Arc::new(ReentrantMutex::new(RefCell::new(inner)));
        let auto_commit =
            auto_commit_interval.map(|period| AutoCommit::spawn(period, Arc::clone(&inner)));
        Ok(Self { inner, auto_commit })
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut WtxInner) -> Result<R>) -> Result<R> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        f(&mut inner)
    }

    // --- structural inserts -------------------------------------------------

    pub fn insert_element_as_first_child(&self, name: &QName) -> Result<&Self> {
        self.with_inner(|w| w.insert_element(name, InsertPosition::AsFirstChild))?;
        Ok(self)
    }

    pub fn insert_element_as_left_sibling(&self, name: &QName) -> Result<&Self> {
        self.with_inner(|w| w.insert_element(name, InsertPosition::AsLeftSibling))?;
        Ok(self)
    }

    pub fn insert_element_as_right_sibling(&self, name: &QName) -> Result<&Self> {
        self.with_inner(|w| w.insert_element(name, InsertPosition::AsRightSibling))?;
        Ok(self)
    }

    pub fn insert_text_as_first_child(&self, value: &str) -> Result<&Self> {
        self.with_inner(|w| w.insert_text(value, InsertPosition::AsFirstChild))?;
        Ok(self)
    }

    pub fn insert_text_as_left_sibling(&self, value: &str) -> Result<&Self> {
        self.with_inner(|w| w.insert_text(value, InsertPosition::AsLeftSibling))?;
        Ok(self)
    }

    pub fn insert_text_as_right_sibling(&self, value: &str) -> Result<&Self> {
        self.with_inner(|w| w.insert_text(value, InsertPosition::AsRightSibling))?;
        Ok(self)
    }

    pub fn insert_comment_as_first_child(&self, value: &str) -> Result<&Self> {
        self.with_inner(|w| w.insert_comment(value, InsertPosition::AsFirstChild))?;
        Ok(self)
    }

    pub fn insert_comment_as_left_sibling(&self, value: &str) -> Result<&Self> {
        self.with_inner(|w| w.insert_comment(value, InsertPosition::AsLeftSibling))?;
        Ok(self)
    }

    pub fn insert_comment_as_right_sibling(&self, value: &str) -> Result<&Self> {
        self.with_inner(|w| w.insert_comment(value, InsertPosition::AsRightSibling))?;
        Ok(self)
    }

    pub fn insert_pi_as_first_child(&self, target: &str, content: &str) -> Result<&Self> {
        self.with_inner(|w| w.insert_pi(target, content, InsertPosition::AsFirstChild))?;
        Ok(self)
    }

    pub fn insert_pi_as_left_sibling(&self, target: &str, content: &str) -> Result<&Self> {
        self.with_inner(|w| w.insert_pi(target, content, InsertPosition::AsLeftSibling))?;
        Ok(self)
    }

    pub fn insert_pi_as_right_sibling(&self, target: &str, content: &str) -> Result<&Self> {
        self.with_inner(|w| w.insert_pi(target, content, InsertPosition::AsRightSibling))?;
        Ok(self)
    }

    // --- non-structural inserts --------------------------------------------

    pub fn insert_attribute(&self, name: &QName, value: &str) -> Result<&Self> {
        self.with_inner(|w| w.insert_attribute(name, value, Movement::None))?;
        Ok(self)
    }

    pub fn insert_attribute_then_move(
        &self,
        name: &QName,
        value: &str,
        movement: Movement,
    ) -> Result<&Self> {
        self.with_inner(|w| w.insert_attribute(name, value, movement))?;
        Ok(self)
    }

    pub fn insert_namespace(&self, name: &QName) -> Result<&Self> {
        self.with_inner(|w| w.insert_namespace(name, Movement::None))?;
        Ok(self)
    }

    pub fn insert_namespace_then_move(&self, name: &QName, movement: Movement) -> Result<&Self> {
        self.with_inner(|w| w.insert_namespace(name, movement))?;
        Ok(self)
    }

    // --- subtree operations -------------------------------------------------

    pub fn insert_subtree_as_first_child(&self, events: Vec<TreeEvent>) -> Result<&Self> {
        self.with_inner(|w| w.insert_subtree(events, InsertPosition::AsFirstChild))?;
        Ok(self)
    }

    pub fn insert_subtree_as_left_sibling(&self, events: Vec<TreeEvent>) -> Result<&Self> {
        self.with_inner(|w| w.insert_subtree(events, InsertPosition::AsLeftSibling))?;
        Ok(self)
    }

    pub fn insert_subtree_as_right_sibling(&self, events: Vec<TreeEvent>) -> Result<&Self> {
        self.with_inner(|w| w.insert_subtree(events, InsertPosition::AsRightSibling))?;
        Ok(self)
    }

    pub fn copy_subtree_as_first_child(&self, src: &NodeReadTx) -> Result<&Self> {
        self.with_inner(|w| w.copy_subtree(src, InsertPosition::AsFirstChild))?;
        Ok(self)
    }

    pub fn copy_subtree_as_left_sibling(&self, src: &NodeReadTx) -> Result<&Self> {
        self.with_inner(|w| w.copy_subtree(src, InsertPosition::AsLeftSibling))?;
        Ok(self)
    }

    pub fn copy_subtree_as_right_sibling(&self, src: &NodeReadTx) -> Result<&Self> {
        self.with_inner(|w| w.copy_subtree(src, InsertPosition::AsRightSibling))?;
        Ok(self)
    }

    pub fn replace_node_with_events(&self, events: Vec<TreeEvent>) -> Result<&Self> {
        self.with_inner(|w| w.replace_with_events(events))?;
        Ok(self)
    }

    pub fn replace_node(&self, src: &NodeReadTx) -> Result<&Self> {
        self.with_inner(|w| w.replace_with(src))?;
        Ok(self)
    }

    // --- move ---------------------------------------------------------------

    pub fn move_subtree_to_first_child(&self, from: NodeKey) -> Result<&Self> {
        self.with_inner(|w| w.move_subtree(from, InsertPosition::AsFirstChild))?;
        Ok(self)
    }

    pub fn move_subtree_to_left_sibling(&self, from: NodeKey) -> Result<&Self> {
        self.with_inner(|w| w.move_subtree_to_left_sibling(from))?;
        Ok(self)
    }

    pub fn move_subtree_to_right_sibling(&self, from: NodeKey) -> Result<&Self> {
        self.with_inner(|w| w.move_subtree(from, InsertPosition::AsRightSibling))?;
        Ok(self)
    }

    // --- rename / revalue / remove -----------------------------------------

    pub fn set_name(&self, name: &QName) -> Result<&Self> {
        self.with_inner(|w| w.set_name(name))?;
        Ok(self)
    }

    pub fn set_value(&self, value: &str) -> Result<&Self> {
        self.with_inner(|w| w.set_value(value))?;
        Ok(self)
    }

    pub fn remove(&self) -> Result<&Self> {
        self.with_inner(WtxInner::remove_current)?;
        Ok(self)
    }

    // --- lifecycle ----------------------------------------------------------

    pub fn commit(&self) -> Result<&Self> {
        self.with_inner(|w| w.commit(None))?;
        Ok(self)
    }

    pub fn commit_with_message(&self, message: &str) -> Result<&Self> {
        self.with_inner(|w| w.commit(Some(message)))?;
        Ok(self)
    }

    pub fn rollback(&self) -> Result<&Self> {
        self.with_inner(WtxInner::rollback)?;
        Ok(self)
    }

    pub fn revert_to(&self, revision: Revision) -> Result<&Self> {
        self.with_inner(|w| w.revert_to(revision))?;
        Ok(self)
    }

    /// Declared but not yet specified; always fails.
    pub fn truncate_to(&self, _revision: Revision) -> Result<&Self> {
        Err(XylemError::NotImplemented("truncate_to"))
    }

    /// Close the transaction. Fails (and stays usable) while uncommitted
    /// modifications remain.
    pub fn close(&mut self) -> Result<()> {
        self.with_inner(WtxInner::close)?;
        if let Some(auto) = self.auto_commit.take() {
            auto.stop(Duration::from_secs(2))?;
        }
        Ok(())
    }

    pub fn add_pre_commit_hook(&self, hook: CommitHook) -> Result<&Self> {
        self.with_inner(|w| {
            w.pre_commit_hooks.push(hook);
            Ok(())
        })?;
        Ok(self)
    }

    pub fn add_post_commit_hook(&self, hook: CommitHook) -> Result<&Self> {
        self.with_inner(|w| {
            w.post_commit_hooks.push(hook);
            Ok(())
        })?;
        Ok(self)
    }

    // --- cursor -------------------------------------------------------------

    pub fn move_to(&self, key: NodeKey) -> Result<bool> {
        self.with_inner(|w| {
            if w.page.get_record(key).is_some() {
                w.cur = key;
                Ok(true)
            } else {
                Ok(false)
            }
        })
    }

    pub fn move_to_document_root(&self) -> Result<bool> {
        self.move_to(NodeKey::DOCUMENT_ROOT)
    }

    pub fn move_to_parent(&self) -> Result<bool> {
        self.with_inner(|w| match w.record(w.cur)?.parent() {
            Some(parent) => {
                w.cur = parent;
                Ok(true)
            }
            None => Ok(false),
        })
    }

    pub fn move_to_first_child(&self) -> Result<bool> {
        self.with_inner(|w| {
            match w.record(w.cur)?.as_struct().and_then(|s| s.first_child) {
                Some(child) => {
                    w.cur = child;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    pub fn move_to_left_sibling(&self) -> Result<bool> {
        self.with_inner(|w| {
            match w.record(w.cur)?.as_struct().and_then(|s| s.left_sibling) {
                Some(key) => {
                    w.cur = key;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    pub fn move_to_right_sibling(&self) -> Result<bool> {
        self.with_inner(|w| {
            match w.record(w.cur)?.as_struct().and_then(|s| s.right_sibling) {
                Some(key) => {
                    w.cur = key;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    pub fn move_to_attribute(&self, index: usize) -> Result<bool> {
        self.with_inner(|w| {
            let target = w
                .record(w.cur)?
                .as_element()
                .and_then(|e| e.attribute_keys.get(index).copied());
            match target {
                Some(key) => {
                    w.cur = key;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    pub fn move_to_namespace(&self, index: usize) -> Result<bool> {
        self.with_inner(|w| {
            let target = w
                .record(w.cur)?
                .as_element()
                .and_then(|e| e.namespace_keys.get(index).copied());
            match target {
                Some(key) => {
                    w.cur = key;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    // --- accessors ----------------------------------------------------------

    pub fn node_key(&self) -> Result<NodeKey> {
        self.with_inner(|w| Ok(w.cur))
    }

    pub fn kind(&self) -> Result<NodeKind> {
        self.with_inner(|w| w.kind_of(w.cur))
    }

    pub fn name(&self) -> Result<Option<QName>> {
        self.with_inner(|w| Ok(resolve_qname(&*w.page, w.record(w.cur)?)))
    }

    pub fn value(&self) -> Result<Option<String>> {
        self.with_inner(|w| Ok(value_string(w.record(w.cur)?)))
    }

    pub fn hash(&self) -> Result<i64> {
        self.with_inner(|w| Ok(w.record(w.cur)?.hash()))
    }

    pub fn dewey_id(&self) -> Result<Option<DeweyId>> {
        self.with_inner(|w| Ok(w.record(w.cur)?.dewey_id().cloned()))
    }

    pub fn child_count(&self) -> Result<u64> {
        self.with_inner(|w| Ok(w.record(w.cur)?.as_struct().map_or(0, |s| s.child_count)))
    }

    pub fn descendant_count(&self) -> Result<u64> {
        self.with_inner(|w| {
            Ok(w.record(w.cur)?
                .as_struct()
                .map_or(0, |s| s.descendant_count))
        })
    }

    pub fn attribute_count(&self) -> Result<usize> {
        self.with_inner(|w| {
            Ok(w.record(w.cur)?
                .as_element()
                .map_or(0, |e| e.attribute_keys.len()))
        })
    }

    pub fn namespace_count(&self) -> Result<usize> {
        self.with_inner(|w| {
            Ok(w.record(w.cur)?
                .as_element()
                .map_or(0, |e| e.namespace_keys.len()))
        })
    }

    pub fn revision(&self) -> Result<Revision> {
        self.with_inner(|w| Ok(w.page.revision()))
    }

    pub fn uber_page(&self) -> Result<UberPage> {
        self.with_inner(|w| Ok(w.page.uber_page()))
    }

    pub fn modification_count(&self) -> Result<u64> {
        self.with_inner(|w| Ok(w.modification_count))
    }

    pub fn commit_credentials(&self) -> Result<CommitCredentials> {
        self.with_inner(|w| {
            w.assert_not_closed()?;
            Ok(w.page.commit_credentials())
        })
    }

    /// Whether the path summary contains the given root-to-node path.
    pub fn path_summary_contains(&self, steps: &[(QName, NodeKind)]) -> Result<bool> {
        self.with_inner(|w| {
            Ok(w.path_summary
                .as_ref()
                .is_some_and(|ps| ps.contains(steps)))
        })
    }

    /// Verify structural, counting, hashing and ordering invariants over
    /// the working revision.
    pub fn verify_integrity(&self) -> Result<()> {
        self.with_inner(|w| {
            invariants::check_tree(w.page.as_read_tx(), w.hash_mode, w.dewey_ids)
        })
    }
}

impl Drop for NodeWriteTx {
    fn drop(&mut self) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if !inner.closed {
            if inner.modification_count > 0 {
                warn!(
                    modifications = inner.modification_count,
                    "write transaction dropped with uncommitted modifications"
                );
            }
            inner.resource.release_writer();
            inner.closed = true;
        }
        drop(inner);
        drop(guard);
        if let Some(auto) = self.auto_commit.take() {
            let _ = auto.stop(Duration::from_millis(250));
        }
    }
}
