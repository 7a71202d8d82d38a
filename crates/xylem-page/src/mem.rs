//! In-memory reference implementation of the page contracts.
//!
//! Revision snapshots share unchanged records through `Arc`;
//! `prepare_entry_for_modification` is `Arc::make_mut`, which copies a
//! record the first time the working revision touches it. Committing
//! appends a snapshot whose record map shares every untouched `Arc` with
//! its parent revision.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use xylem_error::{Result, XylemError};
use xylem_types::{
    DocumentRootNode, NameKey, NodeDelegate, NodeKey, NodeKind, NodeRecord, Revision,
    StructDelegate,
};

use crate::name_page::NamePage;
use crate::traits::{
    Abort, CommitCredentials, PageReadTx, PageTx, ResourceConfig, ResourceManager, UberPage,
};

type RecordMap = HashMap<NodeKey, Arc<NodeRecord>>;

#[derive(Debug, Clone)]
struct Snapshot {
    uber: UberPage,
    records: RecordMap,
    names: NamePage,
    credentials: CommitCredentials,
}

struct StoreInner {
    revisions: Vec<Snapshot>,
    last_committed: UberPage,
    writer_active: bool,
}

/// An in-memory resource: all committed revisions plus the writer slot.
pub struct MemResourceManager {
    inner: Arc<Mutex<StoreInner>>,
    config: ResourceConfig,
}

impl MemResourceManager {
    /// Create a fresh resource holding only the bootstrap revision with a
    /// document root node.
    #[must_use]
    pub fn new(config: ResourceConfig) -> Self {
        let dewey = config
            .dewey_ids
            .then(xylem_types::DeweyId::document);
        let root = NodeRecord::DocumentRoot(DocumentRootNode {
            del: NodeDelegate::new(NodeKey::DOCUMENT_ROOT, None, dewey),
            struc: StructDelegate::default(),
        });
        let uber = UberPage {
            revision: Revision::BOOTSTRAP,
            max_node_key: 0,
            is_bootstrap: true,
        };
        let mut records = RecordMap::new();
        records.insert(NodeKey::DOCUMENT_ROOT, Arc::new(root));
        let bootstrap = Snapshot {
            uber,
            records,
            names: NamePage::new(),
            credentials: CommitCredentials {
                author: config.author.clone(),
                message: String::new(),
            },
        };
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                revisions: vec![bootstrap],
                last_committed: uber,
                writer_active: false,
            })),
            config,
        }
    }

    fn snapshot(&self, revision: Revision) -> Result<Snapshot> {
        let inner = self.inner.lock();
        inner
            .revisions
            .get(revision.get() as usize)
            .cloned()
            .ok_or(XylemError::NoSuchRevision {
                revision: revision.get(),
            })
    }
}

impl ResourceManager for MemResourceManager {
    fn config(&self) -> &ResourceConfig {
        &self.config
    }

    fn begin_page_tx(&self, base: Revision, _abort: Abort) -> Result<Box<dyn PageTx>> {
        let snapshot = self.snapshot(base)?;
        Ok(Box::new(MemPageTx {
            store: Arc::clone(&self.inner),
            base,
            next_node_key: snapshot.uber.max_node_key + 1,
            base_uber: snapshot.uber,
            base_credentials: snapshot.credentials.clone(),
            records: snapshot.records,
            names: snapshot.names,
            author: self.config.author.clone(),
        }))
    }

    fn begin_page_read_tx(&self, revision: Revision) -> Result<Box<dyn PageReadTx>> {
        let snapshot = self.snapshot(revision)?;
        Ok(Box::new(MemPageReadTx {
            revision,
            uber: snapshot.uber,
            credentials: snapshot.credentials.clone(),
            records: snapshot.records,
            names: snapshot.names,
        }))
    }

    fn set_last_committed(&self, uber: UberPage) {
        self.inner.lock().last_committed = uber;
    }

    fn last_committed(&self) -> UberPage {
        self.inner.lock().last_committed
    }

    fn assert_revision(&self, revision: Revision) -> Result<()> {
        let inner = self.inner.lock();
        if (revision.get() as usize) < inner.revisions.len() {
            Ok(())
        } else {
            Err(XylemError::NoSuchRevision {
                revision: revision.get(),
            })
        }
    }

    fn delete_commit_marker(&self) -> Result<()> {
        // The in-memory store keeps no crash-recovery marker.
        Ok(())
    }

    fn try_acquire_writer(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.writer_active {
            return Err(XylemError::WriterAlreadyActive);
        }
        inner.writer_active = true;
        Ok(())
    }

    fn release_writer(&self) {
        self.inner.lock().writer_active = false;
    }
}

/// Write page transaction over a copy-on-write working set.
struct MemPageTx {
    store: Arc<Mutex<StoreInner>>,
    base: Revision,
    base_uber: UberPage,
    base_credentials: CommitCredentials,
    next_node_key: u64,
    records: RecordMap,
    names: NamePage,
    author: String,
}

impl PageReadTx for MemPageTx {
    fn get_record(&self, key: NodeKey) -> Option<&NodeRecord> {
        self.records.get(&key).map(Arc::as_ref)
    }

    fn get_name(&self, key: NameKey, kind: NodeKind) -> Option<&str> {
        self.names.get_name(key, kind)
    }

    fn revision(&self) -> Revision {
        self.base
    }

    fn max_node_key(&self) -> u64 {
        self.next_node_key - 1
    }

    fn commit_credentials(&self) -> CommitCredentials {
        self.base_credentials.clone()
    }
}

impl PageTx for MemPageTx {
    fn allocate_node_key(&mut self) -> NodeKey {
        let key = NodeKey::new(self.next_node_key);
        self.next_node_key += 1;
        key
    }

    fn insert_record(&mut self, record: NodeRecord) -> Result<()> {
        self.records.insert(record.node_key(), Arc::new(record));
        Ok(())
    }

    fn prepare_entry_for_modification(&mut self, key: NodeKey) -> Result<&mut NodeRecord> {
        let arc = self
            .records
            .get_mut(&key)
            .ok_or(XylemError::NodeNotFound { key: key.get() })?;
        Ok(Arc::make_mut(arc))
    }

    fn remove_entry(&mut self, key: NodeKey) -> Result<()> {
        self.records
            .remove(&key)
            .map(|_| ())
            .ok_or(XylemError::NodeNotFound { key: key.get() })
    }

    fn create_name_key(&mut self, name: &str, kind: NodeKind) -> Result<NameKey> {
        Ok(self.names.create_name_key(name, kind))
    }

    fn remove_name(&mut self, key: NameKey, kind: NodeKind) {
        self.names.remove_name(key, kind);
    }

    fn commit(&mut self, message: Option<&str>) -> Result<UberPage> {
        let mut store = self.store.lock();
        let revision = Revision::new(store.revisions.len() as u32);
        let uber = UberPage {
            revision,
            max_node_key: self.next_node_key - 1,
            is_bootstrap: false,
        };
        let credentials = CommitCredentials {
            author: self.author.clone(),
            message: message.unwrap_or_default().to_owned(),
        };
        store.revisions.push(Snapshot {
            uber,
            records: self.records.clone(),
            names: self.names.clone(),
            credentials: credentials.clone(),
        });
        drop(store);
        self.base = revision;
        self.base_uber = uber;
        self.base_credentials = credentials;
        Ok(uber)
    }

    fn rollback(&mut self) -> Result<UberPage> {
        let store = self.store.lock();
        let last = store
            .revisions
            .last()
            .cloned()
            .ok_or_else(|| XylemError::StoreCorrupt {
                detail: "resource without revisions".to_owned(),
            })?;
        drop(store);
        self.records = last.records;
        self.names = last.names;
        self.next_node_key = last.uber.max_node_key + 1;
        self.base = last.uber.revision;
        self.base_uber = last.uber;
        self.base_credentials = last.credentials;
        Ok(last.uber)
    }

    fn clear_caches(&mut self) {}

    fn close_caches(&mut self) {}

    fn uber_page(&self) -> UberPage {
        self.base_uber
    }

    fn as_read_tx(&self) -> &dyn PageReadTx {
        self
    }
}

/// Read-only view of one committed revision.
struct MemPageReadTx {
    revision: Revision,
    uber: UberPage,
    credentials: CommitCredentials,
    records: RecordMap,
    names: NamePage,
}

impl PageReadTx for MemPageReadTx {
    fn get_record(&self, key: NodeKey) -> Option<&NodeRecord> {
        self.records.get(&key).map(Arc::as_ref)
    }

    fn get_name(&self, key: NameKey, kind: NodeKind) -> Option<&str> {
        self.names.get_name(key, kind)
    }

    fn revision(&self) -> Revision {
        self.revision
    }

    fn max_node_key(&self) -> u64 {
        self.uber.max_node_key
    }

    fn commit_credentials(&self) -> CommitCredentials {
        self.credentials.clone()
    }
}
