//! Versioned, transactional tree storage for XML/XDM documents.
//!
//! Every revision of a document is kept with structural sharing across
//! revisions; a single write transaction per resource mutates the tree in
//! place behind record-level copy-on-write while readers stay pinned to
//! committed snapshots. Per-node rolling Merkle hashes, descendant counts
//! and hierarchical order keys are maintained incrementally with each edit.
//!
//! ```
//! use std::sync::Arc;
//! use xylem::{
//!     MemResourceManager, NodeWriteTx, QName, ResourceConfig, WriteTxOptions,
//! };
//!
//! let resource = Arc::new(MemResourceManager::new(ResourceConfig::default()));
//! let mut wtx = NodeWriteTx::begin(resource, WriteTxOptions::default()).unwrap();
//! wtx.insert_element_as_first_child(&QName::local("doc")).unwrap();
//! wtx.insert_text_as_first_child("hello").unwrap();
//! wtx.commit_with_message("initial import").unwrap();
//! wtx.close().unwrap();
//! ```

pub use xylem_error::{ErrorKind, Result, XylemError};
pub use xylem_page::{
    Abort, CommitCredentials, MemResourceManager, PageReadTx, PageTx, ResourceConfig,
    ResourceManager, UberPage,
};
pub use xylem_trx::{
    ChangeType, CommitHook, CommitInfo, IndexController, IndexDef, IndexEvent,
    InMemoryPathSummary, NodeFactory, NodeReadTx, NodeWriteTx, NoopIndexController, PathOp,
    PathSummaryWriter, RecordingIndexController, TreeEvent, WriteTxOptions,
};
pub use xylem_types::{
    DeweyId, HashMode, InsertPosition, Movement, NameKey, NodeKey, NodeKind, NodeRecord, QName,
    Revision,
};
