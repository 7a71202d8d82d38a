//! Contracts between the node transaction layer and the page store.
//!
//! The write transaction never owns node records directly: it fetches them
//! through [`PageReadTx`], prepares them for in-place modification through
//! [`PageTx::prepare_entry_for_modification`] (copy-on-write at the record
//! level) and coordinates commit/rollback/revert through the
//! [`ResourceManager`].

use xylem_error::Result;
use xylem_types::{HashMode, NameKey, NodeKey, NodeKind, NodeRecord, Revision};

/// The root descriptor of one revision. Rollback and revert swap uber pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UberPage {
    /// Revision this uber page belongs to.
    pub revision: Revision,
    /// Highest node key allocated in this revision.
    pub max_node_key: u64,
    /// Whether this is the bootstrap revision of a fresh resource.
    pub is_bootstrap: bool,
}

/// Author and message recorded with a commit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommitCredentials {
    pub author: String,
    pub message: String,
}

/// Per-resource configuration fixed at creation time.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Hash maintenance mode.
    pub hash_mode: HashMode,
    /// Whether a path summary is built and kept up to date.
    pub path_summary: bool,
    /// Whether DeweyIDs are assigned and stored.
    pub dewey_ids: bool,
    /// Whether text values are stored compressed.
    pub text_compression: bool,
    /// Author recorded in commit credentials.
    pub author: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            hash_mode: HashMode::Rolling,
            path_summary: true,
            dewey_ids: true,
            text_compression: false,
            author: "anonymous".to_owned(),
        }
    }
}

/// Whether a reinstantiated page transaction follows an abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    Yes,
    No,
}

/// Read access to one revision's records and names.
pub trait PageReadTx: Send {
    /// Fetch a record by key.
    fn get_record(&self, key: NodeKey) -> Option<&NodeRecord>;

    /// Resolve an interned name part.
    fn get_name(&self, key: NameKey, kind: NodeKind) -> Option<&str>;

    /// The revision this transaction reads from.
    fn revision(&self) -> Revision;

    /// Highest node key allocated so far.
    fn max_node_key(&self) -> u64;

    /// Credentials of the revision this transaction is pinned to.
    fn commit_credentials(&self) -> CommitCredentials;
}

/// Exclusive write access targeting the next revision.
pub trait PageTx: PageReadTx {
    /// Allocate a fresh node key (monotonic, never reused).
    fn allocate_node_key(&mut self) -> NodeKey;

    /// Install a newly created record under its own key.
    fn insert_record(&mut self, record: NodeRecord) -> Result<()>;

    /// Return an editable copy of a record, installed into the working
    /// revision (copy-on-write).
    fn prepare_entry_for_modification(&mut self, key: NodeKey) -> Result<&mut NodeRecord>;

    /// Remove a record from the working revision.
    fn remove_entry(&mut self, key: NodeKey) -> Result<()>;

    /// Intern a name part, bumping its reference count.
    fn create_name_key(&mut self, name: &str, kind: NodeKind) -> Result<NameKey>;

    /// Drop one reference to an interned name part.
    fn remove_name(&mut self, key: NameKey, kind: NodeKind);

    /// Persist the working revision, returning its uber page.
    fn commit(&mut self, message: Option<&str>) -> Result<UberPage>;

    /// Discard the working revision, returning the last durable uber page.
    fn rollback(&mut self) -> Result<UberPage>;

    /// Drop transient caches.
    fn clear_caches(&mut self);

    /// Release caches for good; the transaction is unusable afterwards.
    fn close_caches(&mut self);

    /// Uber page of the revision this transaction is based on.
    fn uber_page(&self) -> UberPage;

    /// Read-only view of this transaction's working revision.
    fn as_read_tx(&self) -> &dyn PageReadTx;

    /// Whether the base revision is the bootstrap revision.
    fn is_bootstrap(&self) -> bool {
        self.uber_page().is_bootstrap
    }
}

/// Owner of a resource's revisions; hands out page transactions and
/// enforces the single-writer rule.
pub trait ResourceManager: Send + Sync {
    /// Static resource configuration.
    fn config(&self) -> &ResourceConfig;

    /// Open a write page transaction based on `base`.
    fn begin_page_tx(&self, base: Revision, abort: Abort) -> Result<Box<dyn PageTx>>;

    /// Open a read-only page transaction pinned to `revision`.
    fn begin_page_read_tx(&self, revision: Revision) -> Result<Box<dyn PageReadTx>>;

    /// Record the uber page of a successful commit or rollback.
    fn set_last_committed(&self, uber: UberPage);

    /// Uber page of the newest durable revision.
    fn last_committed(&self) -> UberPage;

    /// Fail unless `revision` has been committed.
    fn assert_revision(&self, revision: Revision) -> Result<()>;

    /// Remove the crash-recovery commit marker, if the store keeps one.
    fn delete_commit_marker(&self) -> Result<()>;

    /// Claim the single writer slot.
    fn try_acquire_writer(&self) -> Result<()>;

    /// Release the single writer slot.
    fn release_writer(&self);
}
