//! Node-level transactions for the xylem tree store.
//!
//! The heart of the crate is [`NodeWriteTx`], the single writer per
//! resource: it applies structural edits through the page layer's
//! copy-on-write, keeps rolling hashes, descendant counts, DeweyIDs, the
//! path summary and index listeners in sync, and coordinates commit,
//! rollback and revert. [`NodeReadTx`] is the unbounded read-side
//! companion, pinned to a committed revision.

pub mod axis;
pub mod factory;
pub mod hash;
pub mod index;
pub mod invariants;
pub mod names;
pub mod path;
pub mod reader;
pub mod rtx;
pub mod wtx;

mod scheduler;

pub use factory::NodeFactory;
pub use index::{
    ChangeType, IndexController, IndexDef, IndexEvent, NoopIndexController,
    RecordingIndexController,
};
pub use path::{InMemoryPathSummary, PathOp, PathSummaryWriter, ROOT_PATH_NODE};
pub use reader::TreeEvent;
pub use rtx::NodeReadTx;
pub use wtx::{CommitHook, CommitInfo, NodeWriteTx, WriteTxOptions};
