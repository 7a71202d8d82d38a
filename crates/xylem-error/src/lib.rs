use thiserror::Error;

/// Primary error type for xylem operations.
///
/// Structured variants for the common cases; every variant maps onto one of
/// the five coarse buckets in [`ErrorKind`] so callers can branch on the
/// failure class without matching individual variants.
#[derive(Error, Debug)]
pub enum XylemError {
    // === Usage errors (precondition violations) ===
    /// The cursor points at a node kind the operation does not accept.
    #[error("operation requires {expected} as the current node, found {found}")]
    WrongCurrentNode {
        expected: &'static str,
        found: &'static str,
    },

    /// A name failed QName validation.
    #[error("name is not a valid QName: '{name}'")]
    InvalidQName { name: String },

    /// A processing-instruction target failed NCName validation.
    #[error("processing-instruction target is not a valid NCName: '{target}'")]
    InvalidPiTarget { target: String },

    /// Processing-instruction content contains the forbidden sequence.
    #[error("processing-instruction content must not contain \"?>-\"")]
    PiContentForbidden,

    /// Comment content contains "--" or ends with "-".
    #[error("comment content must not contain \"--\" and must not end with \"-\"")]
    CommentContentForbidden,

    /// An inserted text value is empty.
    #[error("text value must not be empty")]
    EmptyTextValue,

    /// A namespace with the same prefix already exists on the element.
    #[error("duplicate namespace prefix '{prefix}'")]
    DuplicateNamespacePrefix { prefix: String },

    /// The document root cannot be removed.
    #[error("the document root cannot be removed")]
    DocumentRootRemoval,

    /// A document root holds at most one element child.
    #[error("the document root already has an element child")]
    SecondRootElement,

    /// Text nodes are not allowed directly under the document root.
    #[error("text is not allowed under the document root")]
    TextUnderDocumentRoot,

    /// Moving a node below one of its own descendants (or itself).
    #[error("cannot move a node into its own subtree")]
    MoveIntoOwnSubtree,

    /// Closing a transaction that still has uncommitted modifications.
    #[error("transaction has {count} uncommitted modifications; commit or rollback first")]
    UncommittedModifications { count: u64 },

    /// An event stream did not describe exactly one balanced subtree.
    #[error("event stream must describe exactly one balanced subtree")]
    MalformedEventStream,

    /// Declared but intentionally unimplemented operation.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    // === Argument errors ===
    /// A node key outside the allocated key space was supplied.
    #[error("node key {key} is out of range (max allocated {max})")]
    KeyOutOfRange { key: u64, max: u64 },

    /// The source of a move is the current node itself.
    #[error("cannot move a node relative to itself")]
    MoveOfSelf,

    // === State errors ===
    /// No record exists for the supplied key.
    #[error("no node for key {key}")]
    NodeNotFound { key: u64 },

    /// The transaction has already been closed.
    #[error("transaction is closed")]
    TrxClosed,

    /// The requested revision has never been committed.
    #[error("no such revision: {revision}")]
    NoSuchRevision { revision: u32 },

    /// A second write transaction was requested on the same resource.
    #[error("another write transaction is already open on this resource")]
    WriterAlreadyActive,

    // === I/O errors ===
    /// Page layer I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The page store returned inconsistent data.
    #[error("page store corrupt: {detail}")]
    StoreCorrupt { detail: String },

    // === Threading errors ===
    /// The auto-commit scheduler did not shut down in time.
    #[error("auto-commit scheduler failed to shut down within {timeout_ms} ms")]
    SchedulerShutdown { timeout_ms: u64 },
}

/// Coarse failure classes, mirroring the error-handling policy taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Precondition violation by the caller.
    Usage,
    /// Malformed argument value.
    Argument,
    /// The engine is not in a state that permits the operation.
    State,
    /// Page layer failed to read or write.
    Io,
    /// Background worker coordination failure.
    Threading,
}

impl XylemError {
    /// The coarse bucket this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WrongCurrentNode { .. }
            | Self::InvalidQName { .. }
            | Self::InvalidPiTarget { .. }
            | Self::PiContentForbidden
            | Self::CommentContentForbidden
            | Self::EmptyTextValue
            | Self::DuplicateNamespacePrefix { .. }
            | Self::DocumentRootRemoval
            | Self::SecondRootElement
            | Self::TextUnderDocumentRoot
            | Self::MoveIntoOwnSubtree
            | Self::UncommittedModifications { .. }
            | Self::MalformedEventStream
            | Self::NotImplemented(_) => ErrorKind::Usage,

            Self::KeyOutOfRange { .. } | Self::MoveOfSelf => ErrorKind::Argument,

            Self::NodeNotFound { .. }
            | Self::TrxClosed
            | Self::NoSuchRevision { .. }
            | Self::WriterAlreadyActive => ErrorKind::State,

            Self::Io(_) | Self::StoreCorrupt { .. } => ErrorKind::Io,

            Self::SchedulerShutdown { .. } => ErrorKind::Threading,
        }
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, XylemError>;
