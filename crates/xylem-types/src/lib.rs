pub mod dewey;
pub mod node;
pub mod qname;

pub use dewey::DeweyId;
pub use node::{
    AttributeNode, CommentNode, DocumentRootNode, ElementNode, NameDelegate, NamespaceNode,
    NodeDelegate, NodeRecord, PiNode, StructDelegate, TextNode, ValueDelegate,
};
pub use qname::QName;

use std::fmt;

/// Key of a node record within a resource.
///
/// Allocated monotonically by the page layer, unique within a resource and
/// never reused. Key 0 is always the document root.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct NodeKey(u64);

impl NodeKey {
    /// The fixed key of the document root node.
    pub const DOCUMENT_ROOT: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the document root key.
    #[inline]
    #[must_use]
    pub const fn is_document_root(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A committed revision number.
///
/// Revision 0 is the bootstrap revision holding only the document root.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct Revision(u32);

impl Revision {
    /// The bootstrap revision.
    pub const BOOTSTRAP: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(rev: u32) -> Self {
        Self(rev)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Interned id of a name part (prefix, local name or namespace URI).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct NameKey(u32);

impl NameKey {
    #[inline]
    #[must_use]
    pub const fn new(key: u32) -> Self {
        Self(key)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Node kinds of the XDM data model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum NodeKind {
    DocumentRoot,
    Element,
    Attribute,
    Namespace,
    Text,
    Comment,
    ProcessingInstruction,
}

impl NodeKind {
    /// Structural nodes participate in the first-child/sibling chain.
    #[must_use]
    pub const fn is_structural(self) -> bool {
        matches!(
            self,
            Self::DocumentRoot
                | Self::Element
                | Self::Text
                | Self::Comment
                | Self::ProcessingInstruction
        )
    }

    /// Name nodes carry interned prefix/local-name/URI keys.
    #[must_use]
    pub const fn is_name(self) -> bool {
        matches!(
            self,
            Self::Element | Self::Attribute | Self::Namespace | Self::ProcessingInstruction
        )
    }

    /// Value nodes carry a byte-encoded value.
    #[must_use]
    pub const fn is_value(self) -> bool {
        matches!(
            self,
            Self::Text | Self::Comment | Self::Attribute | Self::ProcessingInstruction
        )
    }

    /// Short lowercase name for error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DocumentRoot => "document root",
            Self::Element => "element",
            Self::Attribute => "attribute",
            Self::Namespace => "namespace",
            Self::Text => "text",
            Self::Comment => "comment",
            Self::ProcessingInstruction => "processing instruction",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a new or relocated node is spliced relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertPosition {
    AsFirstChild,
    AsLeftSibling,
    AsRightSibling,
}

/// Per-node hash maintenance mode, selected at resource creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HashMode {
    /// No hashes are maintained.
    None,
    /// Incremental path-to-root updates after every edit.
    Rolling,
    /// Bulk post-order recomputation after every edit.
    Postorder,
}

/// Cursor movement after inserting a non-structural node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Movement {
    /// Stay on the inserted node.
    None,
    /// Move back to the owning element.
    ToParent,
}
