//! Node records of the XDM tree.
//!
//! Each record is a tagged variant built from small delegate structs: every
//! node has a [`NodeDelegate`], structural nodes add a [`StructDelegate`],
//! name nodes a [`NameDelegate`] and value nodes a [`ValueDelegate`].
//! Pointers between nodes are stored keys, never owning references; all
//! lookups go through the page transaction.

use crate::dewey::DeweyId;
use crate::{NameKey, NodeKey, NodeKind};

/// State shared by every node record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeDelegate {
    pub node_key: NodeKey,
    pub parent: Option<NodeKey>,
    /// Rolling or post-order hash; 0 when hashing is disabled or pending.
    pub hash: i64,
    pub dewey_id: Option<DeweyId>,
}

impl NodeDelegate {
    #[must_use]
    pub fn new(node_key: NodeKey, parent: Option<NodeKey>, dewey_id: Option<DeweyId>) -> Self {
        Self {
            node_key,
            parent,
            hash: 0,
            dewey_id,
        }
    }
}

/// Sibling/child topology of a structural node.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct StructDelegate {
    pub first_child: Option<NodeKey>,
    pub left_sibling: Option<NodeKey>,
    pub right_sibling: Option<NodeKey>,
    pub child_count: u64,
    pub descendant_count: u64,
}

impl StructDelegate {
    #[must_use]
    pub fn siblings(left_sibling: Option<NodeKey>, right_sibling: Option<NodeKey>) -> Self {
        Self {
            left_sibling,
            right_sibling,
            ..Self::default()
        }
    }
}

/// Interned name keys of a name node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct NameDelegate {
    pub prefix_key: Option<NameKey>,
    pub local_name_key: Option<NameKey>,
    pub uri_key: Option<NameKey>,
    /// Link into the path summary; 0 when no path summary is maintained.
    pub path_node_key: u64,
}

/// Byte-encoded value of a value node.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValueDelegate {
    pub value: Vec<u8>,
    pub compressed: bool,
}

impl ValueDelegate {
    #[must_use]
    pub fn new(value: Vec<u8>, compressed: bool) -> Self {
        Self { value, compressed }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DocumentRootNode {
    pub del: NodeDelegate,
    pub struc: StructDelegate,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ElementNode {
    pub del: NodeDelegate,
    pub struc: StructDelegate,
    pub name: NameDelegate,
    /// Keys of attribute nodes, in insertion order.
    pub attribute_keys: Vec<NodeKey>,
    /// Keys of namespace nodes, in insertion order.
    pub namespace_keys: Vec<NodeKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AttributeNode {
    pub del: NodeDelegate,
    pub name: NameDelegate,
    pub val: ValueDelegate,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NamespaceNode {
    pub del: NodeDelegate,
    pub name: NameDelegate,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextNode {
    pub del: NodeDelegate,
    pub struc: StructDelegate,
    pub val: ValueDelegate,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommentNode {
    pub del: NodeDelegate,
    pub struc: StructDelegate,
    pub val: ValueDelegate,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PiNode {
    pub del: NodeDelegate,
    pub struc: StructDelegate,
    pub name: NameDelegate,
    pub val: ValueDelegate,
}

/// A node record: the unit stored and copied by the page layer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NodeRecord {
    DocumentRoot(DocumentRootNode),
    Element(ElementNode),
    Attribute(AttributeNode),
    Namespace(NamespaceNode),
    Text(TextNode),
    Comment(CommentNode),
    ProcessingInstruction(PiNode),
}

impl NodeRecord {
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::DocumentRoot(_) => NodeKind::DocumentRoot,
            Self::Element(_) => NodeKind::Element,
            Self::Attribute(_) => NodeKind::Attribute,
            Self::Namespace(_) => NodeKind::Namespace,
            Self::Text(_) => NodeKind::Text,
            Self::Comment(_) => NodeKind::Comment,
            Self::ProcessingInstruction(_) => NodeKind::ProcessingInstruction,
        }
    }

    #[must_use]
    pub fn delegate(&self) -> &NodeDelegate {
        match self {
            Self::DocumentRoot(n) => &n.del,
            Self::Element(n) => &n.del,
            Self::Attribute(n) => &n.del,
            Self::Namespace(n) => &n.del,
            Self::Text(n) => &n.del,
            Self::Comment(n) => &n.del,
            Self::ProcessingInstruction(n) => &n.del,
        }
    }

    #[must_use]
    pub fn delegate_mut(&mut self) -> &mut NodeDelegate {
        match self {
            Self::DocumentRoot(n) => &mut n.del,
            Self::Element(n) => &mut n.del,
            Self::Attribute(n) => &mut n.del,
            Self::Namespace(n) => &mut n.del,
            Self::Text(n) => &mut n.del,
            Self::Comment(n) => &mut n.del,
            Self::ProcessingInstruction(n) => &mut n.del,
        }
    }

    #[inline]
    #[must_use]
    pub fn node_key(&self) -> NodeKey {
        self.delegate().node_key
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeKey> {
        self.delegate().parent
    }

    #[inline]
    #[must_use]
    pub fn hash(&self) -> i64 {
        self.delegate().hash
    }

    #[inline]
    pub fn set_hash(&mut self, hash: i64) {
        self.delegate_mut().hash = hash;
    }

    #[inline]
    #[must_use]
    pub fn dewey_id(&self) -> Option<&DeweyId> {
        self.delegate().dewey_id.as_ref()
    }

    #[must_use]
    pub fn as_struct(&self) -> Option<&StructDelegate> {
        match self {
            Self::DocumentRoot(n) => Some(&n.struc),
            Self::Element(n) => Some(&n.struc),
            Self::Text(n) => Some(&n.struc),
            Self::Comment(n) => Some(&n.struc),
            Self::ProcessingInstruction(n) => Some(&n.struc),
            Self::Attribute(_) | Self::Namespace(_) => None,
        }
    }

    #[must_use]
    pub fn as_struct_mut(&mut self) -> Option<&mut StructDelegate> {
        match self {
            Self::DocumentRoot(n) => Some(&mut n.struc),
            Self::Element(n) => Some(&mut n.struc),
            Self::Text(n) => Some(&mut n.struc),
            Self::Comment(n) => Some(&mut n.struc),
            Self::ProcessingInstruction(n) => Some(&mut n.struc),
            Self::Attribute(_) | Self::Namespace(_) => None,
        }
    }

    #[must_use]
    pub fn as_name(&self) -> Option<&NameDelegate> {
        match self {
            Self::Element(n) => Some(&n.name),
            Self::Attribute(n) => Some(&n.name),
            Self::Namespace(n) => Some(&n.name),
            Self::ProcessingInstruction(n) => Some(&n.name),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_name_mut(&mut self) -> Option<&mut NameDelegate> {
        match self {
            Self::Element(n) => Some(&mut n.name),
            Self::Attribute(n) => Some(&mut n.name),
            Self::Namespace(n) => Some(&mut n.name),
            Self::ProcessingInstruction(n) => Some(&mut n.name),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&ValueDelegate> {
        match self {
            Self::Attribute(n) => Some(&n.val),
            Self::Text(n) => Some(&n.val),
            Self::Comment(n) => Some(&n.val),
            Self::ProcessingInstruction(n) => Some(&n.val),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_value_mut(&mut self) -> Option<&mut ValueDelegate> {
        match self {
            Self::Attribute(n) => Some(&mut n.val),
            Self::Text(n) => Some(&mut n.val),
            Self::Comment(n) => Some(&mut n.val),
            Self::ProcessingInstruction(n) => Some(&mut n.val),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Self::Element(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_element_mut(&mut self) -> Option<&mut ElementNode> {
        match self {
            Self::Element(n) => Some(n),
            _ => None,
        }
    }

    /// Canonical image of the node for hashing.
    ///
    /// Covers the identity-bearing fields only: kind, node key, name keys and
    /// value bytes. Topology pointers, counts and the stored hash are
    /// excluded so that pointer surgery does not change the image.
    #[must_use]
    pub fn image_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.push(match self.kind() {
            NodeKind::DocumentRoot => 0u8,
            NodeKind::Element => 1,
            NodeKind::Attribute => 2,
            NodeKind::Namespace => 3,
            NodeKind::Text => 4,
            NodeKind::Comment => 5,
            NodeKind::ProcessingInstruction => 6,
        });
        out.extend_from_slice(&self.node_key().get().to_le_bytes());
        if let Some(name) = self.as_name() {
            let part = |k: Option<NameKey>| k.map_or(u32::MAX, NameKey::get);
            out.extend_from_slice(&part(name.prefix_key).to_le_bytes());
            out.extend_from_slice(&part(name.local_name_key).to_le_bytes());
            out.extend_from_slice(&part(name.uri_key).to_le_bytes());
        }
        if let Some(val) = self.as_value() {
            out.extend_from_slice(&(val.value.len() as u64).to_le_bytes());
            out.extend_from_slice(&val.value);
        }
        out
    }
}
