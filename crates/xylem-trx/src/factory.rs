//! Node factory.
//!
//! Builds fresh node records with page-allocated keys, hash 0 and
//! descendant count 0, interning name parts through the page transaction.
//! Rebuilt whenever the write transaction reinstantiates its page
//! transaction.

use xylem_error::Result;
use xylem_page::PageTx;
use xylem_types::{
    AttributeNode, CommentNode, DeweyId, ElementNode, NameDelegate, NamespaceNode, NodeDelegate,
    NodeKey, NodeKind, NodeRecord, PiNode, QName, StructDelegate, TextNode, ValueDelegate,
};

#[derive(Debug, Default)]
pub struct NodeFactory;

impl NodeFactory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn intern_name(
        page: &mut dyn PageTx,
        name: &QName,
        kind: NodeKind,
        path_node_key: u64,
    ) -> Result<NameDelegate> {
        let prefix_key = if name.prefix().is_empty() {
            None
        } else {
            Some(page.create_name_key(name.prefix(), kind)?)
        };
        let local_name_key = Some(page.create_name_key(name.local_name(), kind)?);
        let uri_key = if name.namespace_uri().is_empty() {
            None
        } else {
            Some(page.create_name_key(name.namespace_uri(), NodeKind::Namespace)?)
        };
        Ok(NameDelegate {
            prefix_key,
            local_name_key,
            uri_key,
            path_node_key,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_element(
        &self,
        page: &mut dyn PageTx,
        parent: NodeKey,
        left_sibling: Option<NodeKey>,
        right_sibling: Option<NodeKey>,
        name: &QName,
        path_node_key: u64,
        dewey_id: Option<DeweyId>,
    ) -> Result<NodeKey> {
        let name = Self::intern_name(page, name, NodeKind::Element, path_node_key)?;
        let key = page.allocate_node_key();
        page.insert_record(NodeRecord::Element(ElementNode {
            del: NodeDelegate::new(key, Some(parent), dewey_id),
            struc: StructDelegate::siblings(left_sibling, right_sibling),
            name,
            attribute_keys: Vec::new(),
            namespace_keys: Vec::new(),
        }))?;
        Ok(key)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_text(
        &self,
        page: &mut dyn PageTx,
        parent: NodeKey,
        left_sibling: Option<NodeKey>,
        right_sibling: Option<NodeKey>,
        value: Vec<u8>,
        compressed: bool,
        dewey_id: Option<DeweyId>,
    ) -> Result<NodeKey> {
        let key = page.allocate_node_key();
        page.insert_record(NodeRecord::Text(TextNode {
            del: NodeDelegate::new(key, Some(parent), dewey_id),
            struc: StructDelegate::siblings(left_sibling, right_sibling),
            val: ValueDelegate::new(value, compressed),
        }))?;
        Ok(key)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_comment(
        &self,
        page: &mut dyn PageTx,
        parent: NodeKey,
        left_sibling: Option<NodeKey>,
        right_sibling: Option<NodeKey>,
        value: Vec<u8>,
        compressed: bool,
        dewey_id: Option<DeweyId>,
    ) -> Result<NodeKey> {
        let key = page.allocate_node_key();
        page.insert_record(NodeRecord::Comment(CommentNode {
            del: NodeDelegate::new(key, Some(parent), dewey_id),
            struc: StructDelegate::siblings(left_sibling, right_sibling),
            val: ValueDelegate::new(value, compressed),
        }))?;
        Ok(key)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_pi(
        &self,
        page: &mut dyn PageTx,
        parent: NodeKey,
        left_sibling: Option<NodeKey>,
        right_sibling: Option<NodeKey>,
        target: &QName,
        content: Vec<u8>,
        compressed: bool,
        path_node_key: u64,
        dewey_id: Option<DeweyId>,
    ) -> Result<NodeKey> {
        let name = Self::intern_name(page, target, NodeKind::ProcessingInstruction, path_node_key)?;
        let key = page.allocate_node_key();
        page.insert_record(NodeRecord::ProcessingInstruction(PiNode {
            del: NodeDelegate::new(key, Some(parent), dewey_id),
            struc: StructDelegate::siblings(left_sibling, right_sibling),
            name,
            val: ValueDelegate::new(content, compressed),
        }))?;
        Ok(key)
    }

    pub fn create_attribute(
        &self,
        page: &mut dyn PageTx,
        parent: NodeKey,
        name: &QName,
        value: Vec<u8>,
        path_node_key: u64,
        dewey_id: Option<DeweyId>,
    ) -> Result<NodeKey> {
        let name = Self::intern_name(page, name, NodeKind::Attribute, path_node_key)?;
        let key = page.allocate_node_key();
        page.insert_record(NodeRecord::Attribute(AttributeNode {
            del: NodeDelegate::new(key, Some(parent), dewey_id),
            name,
            val: ValueDelegate::new(value, false),
        }))?;
        Ok(key)
    }

    pub fn create_namespace(
        &self,
        page: &mut dyn PageTx,
        parent: NodeKey,
        name: &QName,
        path_node_key: u64,
        dewey_id: Option<DeweyId>,
    ) -> Result<NodeKey> {
        let name = Self::intern_name(page, name, NodeKind::Namespace, path_node_key)?;
        let key = page.allocate_node_key();
        page.insert_record(NodeRecord::Namespace(NamespaceNode {
            del: NodeDelegate::new(key, Some(parent), dewey_id),
            name,
        }))?;
        Ok(key)
    }
}
