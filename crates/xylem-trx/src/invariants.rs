//! Tree integrity checks.
//!
//! Walks a revision and verifies pointer symmetry, child and descendant
//! counts, the text-merge invariant, attribute/namespace name uniqueness,
//! document-root shape, order-key consistency and (for hashed resources)
//! that every stored hash equals a from-scratch post-order recomputation.

use std::collections::HashSet;

use xylem_error::{Result, XylemError};
use xylem_page::PageReadTx;
use xylem_types::{HashMode, NodeKey, NodeKind, NodeRecord};

use crate::axis;
use crate::hash::{fold_child, image_hash};
use crate::names::resolve_qname;

fn corrupt(detail: String) -> XylemError {
    XylemError::StoreCorrupt { detail }
}

fn get<'a>(page: &'a dyn PageReadTx, key: NodeKey) -> Result<&'a NodeRecord> {
    page.get_record(key)
        .ok_or(XylemError::NodeNotFound { key: key.get() })
}

/// From-scratch post-order hash of a subtree.
fn recompute_hash(page: &dyn PageReadTx, key: NodeKey) -> Result<i64> {
    let record = get(page, key)?;
    let mut hash = image_hash(record);
    if let Some(element) = record.as_element() {
        for &sub in element.namespace_keys.iter().chain(&element.attribute_keys) {
            hash = fold_child(hash, image_hash(get(page, sub)?));
        }
    }
    for child in axis::children(page, key)? {
        hash = fold_child(hash, recompute_hash(page, child)?);
    }
    Ok(hash)
}

/// Verify all maintained invariants over the tree of `page`.
pub fn check_tree(page: &dyn PageReadTx, hash_mode: HashMode, dewey_ids: bool) -> Result<()> {
    let keys = axis::descendants(page, NodeKey::DOCUMENT_ROOT)?;
    let mut previous_dewey: Option<xylem_types::DeweyId> = None;

    for &key in &keys {
        let record = get(page, key)?;
        let s = record
            .as_struct()
            .ok_or_else(|| corrupt(format!("non-structural node {key} in sibling chain")))?;

        // Document-root shape.
        if record.kind() == NodeKind::DocumentRoot {
            if record.parent().is_some() || s.left_sibling.is_some() || s.right_sibling.is_some() {
                return Err(corrupt("document root with parent or siblings".to_owned()));
            }
            let mut element_children = 0;
            for child in axis::children(page, key)? {
                match get(page, child)?.kind() {
                    NodeKind::Element => element_children += 1,
                    NodeKind::Comment | NodeKind::ProcessingInstruction => {}
                    kind => {
                        return Err(corrupt(format!(
                            "{kind} node {child} under the document root"
                        )));
                    }
                }
            }
            if element_children > 1 {
                return Err(corrupt("multiple element children at the root".to_owned()));
            }
        }

        // Pointer symmetry, child count, text merging, sibling order keys.
        let children = axis::children(page, key)?;
        if s.first_child != children.first().copied() {
            return Err(corrupt(format!("first-child pointer mismatch at {key}")));
        }
        let mut previous: Option<NodeKey> = None;
        let mut previous_kind: Option<NodeKind> = None;
        let mut descendant_sum = 0u64;
        for &child in &children {
            let crec = get(page, child)?;
            let cs = crec
                .as_struct()
                .ok_or_else(|| corrupt(format!("non-structural child {child}")))?;
            if crec.parent() != Some(key) {
                return Err(corrupt(format!("parent pointer mismatch at {child}")));
            }
            if cs.left_sibling != previous {
                return Err(corrupt(format!("left-sibling pointer mismatch at {child}")));
            }
            if let Some(prev) = previous {
                let ps = get(page, prev)?
                    .as_struct()
                    .copied()
                    .ok_or_else(|| corrupt(format!("non-structural child {prev}")))?;
                if ps.right_sibling != Some(child) {
                    return Err(corrupt(format!("right-sibling pointer mismatch at {prev}")));
                }
            }
            if previous_kind == Some(NodeKind::Text) && crec.kind() == NodeKind::Text {
                return Err(corrupt(format!("adjacent text siblings at {child}")));
            }
            if dewey_ids {
                let cur_id = crec
                    .dewey_id()
                    .cloned()
                    .ok_or_else(|| corrupt(format!("node {child} without an order key")))?;
                if let Some(prev) = previous {
                    let prev_id = get(page, prev)?
                        .dewey_id()
                        .cloned()
                        .ok_or_else(|| corrupt(format!("node {prev} without an order key")))?;
                    if prev_id >= cur_id {
                        return Err(corrupt(format!(
                            "sibling order keys out of order at {child}"
                        )));
                    }
                }
            }
            descendant_sum += cs.descendant_count + 1;
            previous = Some(child);
            previous_kind = Some(crec.kind());
        }
        if s.child_count != children.len() as u64 {
            return Err(corrupt(format!(
                "child count {} != {} children at {key}",
                s.child_count,
                children.len()
            )));
        }
        if s.descendant_count != descendant_sum {
            return Err(corrupt(format!(
                "descendant count {} != {} at {key}",
                s.descendant_count, descendant_sum
            )));
        }

        // Attribute and namespace uniqueness.
        if let Some(element) = record.as_element() {
            let mut seen_attributes = HashSet::new();
            for &att in &element.attribute_keys {
                let arec = get(page, att)?;
                if arec.parent() != Some(key) {
                    return Err(corrupt(format!("attribute parent mismatch at {att}")));
                }
                let name = resolve_qname(page, arec)
                    .ok_or_else(|| corrupt(format!("attribute {att} without a name")))?;
                if !seen_attributes.insert((name.prefix().to_owned(), name.local_name().to_owned()))
                {
                    return Err(corrupt(format!("duplicate attribute name at {key}")));
                }
            }
            let mut seen_prefixes = HashSet::new();
            for &ns in &element.namespace_keys {
                let nrec = get(page, ns)?;
                if nrec.parent() != Some(key) {
                    return Err(corrupt(format!("namespace parent mismatch at {ns}")));
                }
                let name = resolve_qname(page, nrec)
                    .ok_or_else(|| corrupt(format!("namespace {ns} without a name")))?;
                if !seen_prefixes.insert(name.prefix().to_owned()) {
                    return Err(corrupt(format!("duplicate namespace prefix at {key}")));
                }
            }
        }

        // Document-order key monotonicity (pre-order walk).
        if dewey_ids {
            let id = record
                .dewey_id()
                .cloned()
                .ok_or_else(|| corrupt(format!("node {key} without an order key")))?;
            if let Some(prev) = &previous_dewey {
                if *prev >= id {
                    return Err(corrupt(format!(
                        "document-order keys not increasing at {key}"
                    )));
                }
            }
            previous_dewey = Some(id);
        }
    }

    // Hash consistency: stored hashes must equal the post-order formula.
    if hash_mode != HashMode::None {
        for &key in &keys {
            let stored = get(page, key)?.hash();
            let expected = recompute_hash(page, key)?;
            if stored != expected {
                return Err(corrupt(format!(
                    "stored hash {stored} != recomputed {expected} at {key}"
                )));
            }
        }
    }
    Ok(())
}
