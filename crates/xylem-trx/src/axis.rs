//! Internal structural traversals.
//!
//! Non-recursive pre- and post-order walks over the first-child/sibling
//! chain. These back the write transaction's subtree operations; the query
//! axes proper live outside this crate.

use xylem_error::{Result, XylemError};
use xylem_page::PageReadTx;
use xylem_types::NodeKey;

fn struct_of<P: PageReadTx + ?Sized>(
    page: &P,
    key: NodeKey,
) -> Result<xylem_types::StructDelegate> {
    let record = page
        .get_record(key)
        .ok_or(XylemError::NodeNotFound { key: key.get() })?;
    record
        .as_struct()
        .copied()
        .ok_or_else(|| XylemError::StoreCorrupt {
            detail: format!("node {key} in a structural chain is not structural"),
        })
}

/// Structural children of `key`, in document order.
pub fn children<P: PageReadTx + ?Sized>(page: &P, key: NodeKey) -> Result<Vec<NodeKey>> {
    let mut out = Vec::new();
    let mut next = struct_of(page, key)?.first_child;
    while let Some(child) = next {
        out.push(child);
        next = struct_of(page, child)?.right_sibling;
    }
    Ok(out)
}

/// Keys of the subtree rooted at `root` in document (pre-)order,
/// including `root` itself. Structural nodes only.
pub fn descendants<P: PageReadTx + ?Sized>(page: &P, root: NodeKey) -> Result<Vec<NodeKey>> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(key) = stack.pop() {
        out.push(key);
        let mut kids = children(page, key)?;
        kids.reverse();
        stack.extend(kids);
    }
    Ok(out)
}

/// Keys of the subtree rooted at `root` in post-order, including `root`.
/// Structural nodes only.
pub fn post_order<P: PageReadTx + ?Sized>(page: &P, root: NodeKey) -> Result<Vec<NodeKey>> {
    // Post-order is the reverse of a pre-order walk that visits children
    // right to left.
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(key) = stack.pop() {
        out.push(key);
        stack.extend(children(page, key)?);
    }
    out.reverse();
    Ok(out)
}
