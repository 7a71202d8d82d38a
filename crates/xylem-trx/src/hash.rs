//! Node image hashing.
//!
//! Every node contributes `H(image)` where `H` is SHA-256 truncated to the
//! low 64 bits; a parent's hash is `H(image) + PRIME * Σ hash(child)` over
//! namespaces, attributes and structural children. All arithmetic wraps.

use sha2::{Digest, Sha256};
use xylem_types::NodeRecord;

/// Multiplier folding child hashes into a parent hash.
pub const PRIME: i64 = 77081;

/// SHA-256 of the node image, truncated to the low 64 bits.
#[must_use]
pub fn image_hash(record: &NodeRecord) -> i64 {
    let digest = Sha256::digest(record.image_bytes());
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest[..8]);
    i64::from_le_bytes(low)
}

/// Fold one child hash into an accumulating parent hash.
#[inline]
#[must_use]
pub fn fold_child(acc: i64, child_hash: i64) -> i64 {
    acc.wrapping_add(child_hash.wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xylem_types::{NodeDelegate, NodeKey, NodeRecord, StructDelegate, TextNode, ValueDelegate};

    fn text(key: u64, value: &str) -> NodeRecord {
        NodeRecord::Text(TextNode {
            del: NodeDelegate::new(NodeKey::new(key), Some(NodeKey::DOCUMENT_ROOT), None),
            struc: StructDelegate::default(),
            val: ValueDelegate::new(value.as_bytes().to_vec(), false),
        })
    }

    #[test]
    fn test_image_hash_is_deterministic() {
        assert_eq!(image_hash(&text(3, "v")), image_hash(&text(3, "v")));
        assert_ne!(image_hash(&text(3, "v")), image_hash(&text(3, "w")));
        assert_ne!(image_hash(&text(3, "v")), image_hash(&text(4, "v")));
    }

    #[test]
    fn test_fold_child_wraps() {
        // Must not panic near the overflow boundary.
        let folded = fold_child(i64::MAX, i64::MAX);
        let _ = fold_child(folded, i64::MIN);
    }
}
