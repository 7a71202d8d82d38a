//! Hierarchical order keys.
//!
//! A [`DeweyId`] is a variable-length sequence of integer divisions encoding
//! a tree position so that lexicographic order on the division vectors
//! equals document order. Level divisions are odd; even divisions are
//! padding introduced when no odd division fits between two neighbours.
//! Namespaces of an element live under the reserved division 0, attributes
//! under the reserved division 1, and structural children use odd divisions
//! of at least 3 — so namespaces sort before attributes, which sort before
//! all children of the same element.

use std::fmt;

/// Division appended for a first child (leaves gaps for later inserts).
const FIRST_DIV: u32 = 17;

/// Reserved marker division for namespace order keys.
const NAMESPACE_MARK: u32 = 0;

/// Reserved marker division for attribute order keys.
const ATTRIBUTE_MARK: u32 = 1;

/// A hierarchical order key.
///
/// The derived `Ord` (lexicographic on divisions) is document order.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct DeweyId {
    divisions: Vec<u32>,
}

impl DeweyId {
    /// The order key of the document root.
    #[must_use]
    pub fn document() -> Self {
        Self { divisions: vec![1] }
    }

    /// Construct from raw divisions. The last division must be odd.
    #[must_use]
    pub fn from_divisions(divisions: Vec<u32>) -> Option<Self> {
        match divisions.last() {
            Some(d) if d % 2 == 1 => Some(Self { divisions }),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn divisions(&self) -> &[u32] {
        &self.divisions
    }

    /// Structural level of this key: the number of odd level divisions,
    /// not counting attribute markers.
    #[must_use]
    pub fn level(&self) -> usize {
        self.divisions
            .iter()
            .enumerate()
            .filter(|&(idx, &d)| d % 2 == 1 && !(idx > 0 && d == ATTRIBUTE_MARK))
            .count()
    }

    /// Key for a first child of `self` when no sibling exists yet.
    #[must_use]
    pub fn new_child(&self) -> Self {
        let mut divisions = self.divisions.clone();
        divisions.push(FIRST_DIV);
        Self { divisions }
    }

    /// Key for the first attribute of the element keyed by `self`.
    #[must_use]
    pub fn new_attribute(&self) -> Self {
        let mut divisions = self.divisions.clone();
        divisions.push(ATTRIBUTE_MARK);
        divisions.push(FIRST_DIV);
        Self { divisions }
    }

    /// Key for the first namespace of the element keyed by `self`.
    #[must_use]
    pub fn new_namespace(&self) -> Self {
        let mut divisions = self.divisions.clone();
        divisions.push(NAMESPACE_MARK);
        divisions.push(FIRST_DIV);
        Self { divisions }
    }

    /// Whether `self` is a proper prefix (ancestor key) of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.divisions.len() > self.divisions.len()
            && other.divisions[..self.divisions.len()] == self.divisions[..]
    }

    /// A key strictly between two sibling keys.
    ///
    /// With only `left`, produces a key after it; with only `right`, a key
    /// before it. Returns `None` when both are absent, when
    /// `left >= right`, or when one key is an ancestor of the other.
    #[must_use]
    pub fn new_between(left: Option<&Self>, right: Option<&Self>) -> Option<Self> {
        match (left, right) {
            (None, None) => None,
            (Some(a), None) => {
                let mut divisions = a.divisions.clone();
                *divisions.last_mut()? += 2;
                Some(Self { divisions })
            }
            (None, Some(b)) => {
                // Skip back over padding to the start of the sibling block.
                let mut idx = b.divisions.len().checked_sub(1)?;
                while idx > 0 {
                    let prev = b.divisions[idx - 1];
                    if prev % 2 == 0 && prev >= 2 {
                        idx -= 1;
                    } else {
                        break;
                    }
                }
                descend_before(&b.divisions, idx)
            }
            (Some(a), Some(b)) => {
                if a >= b {
                    return None;
                }
                let i = a
                    .divisions
                    .iter()
                    .zip(&b.divisions)
                    .position(|(x, y)| x != y)?;
                let la = a.divisions[i];
                let lb = b.divisions[i];
                let gap = lb - la;
                if gap == 1 {
                    if a.divisions.len() > i + 1 {
                        let mut divisions = a.divisions.clone();
                        *divisions.last_mut()? += 2;
                        Some(Self { divisions })
                    } else {
                        descend_before(&b.divisions, i + 1)
                    }
                } else if gap == 2 && la % 2 == 1 {
                    let mut divisions = a.divisions[..i].to_vec();
                    divisions.push(la + 1);
                    divisions.push(FIRST_DIV);
                    Some(Self { divisions })
                } else {
                    let d = if la % 2 == 0 { la + 1 } else { la + 2 };
                    let mut divisions = a.divisions[..i].to_vec();
                    divisions.push(d);
                    Some(Self { divisions })
                }
            }
        }
    }
}

/// A key just before the sibling block of `divs[start..]`, sharing
/// `divs[..start]` as prefix.
fn descend_before(divs: &[u32], start: usize) -> Option<DeweyId> {
    for (j, &d) in divs.iter().enumerate().skip(start) {
        if d % 2 == 0 {
            continue;
        }
        if d >= 5 {
            let mut divisions = divs[..j].to_vec();
            divisions.push(d - 2);
            return Some(DeweyId { divisions });
        }
        if d == 3 {
            let mut divisions = divs[..j].to_vec();
            divisions.push(2);
            divisions.push(FIRST_DIV);
            return Some(DeweyId { divisions });
        }
        // d == 1: root or marker division, nothing fits before it.
        return None;
    }
    None
}

impl fmt::Display for DeweyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for d in &self.divisions {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{d}")?;
            first = false;
        }
        Ok(())
    }
}
