//! Event streams for bulk subtree loading.
//!
//! A subtree is described by a flat stream of [`TreeEvent`]s (the shape a
//! StAX-style parser produces). The write transaction's builder consumes
//! the stream and drives the regular insert operations, so every invariant
//! and notification applies to bulk loads as well.

use xylem_types::QName;

/// One event of a serialized subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    StartElement {
        name: QName,
        /// Namespace declarations, applied before attributes.
        namespaces: Vec<QName>,
        attributes: Vec<(QName, String)>,
    },
    EndElement,
    Text(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        content: String,
    },
}

impl TreeEvent {
    /// Plain element without namespaces or attributes.
    #[must_use]
    pub fn element(name: &str) -> Self {
        Self::StartElement {
            name: QName::local(name),
            namespaces: Vec::new(),
            attributes: Vec::new(),
        }
    }
}
