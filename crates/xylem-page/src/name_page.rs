//! Interned name parts with reference counts.
//!
//! Prefixes, local names and namespace URIs are interned per node kind;
//! every node referencing a name holds one count, released on removal or
//! rename.

use std::collections::HashMap;

use xylem_types::{NameKey, NodeKind};

#[derive(Debug, Clone)]
struct NameEntry {
    name: String,
    refs: u64,
}

/// The name dictionary of one revision.
#[derive(Debug, Clone, Default)]
pub struct NamePage {
    next: u32,
    forward: HashMap<(NodeKind, String), NameKey>,
    back: HashMap<(NodeKind, NameKey), NameEntry>,
}

impl NamePage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name` under `kind`, bumping its reference count.
    pub fn create_name_key(&mut self, name: &str, kind: NodeKind) -> NameKey {
        if let Some(&key) = self.forward.get(&(kind, name.to_owned())) {
            if let Some(entry) = self.back.get_mut(&(kind, key)) {
                entry.refs += 1;
            }
            return key;
        }
        let key = NameKey::new(self.next);
        self.next += 1;
        self.forward.insert((kind, name.to_owned()), key);
        self.back.insert(
            (kind, key),
            NameEntry {
                name: name.to_owned(),
                refs: 1,
            },
        );
        key
    }

    /// Drop one reference; the mapping is removed when the count reaches 0.
    pub fn remove_name(&mut self, key: NameKey, kind: NodeKind) {
        let Some(entry) = self.back.get_mut(&(kind, key)) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            let name = entry.name.clone();
            self.back.remove(&(kind, key));
            self.forward.remove(&(kind, name));
        }
    }

    #[must_use]
    pub fn get_name(&self, key: NameKey, kind: NodeKind) -> Option<&str> {
        self.back.get(&(kind, key)).map(|e| e.name.as_str())
    }

    /// Current reference count of an interned name, 0 when absent.
    #[must_use]
    pub fn reference_count(&self, key: NameKey, kind: NodeKind) -> u64 {
        self.back.get(&(kind, key)).map_or(0, |e| e.refs)
    }
}
