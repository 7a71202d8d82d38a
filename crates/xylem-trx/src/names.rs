//! Name resolution helpers shared by the transaction layer.

use xylem_page::PageReadTx;
use xylem_types::{NameKey, NodeKind, NodeRecord, QName};

/// Resolve the qualified name of a name node through the name dictionary.
///
/// Returns `None` for kinds without a name.
#[must_use]
pub fn resolve_qname<P: PageReadTx + ?Sized>(page: &P, record: &NodeRecord) -> Option<QName> {
    let name = record.as_name()?;
    let kind = record.kind();
    let part = |key: Option<NameKey>, k: NodeKind| -> String {
        key.and_then(|key| page.get_name(key, k))
            .unwrap_or_default()
            .to_owned()
    };
    Some(QName::new(
        part(name.uri_key, NodeKind::Namespace),
        part(name.prefix_key, kind),
        part(name.local_name_key, kind),
    ))
}

/// Decode a value node's bytes as UTF-8 (lossy).
#[must_use]
pub fn value_string(record: &NodeRecord) -> Option<String> {
    record
        .as_value()
        .map(|v| String::from_utf8_lossy(&v.value).into_owned())
}
