//! Hash maintenance: rolling path-to-root updates, post-order bulk
//! recomputation, and agreement between the two modes.

mod common;

use common::{resource, write_tx};
use xylem_types::{HashMode, NodeKey, QName, Revision};

fn qn(local: &str) -> QName {
    QName::local(local)
}

/// Each step of the running example keeps the stored rolling hashes equal
/// to a from-scratch post-order recomputation.
#[test]
fn test_rolling_hashes_verify_at_every_step() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);

    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.verify_integrity().unwrap();

    wtx.insert_element_as_first_child(&qn("a")).unwrap();
    wtx.verify_integrity().unwrap();

    wtx.insert_element_as_right_sibling(&qn("b")).unwrap();
    wtx.verify_integrity().unwrap();

    wtx.insert_text_as_right_sibling("x").unwrap();
    wtx.verify_integrity().unwrap();

    wtx.insert_text_as_right_sibling("y").unwrap();
    wtx.verify_integrity().unwrap();

    wtx.move_to(r).unwrap();
    assert_ne!(wtx.hash().unwrap(), 0, "hashed resources store real hashes");
    wtx.commit().unwrap();
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_hash_changes_propagate_to_the_root() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.insert_element_as_first_child(&qn("a")).unwrap();
    wtx.insert_text_as_first_child("v").unwrap();
    let t = wtx.node_key().unwrap();

    wtx.move_to(r).unwrap();
    let before = wtx.hash().unwrap();
    wtx.move_to(t).unwrap();
    wtx.set_value("w").unwrap();
    wtx.move_to(r).unwrap();
    assert_ne!(before, wtx.hash().unwrap(), "value change reaches the root");
    wtx.verify_integrity().unwrap();

    let before = wtx.hash().unwrap();
    assert!(wtx.move_to_first_child().unwrap());
    wtx.set_name(&qn("renamed")).unwrap();
    wtx.move_to(r).unwrap();
    assert_ne!(before, wtx.hash().unwrap(), "rename reaches the root");
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_attribute_and_namespace_hashes_fold_into_element() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("e")).unwrap();
    let e = wtx.node_key().unwrap();

    let before = wtx.hash().unwrap();
    wtx.insert_attribute(&qn("k"), "v").unwrap();
    wtx.move_to(e).unwrap();
    assert_ne!(before, wtx.hash().unwrap());
    wtx.verify_integrity().unwrap();

    let before = wtx.hash().unwrap();
    wtx.insert_namespace(&QName::new("http://example.org", "p", "p"))
        .unwrap();
    wtx.move_to(e).unwrap();
    assert_ne!(before, wtx.hash().unwrap());
    wtx.verify_integrity().unwrap();

    // Removing the attribute restores consistency as well.
    assert!(wtx.move_to_attribute(0).unwrap());
    wtx.remove().unwrap();
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_postorder_mode_stays_consistent() {
    let res = resource(HashMode::Postorder);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    wtx.insert_element_as_first_child(&qn("a")).unwrap();
    wtx.insert_text_as_first_child("t").unwrap();
    wtx.verify_integrity().unwrap();

    wtx.set_value("u").unwrap();
    wtx.verify_integrity().unwrap();

    wtx.remove().unwrap();
    wtx.verify_integrity().unwrap();
}

/// The same edit script yields identical per-node hashes under ROLLING and
/// POSTORDER maintenance.
#[test]
fn test_rolling_and_postorder_agree() {
    let script = |wtx: &xylem_trx::NodeWriteTx| {
        wtx.insert_element_as_first_child(&qn("r")).unwrap();
        let r = wtx.node_key().unwrap();
        wtx.insert_element_as_first_child(&qn("a")).unwrap();
        wtx.insert_attribute(&qn("x"), "1").unwrap();
        wtx.move_to_parent().unwrap();
        wtx.insert_text_as_first_child("t").unwrap();
        wtx.move_to(r).unwrap();
        wtx.insert_element_as_first_child(&qn("first")).unwrap();
        let f = wtx.node_key().unwrap();
        wtx.set_name(&qn("renamed")).unwrap();
        wtx.move_to(f).unwrap();
        wtx.remove().unwrap();
        r
    };

    let rolling = resource(HashMode::Rolling);
    let wtx_r = write_tx(&rolling);
    let root_r = script(&wtx_r);
    wtx_r.verify_integrity().unwrap();

    let postorder = resource(HashMode::Postorder);
    let wtx_p = write_tx(&postorder);
    let root_p = script(&wtx_p);
    wtx_p.verify_integrity().unwrap();

    assert_eq!(root_r, root_p, "identical scripts allocate identical keys");
    for key in 0..=16u64 {
        let key = NodeKey::new(key);
        let (a, b) = (wtx_r.move_to(key).unwrap(), wtx_p.move_to(key).unwrap());
        assert_eq!(a, b, "same records exist under both modes");
        if a {
            assert_eq!(
                wtx_r.hash().unwrap(),
                wtx_p.hash().unwrap(),
                "hash mismatch at {key}"
            );
        }
    }
}

#[test]
fn test_bulk_insert_recomputes_and_commits() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.commit().unwrap();

    let events = vec![
        xylem_trx::TreeEvent::StartElement {
            name: qn("a"),
            namespaces: vec![],
            attributes: vec![(qn("x"), "1".to_owned())],
        },
        xylem_trx::TreeEvent::element("c"),
        xylem_trx::TreeEvent::EndElement,
        xylem_trx::TreeEvent::Text("tx".to_owned()),
        xylem_trx::TreeEvent::EndElement,
    ];
    wtx.move_to(r).unwrap();
    wtx.insert_subtree_as_first_child(events).unwrap();

    // Bulk insert committed on its own.
    assert_eq!(wtx.revision().unwrap(), Revision::new(2));
    assert_eq!(wtx.modification_count().unwrap(), 0);

    // Cursor is on the inserted subtree root.
    assert_eq!(wtx.name().unwrap().unwrap().local_name(), "a");
    assert_eq!(wtx.attribute_count().unwrap(), 1);
    assert_eq!(wtx.child_count().unwrap(), 2);
    assert_eq!(wtx.descendant_count().unwrap(), 2);

    wtx.move_to(r).unwrap();
    assert_eq!(wtx.descendant_count().unwrap(), 3);
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_unbalanced_event_stream_rejected() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();

    let events = vec![xylem_trx::TreeEvent::element("open")];
    let err = wtx.insert_subtree_as_first_child(events).unwrap_err();
    assert_eq!(err.kind(), xylem_error::ErrorKind::Usage);

    let events = vec![
        xylem_trx::TreeEvent::element("a"),
        xylem_trx::TreeEvent::EndElement,
        xylem_trx::TreeEvent::element("b"),
        xylem_trx::TreeEvent::EndElement,
    ];
    let err = wtx.insert_subtree_as_first_child(events).unwrap_err();
    assert_eq!(err.kind(), xylem_error::ErrorKind::Usage);
}
