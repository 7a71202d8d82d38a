//! Structural edit operations: insert, text merging, remove, move,
//! attributes and namespaces.

mod common;

use common::{resource, write_tx};
use proptest::prelude::*;
use xylem_error::ErrorKind;
use xylem_types::{HashMode, NodeKey, NodeKind, QName};

fn qn(local: &str) -> QName {
    QName::local(local)
}

/// Build `<r><a/><b/>xy</r>` and return the keys of `r`, `a`, `b` and the
/// merged text node.
fn build_example(wtx: &xylem_trx::NodeWriteTx) -> (NodeKey, NodeKey, NodeKey, NodeKey) {
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.insert_element_as_first_child(&qn("a")).unwrap();
    let a = wtx.node_key().unwrap();
    wtx.insert_element_as_right_sibling(&qn("b")).unwrap();
    let b = wtx.node_key().unwrap();
    wtx.insert_text_as_right_sibling("x").unwrap();
    let t = wtx.node_key().unwrap();
    wtx.insert_text_as_right_sibling("y").unwrap();
    assert_eq!(
        wtx.node_key().unwrap(),
        t,
        "second text insert merges into the first text node"
    );
    (r, a, b, t)
}

#[test]
fn test_insert_and_text_merge_shape() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);
    let (r, a, b, t) = build_example(&wtx);

    wtx.move_to(r).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 3);
    assert_eq!(wtx.descendant_count().unwrap(), 3);

    assert!(wtx.move_to_first_child().unwrap());
    assert_eq!(wtx.node_key().unwrap(), a);
    assert!(wtx.move_to_right_sibling().unwrap());
    assert_eq!(wtx.node_key().unwrap(), b);
    assert!(wtx.move_to_right_sibling().unwrap());
    assert_eq!(wtx.node_key().unwrap(), t);
    assert_eq!(wtx.value().unwrap().as_deref(), Some("xy"));
    assert!(!wtx.move_to_right_sibling().unwrap());

    wtx.commit().unwrap();
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_insert_preconditions() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);

    // Text directly under the document root is rejected.
    let err = wtx.insert_text_as_first_child("boom").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    // Empty text is rejected.
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let err = wtx.insert_text_as_first_child("").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    // A second element child of the document root is rejected.
    let err = wtx.insert_element_as_right_sibling(&qn("r2")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    // Invalid QNames are rejected.
    let err = wtx
        .insert_element_as_first_child(&qn("not a name"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    // Comment and PI content constraints.
    let err = wtx.insert_comment_as_first_child("a -- b").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    let err = wtx.insert_comment_as_first_child("ends-").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    let err = wtx.insert_pi_as_first_child("t", "bad ?>- seq").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    let err = wtx.insert_pi_as_first_child("1bad", "ok").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[test]
fn test_remove_simple_node() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    let (r, a, b, t) = build_example(&wtx);

    wtx.move_to(b).unwrap();
    wtx.remove().unwrap();
    // Cursor lands on the former right sibling.
    assert_eq!(wtx.node_key().unwrap(), t);

    wtx.move_to(r).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 2);
    assert_eq!(wtx.descendant_count().unwrap(), 2);
    assert!(wtx.move_to_first_child().unwrap());
    assert_eq!(wtx.node_key().unwrap(), a);
    assert!(wtx.move_to_right_sibling().unwrap());
    assert_eq!(wtx.value().unwrap().as_deref(), Some("xy"));
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_remove_merges_adjacent_text() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.insert_text_as_first_child("t1").unwrap();
    let t1 = wtx.node_key().unwrap();
    wtx.insert_element_as_right_sibling(&qn("mid")).unwrap();
    let mid = wtx.node_key().unwrap();
    wtx.insert_text_as_right_sibling("t2").unwrap();
    let t2 = wtx.node_key().unwrap();
    assert_ne!(t1, t2, "element between the texts prevents merging");

    wtx.move_to(mid).unwrap();
    wtx.remove().unwrap();

    wtx.move_to(r).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 1, "texts merged into one node");
    assert_eq!(wtx.descendant_count().unwrap(), 1);
    assert!(wtx.move_to_first_child().unwrap());
    assert_eq!(wtx.node_key().unwrap(), t1, "left text survives the merge");
    assert_eq!(wtx.value().unwrap().as_deref(), Some("t1t2"));
    assert!(!wtx.move_to_right_sibling().unwrap());
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_remove_document_root_rejected() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);
    let err = wtx.remove().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[test]
fn test_move_to_right_sibling_of_text() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    let (r, a, b, t) = build_example(&wtx);

    wtx.move_to(t).unwrap();
    wtx.move_subtree_to_right_sibling(a).unwrap();
    assert_eq!(wtx.node_key().unwrap(), a, "cursor follows the moved node");

    // Expected shape: <r><b/>xy<a/></r>.
    wtx.move_to(r).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 3);
    assert_eq!(wtx.descendant_count().unwrap(), 3);
    assert!(wtx.move_to_first_child().unwrap());
    assert_eq!(wtx.node_key().unwrap(), b);
    assert!(wtx.move_to_right_sibling().unwrap());
    assert_eq!(wtx.node_key().unwrap(), t);
    assert!(wtx.move_to_right_sibling().unwrap());
    assert_eq!(wtx.node_key().unwrap(), a);
    assert!(!wtx.move_to_right_sibling().unwrap());
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_move_self_and_into_own_subtree_rejected() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    wtx.insert_element_as_first_child(&qn("a")).unwrap();
    let a = wtx.node_key().unwrap();
    wtx.insert_element_as_first_child(&qn("c")).unwrap();
    let c = wtx.node_key().unwrap();

    wtx.move_to(a).unwrap();
    let err = wtx.move_subtree_to_first_child(a).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Argument, "self move is an argument error");

    wtx.move_to(c).unwrap();
    let err = wtx.move_subtree_to_first_child(a).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage, "move into own subtree");

    let err = wtx.move_subtree_to_first_child(NodeKey::new(9999)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Argument, "out-of-range source key");
}

#[test]
fn test_move_to_first_child_keeps_subtree() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.insert_element_as_first_child(&qn("target")).unwrap();
    let target = wtx.node_key().unwrap();
    wtx.move_to(r).unwrap();
    wtx.insert_element_as_first_child(&qn("src")).unwrap();
    let src = wtx.node_key().unwrap();
    wtx.insert_text_as_first_child("inner").unwrap();

    wtx.move_to(target).unwrap();
    wtx.move_subtree_to_first_child(src).unwrap();

    wtx.move_to(target).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 1);
    assert_eq!(wtx.descendant_count().unwrap(), 2, "src plus its text");
    assert!(wtx.move_to_first_child().unwrap());
    assert_eq!(wtx.node_key().unwrap(), src);
    assert!(wtx.move_to_first_child().unwrap());
    assert_eq!(wtx.value().unwrap().as_deref(), Some("inner"));

    wtx.move_to(r).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 1);
    assert_eq!(wtx.descendant_count().unwrap(), 3);
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_attribute_overwrite_and_namespace_duplicate() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();

    wtx.insert_attribute(&qn("x"), "1").unwrap();
    let att = wtx.node_key().unwrap();
    assert_eq!(wtx.kind().unwrap(), NodeKind::Attribute);

    wtx.move_to(r).unwrap();
    wtx.insert_attribute(&qn("x"), "2").unwrap();
    assert_eq!(
        wtx.node_key().unwrap(),
        att,
        "same-named attribute is overwritten, not duplicated"
    );
    assert_eq!(wtx.value().unwrap().as_deref(), Some("2"));

    wtx.move_to(r).unwrap();
    assert_eq!(wtx.attribute_count().unwrap(), 1);

    // Overwriting with the same value keeps a single attribute too.
    wtx.insert_attribute(&qn("x"), "2").unwrap();
    wtx.move_to(r).unwrap();
    assert_eq!(wtx.attribute_count().unwrap(), 1);

    wtx.insert_namespace(&QName::new("http://example.org", "ns", "ns"))
        .unwrap();
    wtx.move_to(r).unwrap();
    let err = wtx
        .insert_namespace(&QName::new("http://example.org/2", "ns", "ns"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage, "duplicate namespace prefix");
    assert_eq!(wtx.namespace_count().unwrap(), 1);
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_attribute_insert_on_non_element_rejected() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    wtx.insert_text_as_first_child("t").unwrap();
    let err = wtx.insert_attribute(&qn("x"), "1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[test]
fn test_set_name_and_set_value() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("old")).unwrap();
    let e = wtx.node_key().unwrap();
    wtx.insert_text_as_first_child("v").unwrap();
    let t = wtx.node_key().unwrap();

    wtx.move_to(e).unwrap();
    wtx.set_name(&qn("new")).unwrap();
    assert_eq!(wtx.name().unwrap().unwrap().local_name(), "new");

    wtx.move_to(t).unwrap();
    wtx.set_value("w").unwrap();
    assert_eq!(wtx.value().unwrap().as_deref(), Some("w"));
    wtx.verify_integrity().unwrap();

    // Empty value removes the node.
    wtx.set_value("").unwrap();
    wtx.move_to(e).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 0);
    assert!(!wtx.move_to_first_child().unwrap());
    wtx.verify_integrity().unwrap();

    // set_name on a value-only node is rejected.
    wtx.insert_text_as_first_child("x").unwrap();
    let err = wtx.set_name(&qn("nope")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[test]
fn test_dewey_ids_follow_document_order() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    let (r, a, b, t) = build_example(&wtx);

    let mut ids = Vec::new();
    for key in [r, a, b, t] {
        wtx.move_to(key).unwrap();
        ids.push(wtx.dewey_id().unwrap().expect("order keys are stored"));
    }
    assert!(ids[0] < ids[1], "r before a");
    assert!(ids[1] < ids[2], "a before b");
    assert!(ids[2] < ids[3], "b before text");
    assert_eq!(ids[1].level(), ids[0].level() + 1);

    // A move reassigns the subtree's order keys consistently.
    wtx.move_to(t).unwrap();
    wtx.move_subtree_to_right_sibling(a).unwrap();
    wtx.verify_integrity().unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Random insert/remove scripts keep every invariant intact.
    #[test]
    fn prop_random_edits_preserve_invariants(
        script in proptest::collection::vec((0u8..5, 0usize..8, 0usize..3), 1..24),
        removals in proptest::collection::vec(0usize..8, 0..4),
    ) {
        let res = resource(HashMode::Rolling);
        let wtx = write_tx(&res);
        wtx.insert_element_as_first_child(&qn("root")).unwrap();
        let mut elements = vec![wtx.node_key().unwrap()];
        let values = ["alpha", "bet", "c"];

        for (op, anchor, value) in script {
            let anchor = elements[anchor % elements.len()];
            if !wtx.move_to(anchor).unwrap() {
                continue; // removed by an earlier subtree removal
            }
            let result = match op {
                0 => wtx.insert_element_as_first_child(&qn("e")).map(|_| ()),
                1 => wtx.insert_element_as_right_sibling(&qn("s")).map(|_| ()),
                2 => wtx.insert_text_as_first_child(values[value]).map(|_| ()),
                3 => wtx.insert_comment_as_first_child(values[value]).map(|_| ()),
                _ => wtx.insert_attribute(&qn("k"), values[value]).map(|_| ()),
            };
            if result.is_ok() && matches!(op, 0 | 1) {
                elements.push(wtx.node_key().unwrap());
            }
            // Sibling inserts beside the root element are usage errors.
            if let Err(e) = result {
                prop_assert_eq!(e.kind(), ErrorKind::Usage);
            }
            let check = wtx.verify_integrity();
            prop_assert!(check.is_ok(), "invariants broken after insert: {:?}", check.err());
        }

        for pick in removals {
            let key = elements[pick % elements.len()];
            if key == elements[0] || !wtx.move_to(key).unwrap() {
                continue;
            }
            wtx.remove().unwrap();
            let check = wtx.verify_integrity();
            prop_assert!(check.is_ok(), "invariants broken after remove: {:?}", check.err());
        }
    }
}
