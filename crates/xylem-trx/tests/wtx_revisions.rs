//! Transaction lifecycle: commit, rollback, revert, auto-commit, hooks,
//! close, and the read-side view of committed revisions.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{resource, write_tx, write_tx_with};
use parking_lot::Mutex;
use xylem_error::{ErrorKind, XylemError};
use xylem_page::ResourceManager;
use xylem_trx::{
    ChangeType, NodeReadTx, NodeWriteTx, RecordingIndexController, WriteTxOptions,
};
use xylem_types::{HashMode, NodeKind, QName, Revision};

fn qn(local: &str) -> QName {
    QName::local(local)
}

fn read_tx(res: &Arc<xylem_page::MemResourceManager>, revision: Option<Revision>) -> NodeReadTx {
    let manager: Arc<dyn ResourceManager> = Arc::clone(res) as Arc<dyn ResourceManager>;
    NodeReadTx::begin(manager, revision).unwrap()
}

#[test]
fn test_commit_then_reopen_yields_identical_tree() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    wtx.insert_attribute(&qn("x"), "1").unwrap();
    wtx.move_to_parent().unwrap();
    wtx.insert_element_as_first_child(&qn("a")).unwrap();
    wtx.insert_text_as_right_sibling("txt").unwrap();
    wtx.commit_with_message("snapshot").unwrap();

    let mut rtx = read_tx(&res, None);
    assert_eq!(rtx.revision(), Revision::new(1));
    assert_eq!(rtx.commit_credentials().message, "snapshot");

    assert!(rtx.move_to_first_child());
    assert_eq!(rtx.kind().unwrap(), NodeKind::Element);
    assert_eq!(rtx.name().unwrap().unwrap().local_name(), "r");
    assert_eq!(rtx.child_count().unwrap(), 2);
    assert_eq!(rtx.descendant_count().unwrap(), 2);
    assert_eq!(rtx.attribute_count().unwrap(), 1);
    assert!(rtx.move_to_attribute(0));
    assert_eq!(rtx.value().unwrap().as_deref(), Some("1"));
    assert!(rtx.move_to_parent());
    assert!(rtx.move_to_first_child());
    assert_eq!(rtx.name().unwrap().unwrap().local_name(), "a");
    assert!(rtx.move_to_right_sibling());
    assert_eq!(rtx.value().unwrap().as_deref(), Some("txt"));
    assert!(!rtx.move_to_right_sibling());
}

#[test]
fn test_rollback_restores_last_committed_revision() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.commit().unwrap();

    wtx.move_to(r).unwrap();
    wtx.insert_element_as_first_child(&qn("gone")).unwrap();
    assert_eq!(wtx.modification_count().unwrap(), 1);

    wtx.rollback().unwrap();
    assert_eq!(wtx.modification_count().unwrap(), 0);
    assert_eq!(wtx.revision().unwrap(), Revision::new(1));

    wtx.move_to(r).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 0, "uncommitted child is gone");
    wtx.verify_integrity().unwrap();

    // The transaction stays usable after rollback.
    wtx.insert_element_as_first_child(&qn("kept")).unwrap();
    wtx.commit().unwrap();
    let mut rtx = read_tx(&res, None);
    assert!(rtx.move_to_first_child());
    assert!(rtx.move_to_first_child());
    assert_eq!(rtx.name().unwrap().unwrap().local_name(), "kept");
}

#[test]
fn test_revert_to_previous_revision() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.commit().unwrap(); // revision 1
    wtx.move_to(r).unwrap();
    wtx.insert_element_as_first_child(&qn("extra")).unwrap();
    wtx.commit().unwrap(); // revision 2

    // Uncommitted work plus the revert target's state are both handled.
    wtx.move_to(r).unwrap();
    wtx.insert_element_as_first_child(&qn("pending")).unwrap();
    wtx.revert_to(Revision::new(1)).unwrap();
    assert_eq!(wtx.modification_count().unwrap(), 0);
    assert_eq!(
        wtx.node_key().unwrap(),
        xylem_types::NodeKey::DOCUMENT_ROOT,
        "revert moves the cursor to the document root"
    );
    wtx.move_to(r).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 0, "revision 1 had no children");

    // Committing the reverted state appends a new revision.
    wtx.commit().unwrap();
    assert_eq!(wtx.revision().unwrap(), Revision::new(3));
    let mut rtx = read_tx(&res, Some(Revision::new(3)));
    assert!(rtx.move_to_first_child());
    assert_eq!(rtx.child_count().unwrap(), 0, "revision 3 mirrors revision 1");

    // The skipped revision is still readable.
    let mut rtx = read_tx(&res, Some(Revision::new(2)));
    assert!(rtx.move_to_first_child());
    assert_eq!(rtx.child_count().unwrap(), 1);

    let err = wtx.revert_to(Revision::new(9)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn test_close_refuses_uncommitted_modifications() {
    let res = resource(HashMode::None);
    let mut wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();

    let err = wtx.close().unwrap_err();
    assert!(matches!(
        err,
        XylemError::UncommittedModifications { count: 1 }
    ));

    wtx.commit().unwrap();
    wtx.close().unwrap();

    // Every operation on a closed transaction fails with a state error.
    let err = wtx.insert_element_as_first_child(&qn("x")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    // The writer slot is free again.
    let wtx2 = write_tx(&res);
    drop(wtx2);
}

#[test]
fn test_single_writer_per_resource() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);
    let manager: Arc<dyn ResourceManager> = Arc::clone(&res) as Arc<dyn ResourceManager>;
    let err = NodeWriteTx::begin(manager, WriteTxOptions::default()).unwrap_err();
    assert!(matches!(err, XylemError::WriterAlreadyActive));
    drop(wtx);
    // Dropping the writer releases the slot.
    let _wtx2 = write_tx(&res);
}

#[test]
fn test_size_triggered_intermediate_commit() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx_with(
        &res,
        WriteTxOptions {
            max_node_count: 2,
            ..WriteTxOptions::default()
        },
    );
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    wtx.insert_element_as_first_child(&qn("a")).unwrap();
    assert_eq!(wtx.revision().unwrap(), Revision::BOOTSTRAP);
    // The third modification crosses the threshold and commits inline.
    wtx.insert_element_as_first_child(&qn("b")).unwrap();
    assert_eq!(wtx.revision().unwrap(), Revision::new(1));
    assert!(wtx.modification_count().unwrap() <= 1);
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_time_triggered_auto_commit() {
    let res = resource(HashMode::Rolling);
    let mut wtx = write_tx_with(
        &res,
        WriteTxOptions {
            auto_commit_interval: Some(Duration::from_millis(25)),
            ..WriteTxOptions::default()
        },
    );
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    std::thread::sleep(Duration::from_millis(600));
    assert!(
        wtx.revision().unwrap() >= Revision::new(1),
        "the scheduler committed the pending edit"
    );
    assert_eq!(wtx.modification_count().unwrap(), 0);
    wtx.close().unwrap();
}

#[test]
fn test_commit_hooks_order_and_abort() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&order);
    wtx.add_pre_commit_hook(Box::new(move |_| {
        log.lock().push("pre-1");
        Ok(())
    }))
    .unwrap();
    let log = Arc::clone(&order);
    wtx.add_pre_commit_hook(Box::new(move |_| {
        log.lock().push("pre-2");
        Ok(())
    }))
    .unwrap();
    let log = Arc::clone(&order);
    wtx.add_post_commit_hook(Box::new(move |info| {
        assert_eq!(info.revision, Revision::new(1));
        log.lock().push("post");
        Ok(())
    }))
    .unwrap();

    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    wtx.commit().unwrap();
    assert_eq!(order.lock().as_slice(), ["pre-1", "pre-2", "post"]);

    // A failing pre-commit hook aborts the commit.
    wtx.add_pre_commit_hook(Box::new(|_| {
        Err(XylemError::StoreCorrupt {
            detail: "hook veto".to_owned(),
        })
    }))
    .unwrap();
    wtx.insert_element_as_first_child(&qn("a")).unwrap();
    assert!(wtx.commit().is_err());
    assert_eq!(res.last_committed().revision, Revision::new(1));
    assert!(
        wtx.modification_count().unwrap() > 0,
        "aborted commit keeps the pending modifications"
    );
}

#[test]
fn test_index_notifications() {
    let res = resource(HashMode::Rolling);
    let controller = RecordingIndexController::new();
    let log = controller.log();
    let wtx = write_tx_with(
        &res,
        WriteTxOptions {
            index_controller: Some(Box::new(controller)),
            ..WriteTxOptions::default()
        },
    );

    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.insert_attribute(&qn("x"), "1").unwrap();
    wtx.move_to(r).unwrap();
    wtx.insert_text_as_first_child("t1").unwrap();
    {
        let events = log.lock();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|e| e.change == ChangeType::Insert));
        assert_eq!(events[0].kind, NodeKind::Element);
        assert_eq!(events[1].kind, NodeKind::Attribute);
        assert_eq!(events[2].kind, NodeKind::Text);
        assert_ne!(events[0].path_node_key, 0, "elements link the path summary");
        assert_ne!(events[1].path_node_key, 0);
        assert_eq!(
            events[2].path_node_key, events[0].path_node_key,
            "text files under its parent element's path"
        );
    }

    // A text merge updates in place: no INSERT/DELETE pair.
    wtx.insert_text_as_left_sibling("t0").unwrap();
    assert_eq!(log.lock().len(), 3, "merge emits no index notifications");

    // Removing the subtree emits one DELETE per node.
    wtx.move_to(r).unwrap();
    wtx.remove().unwrap();
    let events = log.lock();
    let deletes: Vec<_> = events
        .iter()
        .filter(|e| e.change == ChangeType::Delete)
        .collect();
    assert_eq!(deletes.len(), 3, "text, attribute and element deletions");
}

#[test]
fn test_path_summary_tracks_renames() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    wtx.insert_element_as_first_child(&qn("a")).unwrap();

    let r_path = [(qn("r"), NodeKind::Element)];
    let ra_path = [(qn("r"), NodeKind::Element), (qn("a"), NodeKind::Element)];
    assert!(wtx.path_summary_contains(&r_path).unwrap());
    assert!(wtx.path_summary_contains(&ra_path).unwrap());

    wtx.set_name(&qn("b")).unwrap();
    let rb_path = [(qn("r"), NodeKind::Element), (qn("b"), NodeKind::Element)];
    assert!(!wtx.path_summary_contains(&ra_path).unwrap());
    assert!(wtx.path_summary_contains(&rb_path).unwrap());

    // The summary survives commit (it is rebuilt from the records).
    wtx.commit().unwrap();
    assert!(wtx.path_summary_contains(&rb_path).unwrap());
}

#[test]
fn test_copy_subtree_from_committed_revision() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.insert_element_as_first_child(&qn("src")).unwrap();
    let src = wtx.node_key().unwrap();
    wtx.insert_attribute(&qn("k"), "v").unwrap();
    wtx.move_to_parent().unwrap();
    wtx.insert_text_as_first_child("body").unwrap();
    wtx.commit().unwrap();

    let mut rtx = read_tx(&res, None);
    assert!(rtx.move_to(src));

    wtx.move_to(r).unwrap();
    wtx.copy_subtree_as_first_child(&rtx).unwrap();
    let copy = wtx.node_key().unwrap();
    assert_ne!(copy, src, "copy allocates fresh keys");
    assert_eq!(wtx.name().unwrap().unwrap().local_name(), "src");
    assert_eq!(wtx.attribute_count().unwrap(), 1);
    assert!(wtx.move_to_first_child().unwrap());
    assert_eq!(wtx.value().unwrap().as_deref(), Some("body"));

    wtx.move_to(r).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 2);
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_replace_node_with_subtree() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.insert_element_as_first_child(&qn("keep")).unwrap();
    wtx.insert_element_as_right_sibling(&qn("victim")).unwrap();
    let victim = wtx.node_key().unwrap();

    let events = vec![
        xylem_trx::TreeEvent::element("z"),
        xylem_trx::TreeEvent::Text("inner".to_owned()),
        xylem_trx::TreeEvent::EndElement,
    ];
    wtx.move_to(victim).unwrap();
    wtx.replace_node_with_events(events).unwrap();
    assert_eq!(wtx.name().unwrap().unwrap().local_name(), "z");

    wtx.move_to(r).unwrap();
    assert_eq!(wtx.child_count().unwrap(), 2);
    assert!(wtx.move_to_first_child().unwrap());
    assert_eq!(wtx.name().unwrap().unwrap().local_name(), "keep");
    assert!(wtx.move_to_right_sibling().unwrap());
    assert_eq!(wtx.name().unwrap().unwrap().local_name(), "z");
    assert_eq!(wtx.descendant_count().unwrap(), 1);
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_replace_attribute_from_read_tx() {
    let res = resource(HashMode::Rolling);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    let r = wtx.node_key().unwrap();
    wtx.insert_attribute(&qn("old"), "1").unwrap();
    wtx.commit().unwrap();

    // Source: a different attribute in the committed revision.
    wtx.move_to(r).unwrap();
    wtx.insert_attribute(&qn("fresh"), "2").unwrap();
    wtx.commit().unwrap();

    let mut rtx = read_tx(&res, None);
    assert!(rtx.move_to_first_child());
    assert!(rtx.move_to_attribute(1));
    assert_eq!(rtx.name().unwrap().unwrap().local_name(), "fresh");

    wtx.move_to(r).unwrap();
    assert!(wtx.move_to_attribute(0).unwrap());
    wtx.replace_node(&rtx).unwrap();

    wtx.move_to(r).unwrap();
    assert_eq!(wtx.attribute_count().unwrap(), 1, "fresh replaced old, then deduplicated");
    wtx.verify_integrity().unwrap();
}

#[test]
fn test_truncate_to_is_unimplemented() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);
    let err = wtx.truncate_to(Revision::BOOTSTRAP).unwrap_err();
    assert!(matches!(err, XylemError::NotImplemented(_)));
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[test]
fn test_commit_credentials_follow_revisions() {
    let res = resource(HashMode::None);
    let wtx = write_tx(&res);
    wtx.insert_element_as_first_child(&qn("r")).unwrap();
    wtx.commit_with_message("first words").unwrap();
    let creds = wtx.commit_credentials().unwrap();
    assert_eq!(creds.author, "anonymous");
    assert_eq!(creds.message, "first words");
}
