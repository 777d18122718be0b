use std::cell::RefCell;
use std::rc::Rc;

use relayq::{
    Content, Error, FlagWord, KeyType, MemoryLogStore, Membership, Queue, QueueConfig,
};
use serde_json::json;

fn open_queue(
    store: &Rc<RefCell<MemoryLogStore>>,
    max_inflight: usize,
) -> Queue<MemoryLogStore> {
    Queue::open(
        store.clone(),
        "client1/out",
        "tm",
        KeyType::RowId,
        QueueConfig {
            max_inflight_messages: max_inflight,
            backup_queue_size: 0,
        },
    )
    .expect("open queue")
}

fn content(msg_id: u32) -> Content {
    Content::from_value(json!({ "msg_id": msg_id, "topic_name": "a/b" })).expect("content")
}

#[test]
fn inflight_never_exceeds_the_bound() {
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 3);

    for i in 1..=20 {
        queue.append(0, content(i), FlagWord::new()).expect("append");
        assert!(queue.inflight_len() <= 3);
    }
    assert_eq!(queue.inflight_len(), 3);
    assert_eq!(queue.queued_len(), 17);

    for msg in queue.iter_inflight() {
        assert!(msg.content().is_some());
        assert_eq!(msg.membership(), Membership::Inflight);
    }
    for msg in queue.iter_queued() {
        assert!(msg.content().is_none());
        assert_eq!(msg.membership(), Membership::Queued);
    }
}

#[test]
fn move_loads_content_and_leaves_queued() {
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 1);
    queue.append(0, content(1), FlagWord::new()).expect("append");
    let overflow = queue.append(0, content(2), FlagWord::new()).expect("append");
    assert_eq!(queue.queued_rowids(), vec![overflow]);

    queue.move_queued_to_inflight(overflow).expect("move");

    assert_eq!(queue.queued_len(), 0);
    let msg = queue.get_by_rowid(overflow).expect("handle");
    assert_eq!(msg.membership(), Membership::Inflight);
    assert!(msg.content().is_some());
    assert_eq!(msg.msg_id(), 2);
}

#[test]
fn move_of_unknown_rowid_fails_without_mutation() {
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 1);
    queue.append(0, content(1), FlagWord::new()).expect("append");

    assert!(matches!(
        queue.move_queued_to_inflight(99),
        Err(Error::NotFound(99))
    ));
    // Moving an inflight rowid is also a queued-list miss.
    assert!(matches!(
        queue.move_queued_to_inflight(0),
        Err(Error::NotFound(0))
    ));
    assert_eq!(queue.inflight_len(), 1);
}

#[test]
fn unload_is_not_repeatable() {
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 0);
    let rowid = queue.append(0, content(1), FlagWord::new()).expect("append");

    queue.unload(rowid, 0).expect("first unload");
    assert!(matches!(queue.unload(rowid, 0), Err(Error::NotFound(_))));
    assert_eq!(queue.inflight_len(), 0);
}

#[test]
fn get_content_lazily_loads_queued_messages() {
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 1);
    queue.append(0, content(1), FlagWord::new()).expect("append");
    let overflow = queue
        .append(0, content(7).with_payload(b"payload bytes".to_vec()), FlagWord::new())
        .expect("append");

    assert!(queue.get_by_rowid(overflow).expect("handle").content().is_none());

    let loaded = queue.get_content(overflow).expect("content");
    assert_eq!(loaded.msg_id(), 7);
    assert_eq!(loaded.payload(), Some(&b"payload bytes"[..]));

    // Cached: the handle now reports loaded content and a real msg id.
    let msg = queue.get_by_rowid(overflow).expect("handle");
    assert!(msg.content().is_some());
    assert_eq!(msg.msg_id(), 7);
}

#[test]
fn snapshot_iteration_tolerates_removal() {
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 0);
    for i in 1..=5 {
        queue.append(0, content(i), FlagWord::new()).expect("append");
    }

    for rowid in queue.inflight_rowids() {
        queue.unload(rowid, 0).expect("unload during traversal");
    }
    assert_eq!(queue.inflight_len(), 0);
}

#[test]
fn open_close_reopen_scenario() {
    // Open with max_inflight 2; append A, B, C. Expect inflight [A, B],
    // queued [C]. Unload A, move C inflight. Close, reopen, load: the
    // resumed set is {B, C}.
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 2);

    let a = queue.append(0, content(1), FlagWord::new()).expect("append A");
    let b = queue.append(0, content(2), FlagWord::new()).expect("append B");
    let c = queue.append(0, content(3), FlagWord::new()).expect("append C");
    assert_eq!(queue.inflight_rowids(), vec![a, b]);
    assert_eq!(queue.queued_rowids(), vec![c]);

    queue.unload(a, 0).expect("unload A");
    queue.move_queued_to_inflight(c).expect("move C");
    assert_eq!(queue.inflight_rowids(), vec![b, c]);
    assert_eq!(queue.queued_len(), 0);

    queue.close();

    let mut reopened = open_queue(&store, 2);
    let resumed = reopened.load().expect("load");
    assert_eq!(resumed, 2);

    let mut rowids = reopened.inflight_rowids();
    rowids.extend(reopened.queued_rowids());
    rowids.sort_unstable();
    assert_eq!(rowids, vec![b, c]);
    assert!(reopened.get_by_rowid(a).is_none());
}
