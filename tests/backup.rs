use std::cell::RefCell;
use std::rc::Rc;

use relayq::{
    Content, FlagWord, KeyType, LogStore, MemoryLogStore, Queue, QueueConfig, META_FIRST_ROWID,
};
use serde_json::json;

fn open_queue(
    store: &Rc<RefCell<MemoryLogStore>>,
    backup_queue_size: u64,
) -> Queue<MemoryLogStore> {
    Queue::open(
        store.clone(),
        "client4/out",
        "tm",
        KeyType::RowId,
        QueueConfig {
            max_inflight_messages: 0,
            backup_queue_size,
        },
    )
    .expect("open queue")
}

fn content(msg_id: u32) -> Content {
    Content::from_value(json!({ "msg_id": msg_id })).expect("content")
}

#[test]
fn rotation_triggers_at_the_threshold() {
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 3);

    for i in 1..=2 {
        let rowid = queue.append(0, content(i), FlagWord::new()).expect("append");
        queue.unload(rowid, 0).expect("unload");
        assert!(!queue.check_backup().expect("check"));
    }

    let rowid = queue.append(0, content(3), FlagWord::new()).expect("append");
    queue.unload(rowid, 0).expect("unload");
    assert!(queue.check_backup().expect("check"));

    assert_eq!(store.borrow().topic_size(queue.topic()).expect("size"), 0);
    assert_eq!(
        store
            .borrow()
            .archived_generations(queue.topic())
            .expect("archive"),
        1
    );
    assert_eq!(queue.first_rowid(), 0);
    assert_eq!(
        store
            .borrow()
            .read_metadata(queue.topic(), META_FIRST_ROWID)
            .expect("read"),
        Some(0)
    );
}

#[test]
fn disabled_threshold_never_rotates() {
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 0);
    for i in 1..=50 {
        queue.append(0, content(i), FlagWord::new()).expect("append");
    }
    assert!(!queue.check_backup().expect("check"));
    assert_eq!(store.borrow().topic_size(queue.topic()).expect("size"), 50);
}

#[test]
fn rotation_does_not_resurrect_old_rows() {
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 4);

    // Leave everything pending, then rotate.
    for i in 1..=4 {
        queue.append(0, content(i), FlagWord::new()).expect("append");
    }
    assert!(queue.check_backup().expect("check"));
    queue.close();

    // A fresh resume sees a clean topic: no pre-rotation row comes back.
    let mut reopened = open_queue(&store, 4);
    assert_eq!(reopened.load().expect("load"), 0);
    assert_eq!(reopened.first_rowid(), 0);
    assert_eq!(reopened.inflight_len() + reopened.queued_len(), 0);
}

#[test]
fn appends_after_rotation_resume_normally() {
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 2);
    for i in 1..=2 {
        let rowid = queue.append(0, content(i), FlagWord::new()).expect("append");
        queue.unload(rowid, 0).expect("unload");
    }
    assert!(queue.check_backup().expect("check"));

    // Fresh generation: row ids restart at 0.
    let first = queue.append(0, content(10), FlagWord::new()).expect("append");
    let second = queue.append(0, content(11), FlagWord::new()).expect("append");
    assert_eq!((first, second), (0, 1));
    queue.close();

    let mut reopened = open_queue(&store, 2);
    assert_eq!(reopened.load().expect("load"), 2);
    let mut rowids = reopened.inflight_rowids();
    rowids.extend(reopened.queued_rowids());
    rowids.sort_unstable();
    assert_eq!(rowids, vec![0, 1]);
}

#[test]
fn stale_checkpoint_is_ignored_after_external_rotation() {
    // Metadata left over from before a rotation must not hide new pending
    // rows whose ids fall below the old checkpoint.
    let store = Rc::new(RefCell::new(MemoryLogStore::new()));
    let mut queue = open_queue(&store, 0);
    for i in 1..=5 {
        queue.append(0, content(i), FlagWord::new()).expect("append");
    }
    queue.close();

    // Simulate a checkpoint pointing past the current row range.
    {
        let mut borrowed = store.borrow_mut();
        let topic = borrowed
            .create_topic("client4/out", "tm", KeyType::RowId)
            .expect("topic");
        borrowed
            .write_metadata(topic, META_FIRST_ROWID, 100)
            .expect("write");
    }

    let mut reopened = open_queue(&store, 0);
    assert_eq!(reopened.load().expect("load"), 5);
    assert_eq!(reopened.first_rowid(), 0);
}
