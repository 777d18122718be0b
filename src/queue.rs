//! Queue instance: bounded in-memory admission over a persisted log topic.
//!
//! One queue per client/direction pair. The queue owns two ordered lists of
//! message handles: *inflight* (content loaded, bounded by
//! `max_inflight_messages`) and *queued* (overflow, content left on disk).
//! Both lists preserve row-id order; new handles always land at the tail.
//!
//! Durability is delegated to the [`LogStore`] collaborator. The engine's
//! own durable state is the pending bit on every record plus two pieces of
//! topic metadata: the `first_rowid` resume checkpoint and the backup
//! threshold. Only the store's master role may persist metadata.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use relayq::{Content, FlagWord, KeyType, MemoryLogStore, Queue, QueueConfig};
//! use serde_json::json;
//!
//! let store = Rc::new(RefCell::new(MemoryLogStore::new()));
//! let mut queue = Queue::open(
//!     store,
//!     "client1/outbound",
//!     "tm",
//!     KeyType::RowId,
//!     QueueConfig::default(),
//! )?;
//!
//! let content = Content::from_value(json!({ "msg_id": 1 }))?.with_payload(b"hi".to_vec());
//! let rowid = queue.append(0, content, FlagWord::new())?;
//! queue.unload(rowid, 0)?;
//! # Ok::<(), relayq::Error>(())
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::{debug, error, warn};

use crate::content::Content;
use crate::flags::{FlagWord, PENDING_MASK};
use crate::record::{Membership, QueueMessage};
use crate::store::{
    KeyType, LogStore, RecordMeta, ScanControl, ScanPredicate, TopicId, META_BACKUP_QUEUE_SIZE,
    META_FIRST_ROWID,
};
use crate::{Error, Result};

/// Per-queue admission and rotation limits.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueConfig {
    /// Upper bound on the inflight list. 0 = unbounded.
    pub max_inflight_messages: usize,
    /// Topic row count that triggers backup/rotation. 0 = disabled.
    pub backup_queue_size: u64,
}

/// Persistent, bounded, resumable delivery queue over one log topic.
pub struct Queue<S: LogStore> {
    store: Rc<RefCell<S>>,
    topic: TopicId,
    name: String,
    inflight: VecDeque<QueueMessage>,
    queued: VecDeque<QueueMessage>,
    max_inflight: usize,
    backup_queue_size: u64,
    first_rowid: u64,
}

impl<S: LogStore> Queue<S> {
    /// Open a queue over the named topic, creating the topic if needed.
    ///
    /// Queues are strictly append/row-id ordered: the caller's `key_type` is
    /// ignored and the topic is created row-id keyed. When
    /// `backup_queue_size > 0` and this process is the store's master, the
    /// threshold is persisted as topic metadata.
    ///
    /// # Errors
    ///
    /// Propagates the store's topic-creation failure (already reported by
    /// the store, not logged again here).
    pub fn open(
        store: Rc<RefCell<S>>,
        name: &str,
        time_key: &str,
        key_type: KeyType,
        config: QueueConfig,
    ) -> Result<Self> {
        if key_type != KeyType::RowId {
            debug!("queue {name}: topics are row-id keyed, ignoring requested key type");
        }
        let topic = store
            .borrow_mut()
            .create_topic(name, time_key, KeyType::RowId)?;

        if config.backup_queue_size > 0 {
            let mut s = store.borrow_mut();
            if s.is_master() {
                s.write_metadata(topic, META_BACKUP_QUEUE_SIZE, config.backup_queue_size)?;
            }
        }

        Ok(Self {
            store,
            topic,
            name: name.to_string(),
            inflight: VecDeque::new(),
            queued: VecDeque::new(),
            max_inflight: config.max_inflight_messages,
            backup_queue_size: config.backup_queue_size,
            first_rowid: 0,
        })
    }

    /// Flush both lists, releasing any loaded content. In-memory only:
    /// persisted state is whatever the last hard-flag writes and checkpoint
    /// left behind.
    pub fn close(mut self) {
        self.inflight.clear();
        self.queued.clear();
    }

    /// Append one message with the pending bit set on top of `extra_flags`.
    ///
    /// Admits the new handle to inflight when under the bound, otherwise to
    /// queued with the content released (it can be reloaded from the store).
    /// Returns the store-assigned row id.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidContent` / `Error::Encode`: content rejected before
    ///   any store mutation.
    /// - store append failures, propagated.
    pub fn append(
        &mut self,
        time_or_zero: u64,
        content: Content,
        extra_flags: FlagWord,
    ) -> Result<u64> {
        let encoded = content.encode()?;
        let mut flags = extra_flags;
        flags.set_pending(true);

        let expected = self.store.borrow().topic_size(self.topic)?;
        let record =
            self.store
                .borrow_mut()
                .append_record(self.topic, time_or_zero, flags, &encoded)?;
        if record.rowid != expected {
            // The persisted record is authoritative; this is a diagnostic
            // signal, not a correctness-blocking condition at this layer.
            error!(
                "queue {}: store reported rowid {} for append, expected tail {}",
                self.name, record.rowid, expected
            );
        }

        let meta = RecordMeta {
            rowid: record.rowid,
            time: record.time,
            flags,
        };
        self.admit(meta, Some(content))?;
        Ok(record.rowid)
    }

    /// Resume: replay still-pending records into the in-memory lists.
    ///
    /// The scan is narrowed by the persisted `first_rowid` checkpoint when
    /// it is still within the topic's current row range; a stale checkpoint
    /// (e.g. after a backup reset the topic) is ignored. Afterwards the new
    /// checkpoint — the oldest still-pending row id, or the topic size when
    /// nothing is pending — is persisted master-only. Returns the number of
    /// admitted handles.
    pub fn load(&mut self) -> Result<usize> {
        let size = self.store.borrow().topic_size(self.topic)?;
        let checkpoint = self
            .store
            .borrow()
            .read_metadata(self.topic, META_FIRST_ROWID)?
            .unwrap_or(0);

        let mut predicate = ScanPredicate {
            pending_mask: Some(PENDING_MASK),
            ..Default::default()
        };
        if checkpoint > 0 {
            if checkpoint < size {
                predicate.from_rowid = Some(checkpoint);
            } else {
                debug!(
                    "queue {}: checkpoint {} outside row range 0..{}, scanning from start",
                    self.name, checkpoint, size
                );
            }
        }

        let admitted = self.scan_and_admit(&predicate)?;
        self.first_rowid = match admitted.first() {
            Some(&first) => first,
            None => size,
        };
        self.persist_checkpoint(self.first_rowid)?;

        debug!(
            "queue {}: resumed {} pending messages, checkpoint {}",
            self.name,
            admitted.len(),
            self.first_rowid
        );
        Ok(admitted.len())
    }

    /// Administrative replay: admit every record from `from_rowid` onward,
    /// pending or not. No checkpoint side effects.
    pub fn load_all_from_rowid(&mut self, from_rowid: u64) -> Result<usize> {
        let predicate = ScanPredicate {
            from_rowid: Some(from_rowid),
            ..Default::default()
        };
        Ok(self.scan_and_admit(&predicate)?.len())
    }

    /// Administrative replay: admit every record in the inclusive time
    /// range, pending or not. No checkpoint side effects.
    pub fn load_all_by_time(&mut self, from_time: u64, to_time: u64) -> Result<usize> {
        let predicate = ScanPredicate {
            from_time: Some(from_time),
            to_time: Some(to_time),
            ..Default::default()
        };
        Ok(self.scan_and_admit(&predicate)?.len())
    }

    /// Move a handle from queued to inflight, loading its content.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound`: row id absent from the queued list.
    /// - content load/decode failures, with the handle left in queued.
    pub fn move_queued_to_inflight(&mut self, rowid: u64) -> Result<()> {
        let pos = self
            .queued
            .iter()
            .position(|m| m.rowid() == rowid)
            .ok_or(Error::NotFound(rowid))?;

        // Load before removal so a store failure leaves the lists untouched.
        let content = if self.queued[pos].content().is_none() {
            Some(self.load_content(rowid)?)
        } else {
            None
        };

        let Some(mut msg) = self.queued.remove(pos) else {
            return Err(Error::NotFound(rowid));
        };
        if let Some(content) = content {
            msg.set_content(content);
        }
        msg.set_membership(Membership::Inflight);
        self.inflight.push_back(msg);
        Ok(())
    }

    /// Find a handle by row id, scanning inflight then queued.
    pub fn get_by_rowid(&self, rowid: u64) -> Option<&QueueMessage> {
        self.inflight
            .iter()
            .find(|m| m.rowid() == rowid)
            .or_else(|| self.queued.iter().find(|m| m.rowid() == rowid))
    }

    /// Find a handle by protocol message id, scanning inflight then queued.
    pub fn get_by_id(&self, msg_id: u32) -> Option<&QueueMessage> {
        self.inflight
            .iter()
            .find(|m| m.msg_id() == msg_id)
            .or_else(|| self.queued.iter().find(|m| m.msg_id() == msg_id))
    }

    /// Content of a handle, loading and caching it on first access.
    ///
    /// The returned borrow stays valid until the message is unloaded.
    pub fn get_content(&mut self, rowid: u64) -> Result<&Content> {
        let (list, idx) = self.locate(rowid).ok_or(Error::NotFound(rowid))?;
        if self.message_at(list, idx).content().is_none() {
            let content = self.load_content(rowid)?;
            self.message_at_mut(list, idx).set_content(content);
        }
        match self.message_at(list, idx).content() {
            Some(content) => Ok(content),
            None => Err(Error::NotFound(rowid)),
        }
    }

    /// Acknowledge a message: clear its pending bit with a hard
    /// write-through, then drop the handle and its content.
    ///
    /// The flag write is the durability boundary: once it succeeds, resume
    /// will never replay this record. On a second unload of the same row the
    /// handle is already gone and `Error::NotFound` is returned with no
    /// partial mutation.
    pub fn unload(&mut self, rowid: u64, result_code: i32) -> Result<()> {
        let (list, idx) = self.locate(rowid).ok_or(Error::NotFound(rowid))?;

        let mut flags = self.message_at(list, idx).flags();
        flags.set_pending(false);
        self.store
            .borrow_mut()
            .write_flags(self.topic, rowid, flags)?;

        let removed = match list {
            Membership::Inflight => self.inflight.remove(idx),
            Membership::Queued => self.queued.remove(idx),
        };
        debug_assert!(removed.is_some());
        debug!(
            "queue {}: unloaded rowid {rowid} (result {result_code})",
            self.name
        );
        Ok(())
    }

    /// Rewrite a handle's persisted flag word in place and keep the
    /// in-memory word in sync.
    pub fn write_hard_flag(&mut self, rowid: u64, flags: FlagWord) -> Result<()> {
        let (list, idx) = self.locate(rowid).ok_or(Error::NotFound(rowid))?;
        self.store
            .borrow_mut()
            .write_flags(self.topic, rowid, flags)?;
        self.message_at_mut(list, idx).set_flags(flags);
        Ok(())
    }

    /// Rotate the backing topic when it has grown past the configured
    /// threshold. Returns whether a rotation happened.
    ///
    /// The checkpoint is first advanced to the topic size (nothing may look
    /// pending across the rotation boundary), then the store archives or
    /// truncates the topic, then the checkpoint is reset to 0 so the next
    /// resume treats the fresh topic as starting clean. A crash between the
    /// steps therefore cannot resurrect rotated-away rows.
    pub fn check_backup(&mut self) -> Result<bool> {
        if self.backup_queue_size == 0 {
            return Ok(false);
        }
        let size = self.store.borrow().topic_size(self.topic)?;
        if size < self.backup_queue_size {
            return Ok(false);
        }

        if !self.inflight.is_empty() || !self.queued.is_empty() {
            warn!(
                "queue {}: rotating with {} inflight / {} queued handles still live",
                self.name,
                self.inflight.len(),
                self.queued.len()
            );
        }

        self.persist_checkpoint(size)?;
        let fresh = self.store.borrow_mut().backup_topic(self.topic)?;
        self.topic = fresh;
        self.first_rowid = 0;
        self.persist_checkpoint(0)?;

        debug!("queue {}: rotated backing topic at {size} rows", self.name);
        Ok(true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> TopicId {
        self.topic
    }

    /// Oldest-still-pending checkpoint as of the last load/rotation.
    pub fn first_rowid(&self) -> u64 {
        self.first_rowid
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn iter_inflight(&self) -> impl Iterator<Item = &QueueMessage> {
        self.inflight.iter()
    }

    pub fn iter_queued(&self) -> impl Iterator<Item = &QueueMessage> {
        self.queued.iter()
    }

    /// Row-id snapshot of the inflight list. Safe to traverse while
    /// unloading or moving elements, unlike the borrowing iterators.
    pub fn inflight_rowids(&self) -> Vec<u64> {
        self.inflight.iter().map(QueueMessage::rowid).collect()
    }

    /// Row-id snapshot of the queued list.
    pub fn queued_rowids(&self) -> Vec<u64> {
        self.queued.iter().map(QueueMessage::rowid).collect()
    }

    /// Run a predicate scan and admit every match, returning the admitted
    /// row ids in scan order.
    fn scan_and_admit(&mut self, predicate: &ScanPredicate) -> Result<Vec<u64>> {
        let mut matches: Vec<RecordMeta> = Vec::new();
        self.store.borrow().scan(self.topic, predicate, &mut |meta| {
            matches.push(meta);
            ScanControl::Continue
        })?;

        let mut admitted = Vec::with_capacity(matches.len());
        for meta in matches {
            self.admit(meta, None)?;
            admitted.push(meta.rowid);
        }
        Ok(admitted)
    }

    /// Admission step shared by append and the load operations: inflight
    /// while under the bound, otherwise queued without retained content.
    fn admit(&mut self, meta: RecordMeta, content: Option<Content>) -> Result<Membership> {
        let under_bound = self.max_inflight == 0 || self.inflight.len() < self.max_inflight;
        if under_bound {
            let content = match content {
                Some(content) => content,
                None => self.load_content(meta.rowid)?,
            };
            self.inflight
                .push_back(QueueMessage::inflight(meta.rowid, meta.time, meta.flags, content));
            Ok(Membership::Inflight)
        } else {
            // Any content passed in is released here; it can be reloaded
            // from the store when the handle moves to inflight.
            let msg_id = content.as_ref().map(Content::msg_id).unwrap_or(0);
            self.queued
                .push_back(QueueMessage::queued(meta.rowid, meta.time, msg_id, meta.flags));
            Ok(Membership::Queued)
        }
    }

    fn load_content(&self, rowid: u64) -> Result<Content> {
        let bytes = self.store.borrow().read_content(self.topic, rowid)?;
        Content::decode(&bytes)
    }

    fn locate(&self, rowid: u64) -> Option<(Membership, usize)> {
        if let Some(idx) = self.inflight.iter().position(|m| m.rowid() == rowid) {
            return Some((Membership::Inflight, idx));
        }
        self.queued
            .iter()
            .position(|m| m.rowid() == rowid)
            .map(|idx| (Membership::Queued, idx))
    }

    fn message_at(&self, list: Membership, idx: usize) -> &QueueMessage {
        match list {
            Membership::Inflight => &self.inflight[idx],
            Membership::Queued => &self.queued[idx],
        }
    }

    fn message_at_mut(&mut self, list: Membership, idx: usize) -> &mut QueueMessage {
        match list {
            Membership::Inflight => &mut self.inflight[idx],
            Membership::Queued => &mut self.queued[idx],
        }
    }

    fn persist_checkpoint(&self, value: u64) -> Result<()> {
        let mut store = self.store.borrow_mut();
        if store.is_master() {
            store.write_metadata(self.topic, META_FIRST_ROWID, value)?;
        }
        Ok(())
    }
}
