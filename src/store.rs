//! Log-store collaborator contract.
//!
//! The queue engine does not own any persistence; it drives an append-only,
//! time-indexed log store through this trait. Topic creation, on-disk record
//! encoding, backup mechanics and the master/replica distinction are entirely
//! the store's concern. `MemoryLogStore` in this crate is a single-process
//! reference implementation; durable stores plug in behind the same trait.

use std::fmt;

use crate::flags::FlagWord;
use crate::Result;

/// Metadata key for the resume checkpoint: the row id of the oldest record
/// that was still pending when the queue was last checkpointed.
pub const META_FIRST_ROWID: &str = "first_rowid";
/// Metadata key for the backup/rotation threshold (row count, 0 = disabled).
pub const META_BACKUP_QUEUE_SIZE: &str = "backup_queue_size";

/// Opaque handle for one topic/stream in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TopicId(pub u64);

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "topic#{}", self.0)
    }
}

/// Requested key type for a topic. Queues are strictly append/row-id
/// ordered, so `Queue::open` forces `RowId` regardless of what the caller
/// asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyType {
    #[default]
    RowId,
    UserKey,
}

/// Coordinates and flag word of one stored record, as reported by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordMeta {
    pub rowid: u64,
    pub time: u64,
    pub flags: FlagWord,
}

/// Result of appending one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppendedRecord {
    pub rowid: u64,
    pub time: u64,
    pub flags: FlagWord,
}

/// Match predicate for a forward range scan. All fields are conjunctive;
/// `None` means "no constraint".
#[derive(Clone, Copy, Debug, Default)]
pub struct ScanPredicate {
    /// Record matches when `flags & pending_mask != 0`.
    pub pending_mask: Option<u16>,
    /// Inclusive lower row-id bound.
    pub from_rowid: Option<u64>,
    /// Inclusive lower time bound.
    pub from_time: Option<u64>,
    /// Inclusive upper time bound.
    pub to_time: Option<u64>,
}

/// Returned by the per-record scan callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

/// Append-only, time-indexed log store.
///
/// Row ids within one topic are assigned by the store, start at 0 and grow
/// monotonically; `backup_topic` restarts them at 0 for the fresh topic.
pub trait LogStore {
    /// Create or attach to a named topic. Idempotent.
    fn create_topic(&mut self, name: &str, time_key: &str, key_type: KeyType) -> Result<TopicId>;

    /// Append one record. `time_or_zero == 0` means "store assigns now".
    fn append_record(
        &mut self,
        topic: TopicId,
        time_or_zero: u64,
        flags: FlagWord,
        content: &[u8],
    ) -> Result<AppendedRecord>;

    /// Forward range scan in row-id order. The callback decides whether to
    /// keep going; record content is not materialized here.
    fn scan(
        &self,
        topic: TopicId,
        predicate: &ScanPredicate,
        visit: &mut dyn FnMut(RecordMeta) -> ScanControl,
    ) -> Result<()>;

    /// Read the persisted content bytes of one record.
    fn read_content(&self, topic: TopicId, rowid: u64) -> Result<Vec<u8>>;

    /// Rewrite a record's persisted flag word in place (hard flag write).
    fn write_flags(&mut self, topic: TopicId, rowid: u64, flags: FlagWord) -> Result<()>;

    /// Current row count of the topic.
    fn topic_size(&self, topic: TopicId) -> Result<u64>;

    /// Persist a topic metadata value. Callers must hold the master role;
    /// the queue engine checks `is_master` before every call.
    fn write_metadata(&mut self, topic: TopicId, key: &str, value: u64) -> Result<()>;

    /// Read back a topic metadata value.
    fn read_metadata(&self, topic: TopicId, key: &str) -> Result<Option<u64>>;

    /// Archive or truncate the topic, returning the handle of the fresh
    /// (empty) topic. Row ids restart at 0.
    fn backup_topic(&mut self, topic: TopicId) -> Result<TopicId>;

    /// Whether this process is the store's designated single writer for
    /// checkpoint/backup metadata.
    fn is_master(&self) -> bool;
}
