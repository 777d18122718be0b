//! Persistent per-client delivery queues for an MQTT-compatible broker.
//!
//! Each queue pairs a bounded in-memory *inflight* window with a
//! disk-resident *queued* overflow, both backed by an append-only log topic.
//! Messages carry a packed 16-bit delivery flag word (pending, QoS, retain,
//! dup, direction, origin, protocol state) persisted alongside their
//! content; the pending bit drives crash-safe resume, so a restart replays
//! exactly the messages that were never acknowledged.
//!
//! Persistence itself lives behind the [`LogStore`] trait; the engine only
//! maintains the bounded, resumable queue a higher protocol layer transmits
//! from and acknowledges into. All operations are synchronous and
//! single-threaded by contract.

pub mod content;
pub mod error;
pub mod flags;
pub mod memstore;
pub mod queue;
pub mod record;
pub mod store;

pub use content::Content;
pub use error::{Error, Result};
pub use flags::{Direction, FlagWord, Origin, ProtocolState, Qos, PENDING_MASK};
pub use memstore::MemoryLogStore;
pub use queue::{Queue, QueueConfig};
pub use record::{Membership, QueueMessage};
pub use store::{
    AppendedRecord, KeyType, LogStore, RecordMeta, ScanControl, ScanPredicate, TopicId,
    META_BACKUP_QUEUE_SIZE, META_FIRST_ROWID,
};
