use thiserror::Error;

use crate::store::TopicId;

#[derive(Debug, Error)]
pub enum Error {
    /// Content handed to append violated the ownership contract
    /// (not a structured object).
    #[error("invalid content: {0}")]
    InvalidContent(&'static str),

    /// Persisted content failed to decode (bad hex, checksum mismatch).
    #[error("corrupt content: {0}")]
    Corrupt(&'static str),

    /// Row id absent from both the inflight and queued lists.
    #[error("message not found: rowid {0}")]
    NotFound(u64),

    /// Operation against a topic the store does not know.
    #[error("unknown topic: {0}")]
    TopicNotFound(TopicId),

    /// Row id out of range for the backing topic.
    #[error("record not found in store: rowid {0}")]
    RecordNotFound(u64),

    /// Failure reported by the log-store collaborator.
    #[error("log store: {0}")]
    Store(String),

    #[error("content encoding: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
