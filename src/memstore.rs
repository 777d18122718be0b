//! In-memory reference implementation of the log-store contract.
//!
//! Backs the test suite and embedders that do not need durability. Rotated
//! generations are kept aside for audit rather than discarded.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::flags::FlagWord;
use crate::store::{
    AppendedRecord, KeyType, LogStore, RecordMeta, ScanControl, ScanPredicate, TopicId,
};
use crate::{Error, Result};

#[derive(Clone, Debug)]
struct MemRecord {
    time: u64,
    flags: FlagWord,
    content: Vec<u8>,
}

struct MemTopic {
    name: String,
    #[allow(dead_code)]
    time_key: String,
    #[allow(dead_code)]
    key_type: KeyType,
    records: Vec<MemRecord>,
    metadata: HashMap<String, u64>,
    archived: Vec<Vec<MemRecord>>,
}

/// Single-process, non-durable log store.
pub struct MemoryLogStore {
    topics: Vec<MemTopic>,
    by_name: HashMap<String, usize>,
    master: bool,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self {
            topics: Vec::new(),
            by_name: HashMap::new(),
            master: true,
        }
    }

    /// A store that holds the replica role: metadata writes are refused by
    /// policy at the queue layer (`is_master` returns false).
    pub fn replica() -> Self {
        Self {
            master: false,
            ..Self::new()
        }
    }

    /// Number of rotated-away generations kept for a topic.
    pub fn archived_generations(&self, topic: TopicId) -> Result<usize> {
        Ok(self.topic(topic)?.archived.len())
    }

    fn topic(&self, id: TopicId) -> Result<&MemTopic> {
        self.topics
            .get(id.0 as usize)
            .ok_or(Error::TopicNotFound(id))
    }

    fn topic_mut(&mut self, id: TopicId) -> Result<&mut MemTopic> {
        self.topics
            .get_mut(id.0 as usize)
            .ok_or(Error::TopicNotFound(id))
    }
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStore for MemoryLogStore {
    fn create_topic(&mut self, name: &str, time_key: &str, key_type: KeyType) -> Result<TopicId> {
        if let Some(&idx) = self.by_name.get(name) {
            return Ok(TopicId(idx as u64));
        }
        let idx = self.topics.len();
        self.topics.push(MemTopic {
            name: name.to_string(),
            time_key: time_key.to_string(),
            key_type,
            records: Vec::new(),
            metadata: HashMap::new(),
            archived: Vec::new(),
        });
        self.by_name.insert(name.to_string(), idx);
        debug!("created topic {name} as topic#{idx}");
        Ok(TopicId(idx as u64))
    }

    fn append_record(
        &mut self,
        topic: TopicId,
        time_or_zero: u64,
        flags: FlagWord,
        content: &[u8],
    ) -> Result<AppendedRecord> {
        let time = if time_or_zero == 0 {
            now_ns()
        } else {
            time_or_zero
        };
        let t = self.topic_mut(topic)?;
        t.records.push(MemRecord {
            time,
            flags,
            content: content.to_vec(),
        });
        Ok(AppendedRecord {
            rowid: (t.records.len() - 1) as u64,
            time,
            flags,
        })
    }

    fn scan(
        &self,
        topic: TopicId,
        predicate: &ScanPredicate,
        visit: &mut dyn FnMut(RecordMeta) -> ScanControl,
    ) -> Result<()> {
        let t = self.topic(topic)?;
        let start = predicate.from_rowid.unwrap_or(0) as usize;
        for (idx, record) in t.records.iter().enumerate().skip(start) {
            if let Some(mask) = predicate.pending_mask {
                if record.flags.bits() & mask == 0 {
                    continue;
                }
            }
            if let Some(from) = predicate.from_time {
                if record.time < from {
                    continue;
                }
            }
            if let Some(to) = predicate.to_time {
                if record.time > to {
                    continue;
                }
            }
            let meta = RecordMeta {
                rowid: idx as u64,
                time: record.time,
                flags: record.flags,
            };
            if visit(meta) == ScanControl::Stop {
                break;
            }
        }
        Ok(())
    }

    fn read_content(&self, topic: TopicId, rowid: u64) -> Result<Vec<u8>> {
        let t = self.topic(topic)?;
        t.records
            .get(rowid as usize)
            .map(|r| r.content.clone())
            .ok_or(Error::RecordNotFound(rowid))
    }

    fn write_flags(&mut self, topic: TopicId, rowid: u64, flags: FlagWord) -> Result<()> {
        let t = self.topic_mut(topic)?;
        let record = t
            .records
            .get_mut(rowid as usize)
            .ok_or(Error::RecordNotFound(rowid))?;
        record.flags = flags;
        Ok(())
    }

    fn topic_size(&self, topic: TopicId) -> Result<u64> {
        Ok(self.topic(topic)?.records.len() as u64)
    }

    fn write_metadata(&mut self, topic: TopicId, key: &str, value: u64) -> Result<()> {
        let t = self.topic_mut(topic)?;
        t.metadata.insert(key.to_string(), value);
        Ok(())
    }

    fn read_metadata(&self, topic: TopicId, key: &str) -> Result<Option<u64>> {
        Ok(self.topic(topic)?.metadata.get(key).copied())
    }

    fn backup_topic(&mut self, topic: TopicId) -> Result<TopicId> {
        let t = self.topic_mut(topic)?;
        let rotated = std::mem::take(&mut t.records);
        debug!("rotated topic {} ({} rows archived)", t.name, rotated.len());
        t.archived.push(rotated);
        // Same handle, fresh generation: row ids restart at 0.
        Ok(topic)
    }

    fn is_master(&self) -> bool {
        self.master
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
