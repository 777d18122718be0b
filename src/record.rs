//! In-memory handle for one persisted queue record.

use crate::content::Content;
use crate::flags::FlagWord;

/// Which list a message currently belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Membership {
    /// Content loaded, counted against the inflight bound.
    Inflight,
    /// Known by coordinates only; content stays on disk.
    Queued,
}

/// Handle for exactly one log record.
///
/// A handle is a member of exactly one of the inflight/queued lists at any
/// time. Inflight membership implies loaded content; queued implies none.
#[derive(Debug)]
pub struct QueueMessage {
    rowid: u64,
    time: u64,
    msg_id: u32,
    flags: FlagWord,
    content: Option<Content>,
    membership: Membership,
}

impl QueueMessage {
    pub(crate) fn inflight(rowid: u64, time: u64, flags: FlagWord, content: Content) -> Self {
        Self {
            rowid,
            time,
            msg_id: content.msg_id(),
            flags,
            content: Some(content),
            membership: Membership::Inflight,
        }
    }

    pub(crate) fn queued(rowid: u64, time: u64, msg_id: u32, flags: FlagWord) -> Self {
        Self {
            rowid,
            time,
            msg_id,
            flags,
            content: None,
            membership: Membership::Queued,
        }
    }

    pub fn rowid(&self) -> u64 {
        self.rowid
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    /// Protocol message id. 0 until the content has been loaded for
    /// handles resumed straight into the queued list.
    pub fn msg_id(&self) -> u32 {
        self.msg_id
    }

    pub fn flags(&self) -> FlagWord {
        self.flags
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    pub fn is_pending(&self) -> bool {
        self.flags.pending()
    }

    pub(crate) fn set_flags(&mut self, flags: FlagWord) {
        self.flags = flags;
    }

    pub(crate) fn set_content(&mut self, content: Content) {
        self.msg_id = content.msg_id();
        self.content = Some(content);
    }

    pub(crate) fn set_membership(&mut self, membership: Membership) {
        self.membership = membership;
    }
}
