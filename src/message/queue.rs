use std::collections::VecDeque;
use log::{debug, trace};
use crate::chunk::ChunkMux;
use crate::message::types::Priority;
use crate::processing::is_key_frame_payload;
use crate::protocol::{ControlMessage, RtmpData, RtmpMessage};
use crate::{ByteQueue, Result};

/// Accounting overhead per queued message (largest chunk header)
const MESSAGE_OVERHEAD: usize = 18;

struct QueuedMessage {
    message: RtmpMessage,
    priority: Priority,
    cost: usize,
}

impl QueuedMessage {
    fn is_key_video(&self) -> bool {
        self.message.is_video() && is_key_frame_payload(&self.message.payload)
    }

    /// A newer `other` makes this entry stale: same sequence header kind,
    /// or a data message with the same handler name
    fn superseded_by(&self, other: &RtmpMessage) -> bool {
        if self.priority != Priority::Data || self.message.message_type != other.message_type {
            return false;
        }
        if !self.message.is_data() {
            return true;
        }
        match (RtmpData::parse(&self.message.payload), RtmpData::parse(&other.payload)) {
            (Ok(old), Ok(new)) => old.name == new.name,
            _ => false,
        }
    }
}

/// Bounded per-client output queue.
///
/// Messages are chunked only when they reach the head, so the chunk header
/// cache always follows the order bytes hit the socket. When a push would
/// exceed the limit, media entries are evicted lowest priority first and
/// oldest first within a priority; the in-flight head is never touched.
/// After video is evicted, further video waits for the next key frame.
///
/// Sequence headers and data messages are never evicted for media, but a
/// newer one replaces its queued predecessor and one that cannot fit is
/// refused. Only control and command traffic may exceed the limit.
pub struct OutputQueue {
    entries: VecDeque<QueuedMessage>,
    /// Chunked bytes of the message being written
    head: ByteQueue,
    mux: ChunkMux,
    limit: usize,
    queued_bytes: usize,
    evicted: u64,
    wait_key_frame: bool,
}

impl OutputQueue {
    pub fn new(limit: usize) -> Self {
        OutputQueue {
            entries: VecDeque::new(),
            head: ByteQueue::with_capacity(4096),
            mux: ChunkMux::new(),
            limit,
            queued_bytes: 0,
            evicted: 0,
            wait_key_frame: false,
        }
    }

    /// Bytes held: queued messages plus the unsent rest of the head
    pub fn size(&self) -> usize {
        self.queued_bytes + self.head.size()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Messages dropped so far
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.head.is_empty()
    }

    /// Queued messages, the in-flight one excluded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Outgoing chunk size once everything queued so far is written
    pub fn chunk_size(&self) -> usize {
        self.mux.chunk_size()
    }

    /// Queue `message`; returns false when it was dropped instead
    pub fn push(&mut self, message: RtmpMessage) -> bool {
        let priority = Priority::of(&message);
        let entry = QueuedMessage {
            cost: message.payload.len() + MESSAGE_OVERHEAD,
            priority,
            message,
        };

        if priority == Priority::Video {
            if self.wait_key_frame && !entry.is_key_video() {
                self.evicted += 1;
                return false;
            }
            self.wait_key_frame = false;
        }

        if priority == Priority::Data {
            if let Some(index) = self.entries.iter().position(|e| e.superseded_by(&entry.message)) {
                trace!("Replacing queued message type {}", entry.message.message_type);
                if let Some(stale) = self.entries.remove(index) {
                    self.queued_bytes -= stale.cost;
                    self.evicted += 1;
                }
            }
        }

        while self.size() + entry.cost > self.limit {
            match self.victim(priority) {
                Some(index) => self.evict(index),
                None if priority.may_exceed_limit() => break,
                None => {
                    trace!("Queue full, dropping incoming {:?}", priority);
                    self.evicted += 1;
                    if entry.message.is_video() {
                        self.wait_key_frame = true;
                    }
                    return false;
                }
            }
        }

        self.queued_bytes += entry.cost;
        self.entries.push_back(entry);
        true
    }

    /// Oldest entry of the lowest droppable priority, not above `incoming`
    fn victim(&self, incoming: Priority) -> Option<usize> {
        let lowest = self
            .entries
            .iter()
            .filter(|e| e.priority.is_droppable())
            .map(|e| e.priority)
            .min()?;
        if incoming.is_droppable() && lowest > incoming {
            return None;
        }
        self.entries.iter().position(|e| e.priority == lowest)
    }

    fn evict(&mut self, index: usize) {
        let Some(entry) = self.entries.remove(index) else {
            return;
        };
        self.queued_bytes -= entry.cost;
        self.evicted += 1;
        if entry.priority != Priority::Video {
            return;
        }

        // Frames depending on the evicted one are useless up to the next key frame
        let mut i = index;
        while i < self.entries.len() {
            let next = &self.entries[i];
            if next.priority == Priority::Video {
                if next.is_key_video() {
                    debug!("Video evicted up to key frame at {}", next.message.timestamp);
                    return;
                }
                if let Some(dropped) = self.entries.remove(i) {
                    self.queued_bytes -= dropped.cost;
                    self.evicted += 1;
                }
                continue;
            }
            i += 1;
        }
        self.wait_key_frame = true;
    }

    /// Bytes ready for the socket, chunking the next message if needed
    pub fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        if self.head.is_empty() {
            let Some(entry) = self.entries.pop_front() else {
                return Ok(None);
            };
            self.queued_bytes -= entry.cost;
            self.mux.write_message(&entry.message, &mut self.head)?;
            if let Ok(Some(ControlMessage::SetChunkSize(size))) = ControlMessage::parse(&entry.message) {
                self.mux.set_chunk_size(size as usize)?;
            }
        }
        Ok(Some(self.head.as_slice()))
    }

    /// Mark `n` bytes from [`OutputQueue::next_chunk`] as written
    pub fn consume(&mut self, n: usize) {
        self.head.pop(n);
    }
}
