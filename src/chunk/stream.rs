use std::collections::HashMap;
use crate::protocol::{MessageHeader, DEFAULT_CHUNK_SIZE};
use crate::{ByteQueue, Error, Result};

/// Lowest and highest chunk stream ids the basic header can carry
pub const MIN_CHANNEL_ID: u32 = 2;
pub const MAX_CHANNEL_ID: u32 = 65599;

/// Per-channel demux context
#[derive(Debug, Clone, Default)]
pub struct ChunkChannel {
    /// Header of the last message started on this channel
    pub prev_header: Option<MessageHeader>,

    /// Last timestamp field (absolute for fmt 0, delta otherwise)
    pub last_delta: u32,

    /// Last header on this channel used an extended timestamp
    pub extended: bool,

    /// Partial payload being assembled
    pub payload: Vec<u8>,

    /// Bytes still missing from the current message
    pub remaining: usize,
}

impl ChunkChannel {
    /// Check if currently assembling a message
    pub fn is_assembling(&self) -> bool {
        self.remaining > 0
    }

    pub fn abort(&mut self) {
        self.payload.clear();
        self.remaining = 0;
    }
}

/// One direction of a connection: negotiated chunk size plus the header
/// cache used to resolve compressed headers. Never shared between
/// connections.
#[derive(Debug, Clone)]
pub struct ChunkStreamState {
    pub chunk_size: usize,
    pub channels: HashMap<u32, ChunkChannel>,
}

impl Default for ChunkStreamState {
    fn default() -> Self {
        ChunkStreamState::new()
    }
}

impl ChunkStreamState {
    pub fn new() -> Self {
        ChunkStreamState {
            chunk_size: DEFAULT_CHUNK_SIZE as usize,
            channels: HashMap::new(),
        }
    }

    pub fn channel(&self, id: u32) -> Option<&ChunkChannel> {
        self.channels.get(&id)
    }

    pub fn channel_mut(&mut self, id: u32) -> &mut ChunkChannel {
        self.channels.entry(id).or_default()
    }

    pub fn reset(&mut self) {
        self.channels.clear();
    }
}

/// Decoded basic header: format and chunk stream id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicHeader {
    pub fmt: u8,
    pub channel: u32,
}

impl BasicHeader {
    /// Parse from the front of `bytes`; `None` when more bytes are needed
    pub fn parse(bytes: &[u8]) -> Option<(BasicHeader, usize)> {
        let first = *bytes.first()?;
        let fmt = (first >> 6) & 0x03;

        let (channel, len) = match first & 0x3F {
            0 => (*bytes.get(1)? as u32 + 64, 2),
            1 => {
                let low = *bytes.get(1)? as u32;
                let high = *bytes.get(2)? as u32;
                (high * 256 + low + 64, 3)
            }
            n => (n as u32, 1),
        };

        Some((BasicHeader { fmt, channel }, len))
    }

    pub fn encode(&self, out: &mut ByteQueue) -> Result<()> {
        let fmt = self.fmt << 6;
        match self.channel {
            id @ MIN_CHANNEL_ID..=63 => out.put_u8(fmt | id as u8),
            id @ 64..=319 => {
                out.put_u8(fmt)?;
                out.put_u8((id - 64) as u8)
            }
            id @ 320..=MAX_CHANNEL_ID => {
                let id = id - 64;
                out.put_u8(fmt | 1)?;
                out.put_u8((id & 0xFF) as u8)?;
                out.put_u8((id >> 8) as u8)
            }
            id => Err(Error::invalid_arg(format!("Invalid chunk stream id {}", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_header_forms() {
        for (channel, len) in [(3u32, 1usize), (64, 2), (319, 2), (320, 3), (MAX_CHANNEL_ID, 3)] {
            let mut out = ByteQueue::new();
            BasicHeader { fmt: 2, channel }.encode(&mut out).unwrap();
            assert_eq!(out.size(), len);
            let (parsed, used) = BasicHeader::parse(out.as_slice()).unwrap();
            assert_eq!(used, len);
            assert_eq!(parsed, BasicHeader { fmt: 2, channel });
        }
    }

    #[test]
    fn test_basic_header_incomplete() {
        assert!(BasicHeader::parse(&[]).is_none());
        assert!(BasicHeader::parse(&[0x00]).is_none());
        assert!(BasicHeader::parse(&[0x01, 0x10]).is_none());
    }

    #[test]
    fn test_invalid_channel() {
        let mut out = ByteQueue::new();
        assert!(BasicHeader { fmt: 0, channel: 1 }.encode(&mut out).is_err());
        assert!(BasicHeader { fmt: 0, channel: MAX_CHANNEL_ID + 1 }.encode(&mut out).is_err());
    }
}
