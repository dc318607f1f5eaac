use std::collections::HashMap;
use log::trace;
use crate::chunk::stream::BasicHeader;
use crate::protocol::{MessageHeader, RtmpMessage, DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP};
use crate::{ByteQueue, Error, Result};

/// Largest payload a 24-bit message length can describe
const MAX_MESSAGE_LENGTH: usize = 0xFF_FFFF;

/// Splits outgoing messages into chunks, compressing headers against the
/// last message sent on each channel.
#[derive(Debug)]
pub struct ChunkMux {
    /// Previous headers for each chunk stream
    prev_headers: HashMap<u32, MessageHeader>,

    /// Current chunk size for writing
    chunk_size: usize,
}

impl Default for ChunkMux {
    fn default() -> Self {
        ChunkMux::new()
    }
}

impl ChunkMux {
    pub fn new() -> Self {
        ChunkMux {
            prev_headers: HashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE as usize,
        }
    }

    /// Set outgoing chunk size; the peer must be told first
    pub fn set_chunk_size(&mut self, size: usize) -> Result<()> {
        if size == 0 || size > 0x7FFF_FFFF {
            return Err(Error::invalid_arg(format!("Invalid chunk size {}", size)));
        }
        self.chunk_size = size;
        Ok(())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Forget cached headers; the next message on every channel gets fmt 0
    pub fn reset(&mut self) {
        self.prev_headers.clear();
    }

    /// Chunk `message` into `out`
    pub fn write_message(&mut self, message: &RtmpMessage, out: &mut ByteQueue) -> Result<()> {
        if message.payload.len() > MAX_MESSAGE_LENGTH {
            return Err(Error::invalid_arg(format!(
                "Message of {} bytes exceeds the 24-bit length field",
                message.payload.len()
            )));
        }

        let header = message.header();
        let channel = message.channel;
        let fmt = self.select_format(channel, &header);

        // Timestamp field: absolute for fmt 0, delta otherwise
        let ts_field = match (fmt, self.prev_headers.get(&channel)) {
            (0, _) | (_, None) => header.timestamp,
            (_, Some(prev)) => header.timestamp.wrapping_sub(prev.timestamp),
        };
        let extended = ts_field >= EXTENDED_TIMESTAMP;
        let short_ts = if extended { EXTENDED_TIMESTAMP } else { ts_field };

        BasicHeader { fmt, channel }.encode(out)?;
        match fmt {
            0 => {
                out.put_u24_be(short_ts)?;
                out.put_u24_be(header.length)?;
                out.put_u8(header.message_type)?;
                out.put_u32_le(header.stream_id)?;
            }
            1 => {
                out.put_u24_be(short_ts)?;
                out.put_u24_be(header.length)?;
                out.put_u8(header.message_type)?;
            }
            _ => out.put_u24_be(short_ts)?,
        }
        if extended {
            out.put_u32_be(ts_field)?;
        }

        let payload = &message.payload;
        let first = payload.len().min(self.chunk_size);
        out.put_bytes(&payload[..first])?;

        // Continuation chunks (fmt 3)
        let mut offset = first;
        while offset < payload.len() {
            BasicHeader { fmt: 3, channel }.encode(out)?;
            if extended {
                out.put_u32_be(ts_field)?;
            }
            let end = (offset + self.chunk_size).min(payload.len());
            out.put_bytes(&payload[offset..end])?;
            offset = end;
        }

        trace!(
            "Chunked type {} len {} on channel {} (fmt {})",
            header.message_type, header.length, channel, fmt
        );
        self.prev_headers.insert(channel, header);
        Ok(())
    }

    /// Chunk a single message into a fresh buffer
    pub fn encode(&mut self, message: &RtmpMessage) -> Result<Vec<u8>> {
        let mut out = ByteQueue::with_capacity(message.payload.len() + 16);
        self.write_message(message, &mut out)?;
        Ok(out.take_all())
    }

    fn select_format(&self, channel: u32, header: &MessageHeader) -> u8 {
        match self.prev_headers.get(&channel) {
            None => 0,
            Some(prev) if prev.stream_id != header.stream_id => 0,
            Some(prev) if header.timestamp < prev.timestamp => 0,
            Some(prev) if prev.length != header.length || prev.message_type != header.message_type => 1,
            Some(_) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CHUNK_STREAM_AUDIO;

    #[test]
    fn test_first_message_full_header() {
        let mut mux = ChunkMux::new();
        let bytes = mux.encode(&RtmpMessage::audio(1, 40, vec![0xAF, 0x01])).unwrap();
        assert_eq!(bytes[0], CHUNK_STREAM_AUDIO as u8);
        assert_eq!(&bytes[1..4], &[0, 0, 40]);
        assert_eq!(&bytes[4..7], &[0, 0, 2]);
        assert_eq!(bytes[7], 8);
        assert_eq!(&bytes[8..12], &[1, 0, 0, 0]);
        assert_eq!(&bytes[12..], &[0xAF, 0x01]);
    }

    #[test]
    fn test_header_compression() {
        let mut mux = ChunkMux::new();
        mux.encode(&RtmpMessage::audio(1, 0, vec![0; 4])).unwrap();

        // Same length and type, later timestamp: fmt 2
        let fmt2 = mux.encode(&RtmpMessage::audio(1, 23, vec![0; 4])).unwrap();
        assert_eq!(fmt2[0] >> 6, 2);
        assert_eq!(&fmt2[1..4], &[0, 0, 23]);
        assert_eq!(fmt2.len(), 1 + 3 + 4);

        // Length changed: fmt 1
        let fmt1 = mux.encode(&RtmpMessage::audio(1, 46, vec![0; 6])).unwrap();
        assert_eq!(fmt1[0] >> 6, 1);
        assert_eq!(fmt1.len(), 1 + 7 + 6);

        // Timestamp went backwards: fmt 0
        let fmt0 = mux.encode(&RtmpMessage::audio(1, 10, vec![0; 6])).unwrap();
        assert_eq!(fmt0[0] >> 6, 0);

        // Other stream id: fmt 0
        let other = mux.encode(&RtmpMessage::audio(2, 50, vec![0; 6])).unwrap();
        assert_eq!(other[0] >> 6, 0);
    }

    #[test]
    fn test_continuation_chunks() {
        let mut mux = ChunkMux::new();
        let payload = vec![7u8; 300];
        let bytes = mux.encode(&RtmpMessage::video(1, 0, payload)).unwrap();
        // 12 header + 128, then 1 + 128, then 1 + 44
        assert_eq!(bytes.len(), 12 + 128 + 1 + 128 + 1 + 44);
        assert_eq!(bytes[140], 0xC0 | 6);
        assert_eq!(bytes[269], 0xC0 | 6);
    }

    #[test]
    fn test_extended_timestamp() {
        let mut mux = ChunkMux::new();
        let ts = 0x0100_0000;
        let bytes = mux.encode(&RtmpMessage::audio(1, ts, vec![0u8; 200])).unwrap();
        assert_eq!(&bytes[1..4], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[12..16], &ts.to_be_bytes());
        // Continuation chunk repeats the extended timestamp
        let cont = 16 + 128;
        assert_eq!(bytes[cont], 0xC0 | 4);
        assert_eq!(&bytes[cont + 1..cont + 5], &ts.to_be_bytes());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut mux = ChunkMux::new();
        assert!(mux.set_chunk_size(0).is_err());
        mux.set_chunk_size(4096).unwrap();
        assert_eq!(mux.chunk_size(), 4096);
    }
}
