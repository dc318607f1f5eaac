use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use crate::chunk::stream::{BasicHeader, ChunkStreamState};
use crate::protocol::{
    MessageHeader, RtmpMessage, EXTENDED_TIMESTAMP, MAX_INCOMING_CHUNK_SIZE,
    MSG_TYPE_ABORT, MSG_TYPE_SET_CHUNK_SIZE,
};
use crate::{ByteQueue, Error, Result};

/// Result of trying to parse one chunk from the buffered bytes
enum Parsed {
    Incomplete,
    Chunk {
        consumed: usize,
        message: Option<RtmpMessage>,
    },
}

/// Reassembles incoming chunks into messages.
///
/// Sans-IO: bytes go in through [`ChunkDemux::feed`], complete messages come
/// out of [`ChunkDemux::next_message`]. Set Chunk Size and Abort are applied
/// here before any later chunk is parsed.
#[derive(Debug)]
pub struct ChunkDemux {
    state: ChunkStreamState,
    max_chunk_size: u32,
    buffer: ByteQueue,
    bytes_fed: u64,
}

impl Default for ChunkDemux {
    fn default() -> Self {
        ChunkDemux::new()
    }
}

impl ChunkDemux {
    pub fn new() -> Self {
        ChunkDemux::with_max_chunk_size(MAX_INCOMING_CHUNK_SIZE)
    }

    /// Refuse Set Chunk Size announcements above `max`
    pub fn with_max_chunk_size(max: u32) -> Self {
        ChunkDemux {
            state: ChunkStreamState::new(),
            max_chunk_size: max,
            buffer: ByteQueue::with_capacity(4096),
            bytes_fed: 0,
        }
    }

    /// Incoming chunk size currently in force
    pub fn chunk_size(&self) -> usize {
        self.state.chunk_size
    }

    /// Bytes fed but not yet consumed by a complete chunk
    pub fn buffered(&self) -> usize {
        self.buffer.size()
    }

    /// Total bytes fed since creation, for acknowledgements
    pub fn bytes_fed(&self) -> u64 {
        self.bytes_fed
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        self.bytes_fed += data.len() as u64;
        self.buffer.put_bytes(data)
    }

    /// Next complete message, or `None` when more bytes are needed
    pub fn next_message(&mut self) -> Result<Option<RtmpMessage>> {
        loop {
            match self.parse_chunk()? {
                Parsed::Incomplete => return Ok(None),
                Parsed::Chunk { consumed, message } => {
                    self.buffer.pop(consumed);
                    if let Some(message) = message {
                        self.apply_control(&message)?;
                        return Ok(Some(message));
                    }
                }
            }
        }
    }

    /// Read from `reader` until one message is complete.
    ///
    /// Cancel safe: bytes are fed as soon as a read returns.
    pub async fn read_message<R>(&mut self, reader: &mut R) -> Result<RtmpMessage>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; 8192];
        loop {
            if let Some(message) = self.next_message()? {
                return Ok(message);
            }
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Err(Error::reset("Connection closed by peer"));
            }
            self.feed(&buf[..n])?;
        }
    }

    fn apply_control(&mut self, message: &RtmpMessage) -> Result<()> {
        match message.message_type {
            MSG_TYPE_SET_CHUNK_SIZE => {
                if message.payload.len() < 4 {
                    return Err(Error::bad_data("Truncated Set Chunk Size"));
                }
                let size = BigEndian::read_u32(&message.payload) & 0x7FFF_FFFF;
                if size == 0 || size > self.max_chunk_size {
                    return Err(Error::bad_data(format!("Peer chunk size {} out of range", size)));
                }
                debug!("Incoming chunk size set to {}", size);
                self.state.chunk_size = size as usize;
            }
            MSG_TYPE_ABORT => {
                if message.payload.len() < 4 {
                    return Err(Error::bad_data("Truncated Abort"));
                }
                let channel = BigEndian::read_u32(&message.payload);
                debug!("Peer aborted message on channel {}", channel);
                if let Some(ch) = self.state.channels.get_mut(&channel) {
                    ch.abort();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn parse_chunk(&mut self) -> Result<Parsed> {
        let data = self.buffer.as_slice();
        let Some((basic, mut pos)) = BasicHeader::parse(data) else {
            return Ok(Parsed::Incomplete);
        };

        let header_len = match basic.fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };
        if data.len() < pos + header_len {
            return Ok(Parsed::Incomplete);
        }

        let channel = self.state.channel(basic.channel);
        let prev = channel.and_then(|c| c.prev_header);
        let assembling = channel.is_some_and(|c| c.is_assembling());

        if basic.fmt != 0 && prev.is_none() {
            return Err(Error::bad_data(format!(
                "fmt {} chunk on channel {} without a previous header",
                basic.fmt, basic.channel
            )));
        }

        let fields = &data[pos..pos + header_len];
        pos += header_len;

        let ts_field = if header_len > 0 {
            BigEndian::read_u24(&fields[0..3])
        } else {
            channel.map_or(0, |c| c.last_delta)
        };
        let extended = if header_len > 0 {
            ts_field == EXTENDED_TIMESTAMP
        } else {
            channel.is_some_and(|c| c.extended)
        };

        let ts_value = if extended {
            if data.len() < pos + 4 {
                return Ok(Parsed::Incomplete);
            }
            let value = BigEndian::read_u32(&data[pos..pos + 4]);
            pos += 4;
            value
        } else {
            ts_field
        };

        // fmt 3 inside a message being assembled only carries payload
        let continuing = basic.fmt == 3 && assembling;
        let header = match (basic.fmt, prev) {
            _ if continuing => None,
            (0, _) => Some(MessageHeader {
                timestamp: ts_value,
                length: BigEndian::read_u24(&fields[3..6]),
                message_type: fields[6],
                stream_id: LittleEndian::read_u32(&fields[7..11]),
            }),
            (1, Some(prev)) => Some(MessageHeader {
                timestamp: prev.timestamp.wrapping_add(ts_value),
                length: BigEndian::read_u24(&fields[3..6]),
                message_type: fields[6],
                stream_id: prev.stream_id,
            }),
            (2, Some(prev)) | (3, Some(prev)) => Some(MessageHeader {
                timestamp: prev.timestamp.wrapping_add(ts_value),
                ..prev
            }),
            _ => return Err(Error::bad_data("Unresolvable chunk header")),
        };

        let remaining = match header {
            Some(h) => h.length as usize,
            None => channel.map_or(0, |c| c.remaining),
        };
        let take = remaining.min(self.state.chunk_size);
        if data.len() < pos + take {
            return Ok(Parsed::Incomplete);
        }
        let body = &data[pos..pos + take];
        let consumed = pos + take;

        // Everything is available: commit
        let chunk_size = self.state.chunk_size;
        let ch = self.state.channel_mut(basic.channel);
        if let Some(h) = header {
            if ch.is_assembling() {
                warn!(
                    "New header on channel {} dropped a partial message ({} bytes missing)",
                    basic.channel, ch.remaining
                );
            }
            ch.prev_header = Some(h);
            ch.payload.clear();
            ch.payload.reserve(h.length as usize);
            ch.remaining = h.length as usize;
            if header_len > 0 {
                ch.last_delta = ts_value;
                ch.extended = extended;
            }
        }
        ch.payload.extend_from_slice(body);
        ch.remaining -= take;

        trace!(
            "Chunk fmt {} channel {} took {} bytes (chunk size {}, {} left)",
            basic.fmt, basic.channel, take, chunk_size, ch.remaining
        );

        if ch.remaining > 0 {
            return Ok(Parsed::Chunk { consumed, message: None });
        }

        let h = ch.prev_header.unwrap_or_default();
        let payload = std::mem::take(&mut ch.payload);
        Ok(Parsed::Chunk {
            consumed,
            message: Some(RtmpMessage::new(
                basic.channel,
                h.message_type,
                h.timestamp,
                h.stream_id,
                payload,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkMux;
    use crate::protocol::ControlMessage;

    fn demux_all(demux: &mut ChunkDemux) -> Vec<RtmpMessage> {
        let mut out = Vec::new();
        while let Some(msg) = demux.next_message().unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_round_trip_sizes() {
        for chunk_size in [128usize, 4096] {
            let sizes = [0, chunk_size - 1, chunk_size, chunk_size + 1, chunk_size * 10];
            let mut mux = ChunkMux::new();
            mux.set_chunk_size(chunk_size).unwrap();
            let mut demux = ChunkDemux::new();
            let mut wire = ByteQueue::new();

            // Announce chunk size in band so the demux follows
            if chunk_size != 128 {
                let msg = ControlMessage::SetChunkSize(chunk_size as u32).encode().unwrap();
                let mut plain = ChunkMux::new();
                plain.write_message(&msg, &mut wire).unwrap();
            }

            let mut sent = Vec::new();
            for (i, size) in sizes.iter().enumerate() {
                let payload: Vec<u8> = (0..*size).map(|b| (b % 251) as u8).collect();
                let msg = if i % 2 == 0 {
                    RtmpMessage::video(1, i as u32 * 40, payload)
                } else {
                    RtmpMessage::audio(1, i as u32 * 20, payload)
                };
                mux.write_message(&msg, &mut wire).unwrap();
                sent.push(msg);
            }

            // Feed in awkward slices
            let bytes = wire.take_all();
            for piece in bytes.chunks(37) {
                demux.feed(piece).unwrap();
            }
            let mut received = demux_all(&mut demux);
            if chunk_size != 128 {
                assert_eq!(received.remove(0).message_type, MSG_TYPE_SET_CHUNK_SIZE);
                assert_eq!(demux.chunk_size(), chunk_size);
            }
            assert_eq!(received, sent);
            assert_eq!(demux.buffered(), 0);
        }
    }

    #[test]
    fn test_interleaved_channels() {
        // Chunk size 128; a 200 byte video message interleaved with audio
        let video = RtmpMessage::video(1, 0, vec![9u8; 200]);
        let audio = RtmpMessage::audio(1, 0, vec![1u8; 10]);
        let mut mux = ChunkMux::new();
        let video_bytes = mux.encode(&video).unwrap();
        let audio_bytes = mux.encode(&audio).unwrap();

        // First video chunk is 12 + 128 bytes
        let mut demux = ChunkDemux::new();
        demux.feed(&video_bytes[..140]).unwrap();
        demux.feed(&audio_bytes).unwrap();
        demux.feed(&video_bytes[140..]).unwrap();

        let received = demux_all(&mut demux);
        assert_eq!(received, vec![audio, video]);
    }

    #[test]
    fn test_compressed_headers_resolve() {
        let mut mux = ChunkMux::new();
        let mut wire = ByteQueue::new();
        let msgs = vec![
            RtmpMessage::audio(1, 0, vec![1; 4]),
            RtmpMessage::audio(1, 23, vec![2; 4]),
            RtmpMessage::audio(1, 46, vec![3; 9]),
            RtmpMessage::audio(1, 10, vec![4; 9]),
        ];
        for msg in &msgs {
            mux.write_message(msg, &mut wire).unwrap();
        }
        let mut demux = ChunkDemux::new();
        demux.feed(wire.as_slice()).unwrap();
        assert_eq!(demux_all(&mut demux), msgs);
    }

    #[test]
    fn test_continuation_without_header_is_bad_data() {
        for first in [0xC4u8, 0x84, 0x44] {
            let mut demux = ChunkDemux::new();
            demux.feed(&[first, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
            assert!(matches!(demux.next_message(), Err(Error::BadData(_))));
        }
    }

    #[test]
    fn test_fmt3_new_message_reuses_delta() {
        let mut demux = ChunkDemux::new();
        // fmt 0 on channel 4: ts 10, len 1, audio, stream 1
        demux.feed(&[0x04, 0, 0, 10, 0, 0, 1, 8, 1, 0, 0, 0, 0xAA]).unwrap();
        // fmt 2: delta 5
        demux.feed(&[0x84, 0, 0, 5, 0xBB]).unwrap();
        // fmt 3 starts a new message with the same delta
        demux.feed(&[0xC4, 0xCC]).unwrap();

        let received = demux_all(&mut demux);
        let stamps: Vec<u32> = received.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![10, 15, 20]);
        assert_eq!(received[2].payload.as_ref(), &[0xCC]);
    }

    #[test]
    fn test_extended_timestamp_round_trip() {
        let mut mux = ChunkMux::new();
        let msg = RtmpMessage::video(1, 0x0123_4567, vec![5u8; 300]);
        let bytes = mux.encode(&msg).unwrap();
        let mut demux = ChunkDemux::new();
        demux.feed(&bytes).unwrap();
        assert_eq!(demux.next_message().unwrap(), Some(msg));
    }

    #[test]
    fn test_oversized_chunk_size_rejected() {
        let mut demux = ChunkDemux::with_max_chunk_size(65536);
        let msg = ControlMessage::SetChunkSize(1 << 20).encode().unwrap();
        demux.feed(&ChunkMux::new().encode(&msg).unwrap()).unwrap();
        assert!(matches!(demux.next_message(), Err(Error::BadData(_))));
    }

    #[test]
    fn test_abort_discards_partial() {
        let mut mux = ChunkMux::new();
        let video = mux.encode(&RtmpMessage::video(1, 0, vec![1u8; 200])).unwrap();
        let abort = mux
            .encode(&ControlMessage::Abort(6).encode().unwrap())
            .unwrap();
        let next = mux.encode(&RtmpMessage::video(1, 40, vec![2u8; 3])).unwrap();

        let mut demux = ChunkDemux::new();
        demux.feed(&video[..140]).unwrap();
        demux.feed(&abort).unwrap();
        demux.feed(&next).unwrap();

        let received = demux_all(&mut demux);
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].message_type, MSG_TYPE_ABORT);
        assert_eq!(received[1].payload.as_ref(), &[2, 2, 2]);
    }

    #[tokio::test]
    async fn test_read_message_from_stream() {
        let mut mux = ChunkMux::new();
        let msg = RtmpMessage::command(0, vec![0x02, 0x00, 0x01, b'x']);
        let bytes = mux.encode(&msg).unwrap();

        let mut reader: &[u8] = &bytes;
        let mut demux = ChunkDemux::new();
        assert_eq!(demux.read_message(&mut reader).await.unwrap(), msg);
        assert!(matches!(demux.read_message(&mut reader).await, Err(Error::Reset(_))));
    }
}
