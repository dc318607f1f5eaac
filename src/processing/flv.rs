use crate::{ByteQueue, Result};

pub const FLV_TAG_AUDIO: u8 = 8;
pub const FLV_TAG_VIDEO: u8 = 9;
pub const FLV_TAG_SCRIPT: u8 = 18;

/// FLV file header plus PreviousTagSize0
pub const FLV_HEADER_SIZE: usize = 9 + 4;
pub const FLV_TAG_HEADER_SIZE: usize = 11;

/// Writes the FLV byte stream a source hands to `read`
#[derive(Debug, Default, Clone, Copy)]
pub struct FlvMuxer;

impl FlvMuxer {
    /// `FLV` signature, version 1, flags, header size, PreviousTagSize0
    pub fn header(has_audio: bool, has_video: bool) -> Result<Vec<u8>> {
        let mut queue = ByteQueue::with_capacity(FLV_HEADER_SIZE);
        queue.put_bytes(b"FLV")?;
        queue.put_u8(1)?;
        queue.put_u8(((has_audio as u8) << 2) | has_video as u8)?;
        queue.put_u32_be(9)?;
        queue.put_u32_be(0)?;
        Ok(queue.take_all())
    }

    /// One tag followed by its PreviousTagSize
    pub fn tag(tag_type: u8, timestamp: u32, data: &[u8]) -> Result<Vec<u8>> {
        let mut queue = ByteQueue::with_capacity(FLV_TAG_HEADER_SIZE + data.len() + 4);
        queue.put_u8(tag_type)?;
        queue.put_u24_be(data.len() as u32)?;
        queue.put_u24_be(timestamp & 0x00FF_FFFF)?;
        queue.put_u8((timestamp >> 24) as u8)?;
        queue.put_u24_be(0)?; // stream id
        queue.put_bytes(data)?;
        queue.put_u32_be((FLV_TAG_HEADER_SIZE + data.len()) as u32)?;
        Ok(queue.take_all())
    }
}
