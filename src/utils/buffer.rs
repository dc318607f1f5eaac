use byteorder::{BigEndian, ByteOrder, LittleEndian};
use crate::{Error, Result};

/// Growable staging buffer for encoded bytes.
///
/// Writers call [`ByteQueue::reserve`] (or one of the `put_*` helpers built on
/// it) and framing code later drains the staged bytes with [`ByteQueue::pop`].
/// Popped space at the front is reclaimed lazily; the queue never shrinks its
/// allocation on its own.
#[derive(Debug, Default)]
pub struct ByteQueue {
    buffer: Vec<u8>,
    read_pos: usize,
    limit: Option<usize>,
}

impl ByteQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        ByteQueue::default()
    }

    /// Create an empty queue with preallocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        ByteQueue {
            buffer: Vec::with_capacity(capacity),
            read_pos: 0,
            limit: None,
        }
    }

    /// Create a queue that refuses to hold more than `limit` staged bytes
    pub fn with_limit(limit: usize) -> Self {
        ByteQueue {
            buffer: Vec::new(),
            read_pos: 0,
            limit: Some(limit),
        }
    }

    /// Reserve `n` writable bytes at the tail and advance the write offset.
    ///
    /// The returned slice is zero filled; the caller overwrites it.
    pub fn reserve(&mut self, n: usize) -> Result<&mut [u8]> {
        if let Some(limit) = self.limit {
            if self.size() + n > limit {
                return Err(Error::no_mem(format!(
                    "byte queue limit {} exceeded by {} bytes",
                    limit,
                    self.size() + n - limit
                )));
            }
        }

        if self.read_pos > 0 && self.read_pos >= self.buffer.len() / 2 {
            self.compact();
        }

        self.buffer
            .try_reserve(n)
            .map_err(|e| Error::no_mem(format!("failed to grow byte queue by {}: {}", n, e)))?;

        let start = self.buffer.len();
        self.buffer.resize(start + n, 0);
        Ok(&mut self.buffer[start..])
    }

    /// Bytes written since the last pop
    pub fn size(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Current allocation size
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Consume up to `n` bytes from the front, returning how many were consumed
    pub fn pop(&mut self, n: usize) -> usize {
        let consumed = n.min(self.size());
        self.read_pos += consumed;
        if self.read_pos == self.buffer.len() {
            self.buffer.clear();
            self.read_pos = 0;
        }
        consumed
    }

    /// Discard everything staged
    pub fn pop_all(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }

    /// Staged bytes, oldest first
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[self.read_pos..]
    }

    /// Copy out the staged bytes and reset the queue
    pub fn take_all(&mut self) -> Vec<u8> {
        let bytes = self.as_slice().to_vec();
        self.pop_all();
        bytes
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.reserve(1)?[0] = value;
        Ok(())
    }

    pub fn put_u16_be(&mut self, value: u16) -> Result<()> {
        BigEndian::write_u16(self.reserve(2)?, value);
        Ok(())
    }

    pub fn put_u24_be(&mut self, value: u32) -> Result<()> {
        BigEndian::write_u24(self.reserve(3)?, value & 0x00FF_FFFF);
        Ok(())
    }

    pub fn put_u32_be(&mut self, value: u32) -> Result<()> {
        BigEndian::write_u32(self.reserve(4)?, value);
        Ok(())
    }

    pub fn put_u32_le(&mut self, value: u32) -> Result<()> {
        LittleEndian::write_u32(self.reserve(4)?, value);
        Ok(())
    }

    pub fn put_f64_be(&mut self, value: f64) -> Result<()> {
        BigEndian::write_f64(self.reserve(8)?, value);
        Ok(())
    }

    pub fn put_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Overwrite a big-endian u32 at `offset` bytes from the front of the staged data
    pub fn patch_u32_be(&mut self, offset: usize, value: u32) -> Result<()> {
        if offset + 4 > self.size() {
            return Err(Error::invalid_arg(format!(
                "patch offset {} outside staged {} bytes",
                offset,
                self.size()
            )));
        }
        let start = self.read_pos + offset;
        BigEndian::write_u32(&mut self.buffer[start..start + 4], value);
        Ok(())
    }

    fn compact(&mut self) {
        let len = self.buffer.len();
        self.buffer.copy_within(self.read_pos..len, 0);
        self.buffer.truncate(len - self.read_pos);
        self.read_pos = 0;
    }
}

/// Read cursor over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, cursor: 0 }
    }

    /// Get current cursor position
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Get remaining bytes from current position
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.cursor)
    }

    /// Check if reader has at least n bytes remaining
    pub fn has_remaining(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    /// Unread tail of the slice
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.cursor..]
    }

    /// Borrow the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if !self.has_remaining(len) {
            return Err(Error::bad_data(format!(
                "need {} bytes at offset {}, only {} left",
                len,
                self.cursor,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(bytes)
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.data
            .get(self.cursor)
            .copied()
            .ok_or_else(|| Error::bad_data("unexpected end of data"))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u24_be(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u24(self.read_bytes(3)?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_f64_be(&mut self) -> Result<f64> {
        Ok(BigEndian::read_f64(self.read_bytes(8)?))
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }
}
