use crate::utils::{current_timestamp, random_payload};
use crate::{ByteQueue, ByteReader, Error, Result};

/// RTMP version
pub const RTMP_VERSION: u8 = 3;

/// Handshake packet size (C1/S1/C2/S2)
pub const HANDSHAKE_SIZE: usize = 1536;

/// Client hello (C0 + C1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct C0C1 {
    /// RTMP version (C0)
    pub version: u8,

    /// Timestamp (C1)
    pub timestamp: u32,

    /// Zero field (C1); some clients put their version here
    pub zero: u32,

    /// Random data (C1)
    pub random_data: Vec<u8>,
}

impl C0C1 {
    /// Parse C0+C1 from exactly 1537 bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 1 + HANDSHAKE_SIZE {
            return Err(Error::connect_fail(format!(
                "C0+C1 too short: {} bytes, expected {}",
                data.len(),
                1 + HANDSHAKE_SIZE
            )));
        }

        let version = data[0];
        if version != RTMP_VERSION {
            return Err(Error::connect_fail(format!(
                "Unsupported RTMP version: {}, expected {}",
                version, RTMP_VERSION
            )));
        }

        let mut reader = ByteReader::new(&data[1..1 + HANDSHAKE_SIZE]);
        Ok(C0C1 {
            version,
            timestamp: reader.read_u32_be()?,
            zero: reader.read_u32_be()?,
            random_data: reader.rest().to_vec(),
        })
    }

    /// Create C0+C1 for client
    pub fn create_client() -> Self {
        C0C1 {
            version: RTMP_VERSION,
            timestamp: current_timestamp(),
            zero: 0,
            random_data: random_payload(HANDSHAKE_SIZE - 8),
        }
    }

    /// C1 alone, as S2 must echo it
    pub fn c1_bytes(&self) -> Result<Vec<u8>> {
        encode_block(self.timestamp, self.zero, &self.random_data)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut queue = ByteQueue::with_capacity(1 + HANDSHAKE_SIZE);
        queue.put_u8(self.version)?;
        queue.put_bytes(&self.c1_bytes()?)?;
        Ok(queue.take_all())
    }
}

/// One 1536-byte handshake block: time, second time/zero, random
pub(crate) fn encode_block(time: u32, time2: u32, random: &[u8]) -> Result<Vec<u8>> {
    if random.len() != HANDSHAKE_SIZE - 8 {
        return Err(Error::invalid_arg(format!(
            "handshake random block must be {} bytes, got {}",
            HANDSHAKE_SIZE - 8,
            random.len()
        )));
    }
    let mut queue = ByteQueue::with_capacity(HANDSHAKE_SIZE);
    queue.put_u32_be(time)?;
    queue.put_u32_be(time2)?;
    queue.put_bytes(random)?;
    Ok(queue.take_all())
}
