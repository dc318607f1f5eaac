use crate::handshake::c0c1::{encode_block, C0C1, HANDSHAKE_SIZE, RTMP_VERSION};
use crate::utils::{current_timestamp, random_payload};
use crate::{ByteQueue, ByteReader, Error, Result};

/// Server reply (S0 + S1 + S2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S0S1S2 {
    /// RTMP version (S0)
    pub version: u8,

    pub s1_timestamp: u32,
    pub s1_zero: u32,
    pub s1_random: Vec<u8>,

    /// Echo of C1 timestamp
    pub s2_timestamp: u32,

    /// Time the server read C1
    pub s2_timestamp2: u32,

    /// Echo of C1 random
    pub s2_random_echo: Vec<u8>,
}

impl S0S1S2 {
    /// Generate S0+S1+S2 response for C0+C1
    pub fn generate(c0c1: &C0C1) -> Result<Self> {
        if c0c1.version != RTMP_VERSION {
            return Err(Error::connect_fail(format!(
                "Unsupported client version: {}",
                c0c1.version
            )));
        }

        Ok(S0S1S2 {
            version: RTMP_VERSION,
            s1_timestamp: current_timestamp(),
            s1_zero: 0,
            s1_random: random_payload(HANDSHAKE_SIZE - 8),
            s2_timestamp: c0c1.timestamp,
            s2_timestamp2: current_timestamp(),
            s2_random_echo: c0c1.random_data.clone(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut queue = ByteQueue::with_capacity(1 + HANDSHAKE_SIZE * 2);
        queue.put_u8(self.version)?;
        queue.put_bytes(&encode_block(self.s1_timestamp, self.s1_zero, &self.s1_random)?)?;
        queue.put_bytes(&encode_block(
            self.s2_timestamp,
            self.s2_timestamp2,
            &self.s2_random_echo,
        )?)?;
        Ok(queue.take_all())
    }

    /// Parse S0+S1+S2 from bytes (client side)
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 1 + HANDSHAKE_SIZE * 2 {
            return Err(Error::connect_fail(format!(
                "S0+S1+S2 too short: {} bytes",
                data.len()
            )));
        }

        let version = data[0];
        if version != RTMP_VERSION {
            return Err(Error::connect_fail(format!(
                "Server answered with RTMP version {}",
                version
            )));
        }

        let mut reader = ByteReader::new(&data[1..1 + HANDSHAKE_SIZE * 2]);
        let s1_timestamp = reader.read_u32_be()?;
        let s1_zero = reader.read_u32_be()?;
        let s1_random = reader.read_bytes(HANDSHAKE_SIZE - 8)?.to_vec();
        let s2_timestamp = reader.read_u32_be()?;
        let s2_timestamp2 = reader.read_u32_be()?;
        let s2_random_echo = reader.read_bytes(HANDSHAKE_SIZE - 8)?.to_vec();

        Ok(S0S1S2 {
            version,
            s1_timestamp,
            s1_zero,
            s1_random,
            s2_timestamp,
            s2_timestamp2,
            s2_random_echo,
        })
    }

    /// S2 must echo what the client sent in C1
    pub fn validate(&self, c0c1: &C0C1) -> Result<()> {
        if self.s2_random_echo != c0c1.random_data {
            return Err(Error::connect_fail("S2 does not echo C1"));
        }
        Ok(())
    }
}

/// Client acknowledgement (C2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct C2 {
    pub timestamp: u32,
    pub timestamp2: u32,
    pub random_echo: Vec<u8>,
}

impl C2 {
    /// Create C2 as an echo of S1
    pub fn create_from_s1(s0s1s2: &S0S1S2) -> Self {
        C2 {
            timestamp: s0s1s2.s1_timestamp,
            timestamp2: current_timestamp(),
            random_echo: s0s1s2.s1_random.clone(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HANDSHAKE_SIZE {
            return Err(Error::connect_fail(format!("C2 too short: {} bytes", data.len())));
        }

        let mut reader = ByteReader::new(&data[..HANDSHAKE_SIZE]);
        Ok(C2 {
            timestamp: reader.read_u32_be()?,
            timestamp2: reader.read_u32_be()?,
            random_echo: reader.rest().to_vec(),
        })
    }

    /// C2 must echo S1
    pub fn validate(&self, s0s1s2: &S0S1S2) -> Result<()> {
        if self.random_echo != s0s1s2.s1_random {
            return Err(Error::connect_fail("C2 does not echo S1"));
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_block(self.timestamp, self.timestamp2, &self.random_echo)
    }
}
