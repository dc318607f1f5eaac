use crate::{ByteQueue, ByteReader, Error, Result};

pub const NALU_TYPE_IDR: u8 = 5;
pub const NALU_TYPE_SPS: u8 = 7;
pub const NALU_TYPE_PPS: u8 = 8;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// NAL unit type of the first header byte
pub fn nalu_type(nalu: &[u8]) -> Option<u8> {
    nalu.first().map(|b| b & 0x1F)
}

/// Split an Annex-B byte stream into NAL units (start codes removed).
///
/// Input without any start code is treated as a single NAL unit.
pub fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    let mut nalus = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;

    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if let Some(s) = start {
                // A 4-byte start code leaves one zero behind
                let mut end = i;
                if end > s && data[end - 1] == 0 {
                    end -= 1;
                }
                if end > s {
                    nalus.push(&data[s..end]);
                }
            }
            i += 3;
            start = Some(i);
        } else {
            i += 1;
        }
    }

    match start {
        Some(s) if s < data.len() => nalus.push(&data[s..]),
        Some(_) => {}
        None if !data.is_empty() => nalus.push(data),
        None => {}
    }
    nalus
}

/// Annex-B to 4-byte length-prefixed NAL units
pub fn annexb_to_avcc(data: &[u8]) -> Result<Vec<u8>> {
    let mut queue = ByteQueue::with_capacity(data.len() + 16);
    for nalu in split_annexb(data) {
        queue.put_u32_be(nalu.len() as u32)?;
        queue.put_bytes(nalu)?;
    }
    Ok(queue.take_all())
}

/// Length-prefixed NAL units back to Annex-B with 4-byte start codes
pub fn avcc_to_annexb(data: &[u8]) -> Result<Vec<u8>> {
    let mut queue = ByteQueue::with_capacity(data.len() + 16);
    for nalu in split_avcc(data)? {
        queue.put_bytes(&START_CODE)?;
        queue.put_bytes(nalu)?;
    }
    Ok(queue.take_all())
}

/// Split 4-byte length-prefixed NAL units
pub fn split_avcc(data: &[u8]) -> Result<Vec<&[u8]>> {
    let mut reader = ByteReader::new(data);
    let mut nalus = Vec::new();
    while reader.has_remaining(1) {
        let len = reader.read_u32_be()? as usize;
        nalus.push(reader.read_bytes(len)?);
    }
    Ok(nalus)
}

/// Whether an Annex-B access unit carries an IDR slice
pub fn contains_idr(data: &[u8]) -> bool {
    split_annexb(data)
        .iter()
        .any(|nalu| nalu_type(nalu) == Some(NALU_TYPE_IDR))
}

/// AVCDecoderConfigurationRecord (ISO 14496-15)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfig {
    pub profile: u8,
    pub profile_compat: u8,
    pub level: u8,
    pub sps: Vec<Vec<u8>>,
    pub pps: Vec<Vec<u8>>,
}

impl AvcDecoderConfig {
    /// Collect SPS and PPS from Annex-B bytes; other NAL units are ignored
    pub fn from_annexb(data: &[u8]) -> Result<Self> {
        let mut sps = Vec::new();
        let mut pps = Vec::new();
        for nalu in split_annexb(data) {
            match nalu_type(nalu) {
                Some(NALU_TYPE_SPS) => sps.push(nalu.to_vec()),
                Some(NALU_TYPE_PPS) => pps.push(nalu.to_vec()),
                _ => {}
            }
        }

        let first = sps
            .first()
            .ok_or_else(|| Error::invalid_arg("No SPS in H264 codec data"))?;
        if first.len() < 4 {
            return Err(Error::invalid_arg("SPS too short"));
        }
        if pps.is_empty() {
            return Err(Error::invalid_arg("No PPS in H264 codec data"));
        }

        Ok(AvcDecoderConfig {
            profile: first[1],
            profile_compat: first[2],
            level: first[3],
            sps,
            pps,
        })
    }

    /// Parse a configuration record
    pub fn parse(record: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(record);
        let version = reader.read_u8()?;
        if version != 1 {
            return Err(Error::bad_data(format!("Unknown AVC config version {}", version)));
        }
        let profile = reader.read_u8()?;
        let profile_compat = reader.read_u8()?;
        let level = reader.read_u8()?;
        let _length_size = reader.read_u8()?;

        let sps_count = reader.read_u8()? & 0x1F;
        let mut sps = Vec::with_capacity(sps_count as usize);
        for _ in 0..sps_count {
            let len = reader.read_u16_be()? as usize;
            sps.push(reader.read_bytes(len)?.to_vec());
        }

        let pps_count = reader.read_u8()?;
        let mut pps = Vec::with_capacity(pps_count as usize);
        for _ in 0..pps_count {
            let len = reader.read_u16_be()? as usize;
            pps.push(reader.read_bytes(len)?.to_vec());
        }

        Ok(AvcDecoderConfig {
            profile,
            profile_compat,
            level,
            sps,
            pps,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        // The record has five bits for the SPS count and a byte for PPS
        if self.sps.len() > 0x1F || self.pps.len() > 0xFF {
            return Err(Error::bad_data(format!(
                "{} SPS and {} PPS do not fit a decoder configuration record",
                self.sps.len(),
                self.pps.len()
            )));
        }

        let mut queue = ByteQueue::with_capacity(64);
        queue.put_u8(1)?;
        queue.put_u8(self.profile)?;
        queue.put_u8(self.profile_compat)?;
        queue.put_u8(self.level)?;
        queue.put_u8(0xFF)?; // 4-byte NALU lengths
        queue.put_u8(0xE0 | (self.sps.len() as u8 & 0x1F))?;
        for sps in &self.sps {
            queue.put_u16_be(param_len(sps)?)?;
            queue.put_bytes(sps)?;
        }
        queue.put_u8(self.pps.len() as u8)?;
        for pps in &self.pps {
            queue.put_u16_be(param_len(pps)?)?;
            queue.put_bytes(pps)?;
        }
        Ok(queue.take_all())
    }

    /// SPS then PPS as Annex-B with 4-byte start codes
    pub fn to_annexb(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for nalu in self.sps.iter().chain(self.pps.iter()) {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(nalu);
        }
        out
    }
}

fn param_len(nalu: &[u8]) -> Result<u16> {
    u16::try_from(nalu.len())
        .map_err(|_| Error::invalid_arg(format!("Parameter set of {} bytes", nalu.len())))
}
