use bytes::Bytes;
use crate::{ByteQueue, ByteReader, Error, Result};

/// FLV sound format ids
pub const SOUND_FORMAT_MP3: u8 = 2;
pub const SOUND_FORMAT_PCM_LE: u8 = 3;
pub const SOUND_FORMAT_G711A: u8 = 7;
pub const SOUND_FORMAT_G711U: u8 = 8;
pub const SOUND_FORMAT_AAC: u8 = 10;

const AAC_SEQUENCE_HEADER: u8 = 0;
const AAC_RAW: u8 = 1;

/// MPEG-4 sampling frequency table, indexed by sampling frequency index
const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
    Mp3,
    /// Linear PCM, little endian
    Pcm,
    G711A,
    G711U,
}

impl AudioCodec {
    pub fn sound_format(&self) -> u8 {
        match self {
            AudioCodec::Aac => SOUND_FORMAT_AAC,
            AudioCodec::Mp3 => SOUND_FORMAT_MP3,
            AudioCodec::Pcm => SOUND_FORMAT_PCM_LE,
            AudioCodec::G711A => SOUND_FORMAT_G711A,
            AudioCodec::G711U => SOUND_FORMAT_G711U,
        }
    }

    /// Parse from sound format field; formats we do not carry yield `None`
    pub fn from_sound_format(format: u8) -> Option<Self> {
        match format {
            SOUND_FORMAT_AAC => Some(AudioCodec::Aac),
            SOUND_FORMAT_MP3 => Some(AudioCodec::Mp3),
            SOUND_FORMAT_PCM_LE => Some(AudioCodec::Pcm),
            SOUND_FORMAT_G711A => Some(AudioCodec::G711A),
            SOUND_FORMAT_G711U => Some(AudioCodec::G711U),
            _ => None,
        }
    }

    /// Get codec name
    pub fn name(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "AAC",
            AudioCodec::Mp3 => "MP3",
            AudioCodec::Pcm => "PCM",
            AudioCodec::G711A => "G.711-A",
            AudioCodec::G711U => "G.711-U",
        }
    }
}

/// Audio stream description, fixed before a session leaves IDLE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInfo {
    pub codec: AudioCodec,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub sample_rate: u32,
    /// AAC AudioSpecificConfig; derived when absent
    pub codec_spec_info: Option<Vec<u8>>,
}

impl AudioInfo {
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u8) -> Self {
        AudioInfo {
            codec,
            channels,
            bits_per_sample: 16,
            sample_rate,
            codec_spec_info: None,
        }
    }

    pub fn with_spec_info(mut self, spec: impl Into<Vec<u8>>) -> Self {
        self.codec_spec_info = Some(spec.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > 2 {
            return Err(Error::invalid_arg(format!("Unsupported channel count {}", self.channels)));
        }
        if self.sample_rate == 0 {
            return Err(Error::invalid_arg("Sample rate must be non-zero"));
        }
        if self.codec == AudioCodec::Pcm && self.bits_per_sample != 8 && self.bits_per_sample != 16 {
            return Err(Error::invalid_arg(format!(
                "PCM must be 8 or 16 bits, got {}",
                self.bits_per_sample
            )));
        }
        Ok(())
    }

    /// 1-byte FLV audio tag header
    pub fn tag_header(&self) -> u8 {
        let (rate, size, stereo) = match self.codec {
            // AAC always signals 44 kHz, 16 bit, stereo
            AudioCodec::Aac => (3, 1, 1),
            _ => (
                rate_bits(self.sample_rate),
                (self.bits_per_sample > 8) as u8,
                (self.channels > 1) as u8,
            ),
        };
        (self.codec.sound_format() << 4) | (rate << 2) | (size << 1) | stereo
    }

    /// AudioSpecificConfig to send, derived as AAC-LC when none was supplied
    pub fn audio_specific_config(&self) -> Result<Vec<u8>> {
        match &self.codec_spec_info {
            Some(spec) if !spec.is_empty() => Ok(spec.clone()),
            _ => derive_aac_config(self.sample_rate, self.channels),
        }
    }
}

fn rate_bits(sample_rate: u32) -> u8 {
    match sample_rate {
        0..=5512 => 0,
        5513..=11025 => 1,
        11026..=22050 => 2,
        _ => 3,
    }
}

/// One audio frame on the public packet API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub pts: u32,
    pub data: Bytes,
    pub eos: bool,
}

impl AudioFrame {
    pub fn new(pts: u32, data: impl Into<Bytes>) -> Self {
        AudioFrame {
            pts,
            data: data.into(),
            eos: false,
        }
    }
}

/// Build an AAC-LC AudioSpecificConfig from rate and channel count
pub fn derive_aac_config(sample_rate: u32, channels: u8) -> Result<Vec<u8>> {
    let index = AAC_SAMPLE_RATES
        .iter()
        .position(|r| *r == sample_rate)
        .ok_or_else(|| Error::invalid_arg(format!("No AAC sampling index for {} Hz", sample_rate)))?
        as u16;
    let object_type: u16 = 2; // AAC-LC
    let config = (object_type << 11) | (index << 7) | ((channels as u16 & 0x0F) << 3);
    Ok(config.to_be_bytes().to_vec())
}

/// Sample rate and channel count carried by an AudioSpecificConfig
pub fn parse_aac_config(data: &[u8]) -> Result<(u32, u8)> {
    if data.len() < 2 {
        return Err(Error::bad_data("AAC config too short"));
    }
    let index = (((data[0] & 0x07) << 1) | (data[1] >> 7)) as usize;
    let channels = (data[1] >> 3) & 0x0F;
    let rate = AAC_SAMPLE_RATES
        .get(index)
        .copied()
        .ok_or_else(|| Error::bad_data(format!("Invalid AAC sampling index {}", index)))?;
    Ok((rate, channels))
}

/// Drop an ADTS header if the frame carries one
pub fn strip_adts(data: &[u8]) -> &[u8] {
    if data.len() > 7 && data[0] == 0xFF && (data[1] & 0xF0) == 0xF0 {
        let protection_absent = data[1] & 0x01 == 1;
        let header_len = if protection_absent { 7 } else { 9 };
        if data.len() > header_len {
            return &data[header_len..];
        }
    }
    data
}

/// AAC sequence header tag, `None` for codecs without one
pub fn encode_audio_sequence_header(info: &AudioInfo) -> Result<Option<Vec<u8>>> {
    if info.codec != AudioCodec::Aac {
        return Ok(None);
    }
    let config = info.audio_specific_config()?;
    let mut queue = ByteQueue::with_capacity(2 + config.len());
    queue.put_u8(info.tag_header())?;
    queue.put_u8(AAC_SEQUENCE_HEADER)?;
    queue.put_bytes(&config)?;
    Ok(Some(queue.take_all()))
}

/// Audio tag for one coded frame
pub fn encode_audio_frame(info: &AudioInfo, data: &[u8]) -> Result<Vec<u8>> {
    let mut queue = ByteQueue::with_capacity(2 + data.len());
    queue.put_u8(info.tag_header())?;
    if info.codec == AudioCodec::Aac {
        queue.put_u8(AAC_RAW)?;
        queue.put_bytes(strip_adts(data))?;
    } else {
        queue.put_bytes(data)?;
    }
    Ok(queue.take_all())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPacket<'a> {
    /// AAC AudioSpecificConfig
    SequenceHeader(&'a [u8]),
    /// Coded audio
    Raw(&'a [u8]),
}

/// Parsed audio message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTag<'a> {
    pub sound_format: u8,
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub channels: u8,
    pub packet: AudioPacket<'a>,
}

impl<'a> AudioTag<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(payload);
        let header = reader
            .read_u8()
            .map_err(|_| Error::bad_data("Empty audio message"))?;

        let sound_format = header >> 4;
        let sample_rate = match (header >> 2) & 0x03 {
            0 => 5512,
            1 => 11025,
            2 => 22050,
            _ => 44100,
        };
        let bits_per_sample = if header & 0x02 != 0 { 16 } else { 8 };
        let channels = if header & 0x01 != 0 { 2 } else { 1 };

        let packet = if sound_format == SOUND_FORMAT_AAC {
            match reader.read_u8()? {
                AAC_SEQUENCE_HEADER => AudioPacket::SequenceHeader(reader.rest()),
                _ => AudioPacket::Raw(reader.rest()),
            }
        } else {
            AudioPacket::Raw(reader.rest())
        };

        Ok(AudioTag {
            sound_format,
            sample_rate,
            bits_per_sample,
            channels,
            packet,
        })
    }

    pub fn codec(&self) -> Option<AudioCodec> {
        AudioCodec::from_sound_format(self.sound_format)
    }

    pub fn is_sequence_header(&self) -> bool {
        matches!(self.packet, AudioPacket::SequenceHeader(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_aac_config() {
        // 44.1 kHz stereo AAC-LC is the classic 0x12 0x10
        assert_eq!(derive_aac_config(44100, 2).unwrap(), vec![0x12, 0x10]);
        assert_eq!(parse_aac_config(&[0x12, 0x10]).unwrap(), (44100, 2));
        assert!(derive_aac_config(12345, 2).is_err());
    }

    #[test]
    fn test_aac_tags() {
        let info = AudioInfo::new(AudioCodec::Aac, 48000, 1);
        let seq = encode_audio_sequence_header(&info).unwrap().unwrap();
        assert_eq!(seq[0], 0xAF);
        let tag = AudioTag::parse(&seq).unwrap();
        assert!(tag.is_sequence_header());
        assert_eq!(tag.packet, AudioPacket::SequenceHeader(&derive_aac_config(48000, 1).unwrap()));

        let frame = encode_audio_frame(&info, &[1, 2, 3]).unwrap();
        assert_eq!(frame, vec![0xAF, 0x01, 1, 2, 3]);
        assert_eq!(AudioTag::parse(&frame).unwrap().packet, AudioPacket::Raw(&[1, 2, 3]));
    }

    #[test]
    fn test_adts_is_stripped() {
        let info = AudioInfo::new(AudioCodec::Aac, 44100, 2);
        let mut adts = vec![0xFF, 0xF1, 0x50, 0x80, 0x01, 0x7F, 0xFC];
        adts.extend_from_slice(&[9, 9]);
        assert_eq!(encode_audio_frame(&info, &adts).unwrap(), vec![0xAF, 0x01, 9, 9]);
    }

    #[test]
    fn test_g711_and_pcm_headers() {
        let alaw = AudioInfo::new(AudioCodec::G711A, 8000, 1);
        assert_eq!(encode_audio_sequence_header(&alaw).unwrap(), None);
        let frame = encode_audio_frame(&alaw, &[0x55]).unwrap();
        let tag = AudioTag::parse(&frame).unwrap();
        assert_eq!(tag.codec(), Some(AudioCodec::G711A));
        assert_eq!(tag.channels, 1);
        assert_eq!(tag.packet, AudioPacket::Raw(&[0x55]));

        let pcm = AudioInfo::new(AudioCodec::Pcm, 44100, 2);
        assert_eq!(pcm.tag_header(), 0x3F);
    }

    #[test]
    fn test_validate() {
        assert!(AudioInfo::new(AudioCodec::Aac, 44100, 3).validate().is_err());
        assert!(AudioInfo::new(AudioCodec::Mp3, 0, 2).validate().is_err());
        assert!(AudioInfo::new(AudioCodec::Mp3, 44100, 2).validate().is_ok());
    }

    #[test]
    fn test_empty_payload() {
        assert!(matches!(AudioTag::parse(&[]), Err(Error::BadData(_))));
    }
}
