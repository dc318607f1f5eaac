use bytes::Bytes;
use crate::processing::avc::{annexb_to_avcc, contains_idr, AvcDecoderConfig};
use crate::{ByteQueue, ByteReader, Error, Result};

/// FLV video codec ids
pub const CODEC_ID_H264: u8 = 7;
/// MJPEG has no FLV id; peers of this crate agree on 1
pub const CODEC_ID_MJPEG: u8 = 1;

const FRAME_TYPE_KEY: u8 = 1;
const FRAME_TYPE_INTER: u8 = 2;

const AVC_SEQUENCE_HEADER: u8 = 0;
const AVC_NALU: u8 = 1;
const AVC_END_OF_SEQUENCE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Mjpeg,
}

impl VideoCodec {
    pub fn codec_id(&self) -> u8 {
        match self {
            VideoCodec::H264 => CODEC_ID_H264,
            VideoCodec::Mjpeg => CODEC_ID_MJPEG,
        }
    }

    pub fn from_codec_id(id: u8) -> Option<Self> {
        match id {
            CODEC_ID_H264 => Some(VideoCodec::H264),
            CODEC_ID_MJPEG => Some(VideoCodec::Mjpeg),
            _ => None,
        }
    }

    /// Get codec name
    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H.264",
            VideoCodec::Mjpeg => "MJPEG",
        }
    }
}

/// Video stream description, fixed before a session leaves IDLE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub codec: VideoCodec,
    pub width: u16,
    pub height: u16,
    pub fps: u8,
    /// H264 SPS/PPS as Annex-B; taken from the first key frame when absent
    pub codec_spec_info: Option<Vec<u8>>,
}

impl VideoInfo {
    pub fn new(codec: VideoCodec, width: u16, height: u16, fps: u8) -> Self {
        VideoInfo {
            codec,
            width,
            height,
            fps,
            codec_spec_info: None,
        }
    }

    pub fn with_spec_info(mut self, spec: impl Into<Vec<u8>>) -> Self {
        self.codec_spec_info = Some(spec.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let (VideoCodec::H264, Some(spec)) = (self.codec, &self.codec_spec_info) {
            AvcDecoderConfig::from_annexb(spec)?;
        }
        Ok(())
    }
}

/// One video frame on the public packet API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub pts: u32,
    pub key_frame: bool,
    pub data: Bytes,
    pub eos: bool,
}

impl VideoFrame {
    pub fn new(pts: u32, key_frame: bool, data: impl Into<Bytes>) -> Self {
        VideoFrame {
            pts,
            key_frame,
            data: data.into(),
            eos: false,
        }
    }
}

/// Key flag to put on the wire: MJPEG frames are all key frames, H264
/// frames follow their NAL units when `fix_key_frame` is set.
pub fn resolve_key_frame(codec: VideoCodec, frame: &VideoFrame, fix_key_frame: bool) -> bool {
    match codec {
        VideoCodec::Mjpeg => true,
        VideoCodec::H264 if fix_key_frame => contains_idr(&frame.data),
        VideoCodec::H264 => frame.key_frame,
    }
}

/// AVC sequence header tag
pub fn encode_video_sequence_header(config: &AvcDecoderConfig) -> Result<Vec<u8>> {
    let record = config.encode()?;
    let mut queue = ByteQueue::with_capacity(5 + record.len());
    queue.put_u8((FRAME_TYPE_KEY << 4) | CODEC_ID_H264)?;
    queue.put_u8(AVC_SEQUENCE_HEADER)?;
    queue.put_u24_be(0)?;
    queue.put_bytes(&record)?;
    Ok(queue.take_all())
}

/// Video tag for one frame. H264 input is Annex-B.
pub fn encode_video_frame(codec: VideoCodec, key_frame: bool, data: &[u8]) -> Result<Vec<u8>> {
    let frame_type = if key_frame { FRAME_TYPE_KEY } else { FRAME_TYPE_INTER };
    let mut queue = ByteQueue::with_capacity(5 + data.len() + 16);
    queue.put_u8((frame_type << 4) | codec.codec_id())?;
    match codec {
        VideoCodec::H264 => {
            queue.put_u8(AVC_NALU)?;
            queue.put_u24_be(0)?; // composition time
            queue.put_bytes(&annexb_to_avcc(data)?)?;
        }
        VideoCodec::Mjpeg => queue.put_bytes(data)?,
    }
    Ok(queue.take_all())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPacket<'a> {
    /// AVCDecoderConfigurationRecord
    SequenceHeader(&'a [u8]),
    /// Length-prefixed NAL units
    Nalus { composition_time: i32, data: &'a [u8] },
    EndOfSequence,
    /// Codec without AVC packet framing
    Raw(&'a [u8]),
}

/// Parsed video message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTag<'a> {
    pub frame_type: u8,
    pub codec_id: u8,
    pub packet: VideoPacket<'a>,
}

impl<'a> VideoTag<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(payload);
        let header = reader
            .read_u8()
            .map_err(|_| Error::bad_data("Empty video message"))?;
        let frame_type = header >> 4;
        let codec_id = header & 0x0F;

        let packet = if codec_id == CODEC_ID_H264 {
            let packet_type = reader.read_u8()?;
            let cts = reader.read_u24_be()?;
            // Sign-extend the 24-bit composition time
            let composition_time = ((cts << 8) as i32) >> 8;
            match packet_type {
                AVC_SEQUENCE_HEADER => VideoPacket::SequenceHeader(reader.rest()),
                AVC_NALU => VideoPacket::Nalus {
                    composition_time,
                    data: reader.rest(),
                },
                AVC_END_OF_SEQUENCE => VideoPacket::EndOfSequence,
                other => {
                    return Err(Error::bad_data(format!("Unknown AVC packet type {}", other)));
                }
            }
        } else {
            VideoPacket::Raw(reader.rest())
        };

        Ok(VideoTag {
            frame_type,
            codec_id,
            packet,
        })
    }

    pub fn codec(&self) -> Option<VideoCodec> {
        VideoCodec::from_codec_id(self.codec_id)
    }

    pub fn is_key_frame(&self) -> bool {
        self.frame_type == FRAME_TYPE_KEY
    }

    pub fn is_sequence_header(&self) -> bool {
        matches!(self.packet, VideoPacket::SequenceHeader(_))
    }
}

/// Cheap check on a raw video payload, used by relays
pub fn is_key_frame_payload(payload: &[u8]) -> bool {
    payload.first().is_some_and(|b| b >> 4 == FRAME_TYPE_KEY)
}

/// Cheap check for AVC sequence headers on a raw video payload
pub fn is_video_sequence_header(payload: &[u8]) -> bool {
    payload.len() > 1 && payload[0] & 0x0F == CODEC_ID_H264 && payload[1] == AVC_SEQUENCE_HEADER
}
