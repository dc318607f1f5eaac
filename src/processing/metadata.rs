use crate::amf::AmfValue;
use crate::processing::audio::AudioInfo;
use crate::processing::video::VideoInfo;
use crate::protocol::{encode_with, RtmpData, ON_METADATA, SET_DATA_FRAME};
use crate::Result;

/// Stream properties announced through onMetaData
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMetadata {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub framerate: Option<f64>,
    pub video_codec_id: Option<f64>,
    pub audio_codec_id: Option<f64>,
    pub audio_sample_rate: Option<f64>,
    pub audio_sample_size: Option<f64>,
    pub stereo: Option<bool>,
}

impl StreamMetadata {
    pub fn from_info(audio: Option<&AudioInfo>, video: Option<&VideoInfo>) -> Self {
        let mut meta = StreamMetadata::default();
        if let Some(video) = video {
            meta.width = Some(video.width as f64);
            meta.height = Some(video.height as f64);
            meta.framerate = Some(video.fps as f64);
            meta.video_codec_id = Some(video.codec.codec_id() as f64);
        }
        if let Some(audio) = audio {
            meta.audio_codec_id = Some(audio.codec.sound_format() as f64);
            meta.audio_sample_rate = Some(audio.sample_rate as f64);
            meta.audio_sample_size = Some(audio.bits_per_sample as f64);
            meta.stereo = Some(audio.channels > 1);
        }
        meta
    }

    /// Extract from a parsed onMetaData message; `None` for other handlers
    pub fn from_data(data: &RtmpData<'_>) -> Option<Self> {
        let obj = data.metadata()?;
        let number = |key: &str| obj.get(key).and_then(|v| v.as_number());
        Some(StreamMetadata {
            width: number("width"),
            height: number("height"),
            framerate: number("framerate"),
            video_codec_id: number("videocodecid"),
            audio_codec_id: number("audiocodecid"),
            audio_sample_rate: number("audiosamplerate"),
            audio_sample_size: number("audiosamplesize"),
            stereo: obj.get("stereo").and_then(|v| v.as_bool()),
        })
    }

    pub fn has_video(&self) -> bool {
        self.video_codec_id.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec_id.is_some()
    }

    fn pairs(&self) -> Vec<(&'static [u8], AmfValue<'static>)> {
        let mut pairs = Vec::new();
        let numbers: [(&'static [u8], Option<f64>); 7] = [
            (b"width", self.width),
            (b"height", self.height),
            (b"framerate", self.framerate),
            (b"videocodecid", self.video_codec_id),
            (b"audiocodecid", self.audio_codec_id),
            (b"audiosamplerate", self.audio_sample_rate),
            (b"audiosamplesize", self.audio_sample_size),
        ];
        for (key, value) in numbers {
            if let Some(n) = value {
                pairs.push((key, AmfValue::Num(n)));
            }
        }
        if let Some(stereo) = self.stereo {
            pairs.push((b"stereo".as_slice(), AmfValue::Bool(stereo)));
        }
        pairs
    }

    /// `@setDataFrame onMetaData {…}` as a publisher sends it
    pub fn encode_set_data_frame(&self) -> Result<Vec<u8>> {
        let pairs = self.pairs();
        encode_with(|w| {
            w.add_string(SET_DATA_FRAME)?;
            w.add_string(ON_METADATA)?;
            w.add_value(&AmfValue::EcmaArray(pairs))
        })
    }

    /// Bare `onMetaData {…}` as a player receives it (and FLV script tags)
    pub fn encode_on_metadata(&self) -> Result<Vec<u8>> {
        let pairs = self.pairs();
        encode_with(|w| {
            w.add_string(ON_METADATA)?;
            w.add_value(&AmfValue::EcmaArray(pairs))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{AudioCodec, VideoCodec};

    #[test]
    fn test_metadata_from_info() {
        let audio = AudioInfo::new(AudioCodec::Aac, 44100, 2);
        let video = VideoInfo::new(VideoCodec::H264, 640, 480, 25);
        let meta = StreamMetadata::from_info(Some(&audio), Some(&video));

        let bytes = meta.encode_set_data_frame().unwrap();
        let data = RtmpData::parse(&bytes).unwrap();
        let parsed = StreamMetadata::from_data(&data).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(parsed.video_codec_id, Some(7.0));
        assert_eq!(parsed.audio_codec_id, Some(10.0));
        assert_eq!(parsed.stereo, Some(true));
    }

    #[test]
    fn test_audio_only() {
        let audio = AudioInfo::new(AudioCodec::G711U, 8000, 1);
        let meta = StreamMetadata::from_info(Some(&audio), None);
        assert!(meta.has_audio());
        assert!(!meta.has_video());

        let bytes = meta.encode_on_metadata().unwrap();
        let data = RtmpData::parse(&bytes).unwrap();
        let obj = data.metadata().unwrap();
        assert!(obj.get("width").is_none());
        assert_eq!(obj.get("audiocodecid").and_then(|v| v.as_number()), Some(8.0));
    }

    #[test]
    fn test_other_handler_is_not_metadata() {
        let bytes = encode_with(|w| w.add_string("onCuePoint")).unwrap();
        let data = RtmpData::parse(&bytes).unwrap();
        assert!(StreamMetadata::from_data(&data).is_none());
    }
}
