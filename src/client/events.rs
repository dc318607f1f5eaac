use std::sync::Arc;
use crate::processing::{AudioFrame, AudioInfo, VideoFrame, VideoInfo};

/// Session events delivered through `event_cb`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtmpEvent {
    /// The server ended the session outside of a local `close()`
    ClosedByServer,
}

/// Codecs discovered on a played stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStreamInfo {
    pub audio: Option<AudioInfo>,
    pub video: Option<VideoInfo>,
}

/// Decoded frame handed to `data_cb`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFrame {
    /// Raw AAC, MP3, PCM or G711 payload
    Audio(AudioFrame),
    /// Annex-B H264 or a raw MJPEG picture
    Video(VideoFrame),
}

pub type EventCallback = Arc<dyn Fn(RtmpEvent) + Send + Sync>;

/// Receives the payload of custom command messages
pub type CommandCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

pub type StreamCallback = Arc<dyn Fn(&SourceStreamInfo) + Send + Sync>;

pub type DataCallback = Arc<dyn Fn(&SourceFrame) + Send + Sync>;
