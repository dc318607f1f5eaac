use crate::processing::{is_video_sequence_header, AudioTag};
use crate::protocol::constants::*;
use crate::protocol::RtmpMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Protocol and user control messages
    Control,

    /// Command (AMF0/AMF3)
    Command,

    /// Data (AMF0/AMF3)
    Data,

    Audio,

    Video,

    /// Application command between this crate's peers
    Custom,

    /// Unknown type
    Unknown(u8),
}

impl MessageType {
    /// Create from message type ID
    pub fn from_id(id: u8) -> Self {
        match id {
            MSG_TYPE_SET_CHUNK_SIZE
            | MSG_TYPE_ABORT
            | MSG_TYPE_ACK
            | MSG_TYPE_USER_CONTROL
            | MSG_TYPE_WINDOW_ACK
            | MSG_TYPE_SET_PEER_BW => MessageType::Control,
            MSG_TYPE_AUDIO => MessageType::Audio,
            MSG_TYPE_VIDEO => MessageType::Video,
            MSG_TYPE_COMMAND_AMF0 | MSG_TYPE_COMMAND_AMF3 => MessageType::Command,
            MSG_TYPE_DATA_AMF0 | MSG_TYPE_DATA_AMF3 => MessageType::Data,
            MSG_TYPE_CUSTOM_COMMAND => MessageType::Custom,
            _ => MessageType::Unknown(id),
        }
    }

    /// Check if this is a media message (audio/video)
    pub fn is_media(&self) -> bool {
        matches!(self, MessageType::Audio | MessageType::Video)
    }

    /// Queueing priority of the type alone
    pub fn priority(&self) -> Priority {
        match self {
            MessageType::Control => Priority::Control,
            MessageType::Command | MessageType::Custom => Priority::Command,
            MessageType::Data | MessageType::Unknown(_) => Priority::Data,
            MessageType::Audio => Priority::Audio,
            MessageType::Video => Priority::Video,
        }
    }
}

/// Output queue priority, lowest first.
///
/// Only `Video` and `Audio` may be evicted; only `Command` and `Control`
/// may exceed the queue limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Video,
    Audio,
    Data,
    Command,
    Control,
}

impl Priority {
    /// Priority of a concrete message; sequence headers are never dropped
    pub fn of(message: &RtmpMessage) -> Self {
        match MessageType::from_id(message.message_type) {
            MessageType::Video if is_video_sequence_header(&message.payload) => Priority::Data,
            MessageType::Audio
                if AudioTag::parse(&message.payload).is_ok_and(|tag| tag.is_sequence_header()) =>
            {
                Priority::Data
            }
            other => other.priority(),
        }
    }

    pub fn is_droppable(&self) -> bool {
        matches!(self, Priority::Video | Priority::Audio)
    }

    /// Protocol traffic is queued even past the limit
    pub fn may_exceed_limit(&self) -> bool {
        matches!(self, Priority::Command | Priority::Control)
    }
}
