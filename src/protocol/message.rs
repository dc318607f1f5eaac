use bytes::Bytes;
use crate::protocol::constants::*;

/// Message header as cached per chunk stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub timestamp: u32,
    pub length: u32,
    pub message_type: u8,
    pub stream_id: u32,
}

/// A complete RTMP message, before chunking or after reassembly
#[derive(Debug, Clone, PartialEq)]
pub struct RtmpMessage {
    /// Chunk stream id the message travels on
    pub channel: u32,
    pub message_type: u8,
    pub timestamp: u32,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl RtmpMessage {
    /// Create new message
    pub fn new(
        channel: u32,
        message_type: u8,
        timestamp: u32,
        stream_id: u32,
        payload: impl Into<Bytes>,
    ) -> Self {
        RtmpMessage {
            channel,
            message_type,
            timestamp,
            stream_id,
            payload: payload.into(),
        }
    }

    /// AMF0 command on the connection or on a stream
    pub fn command(stream_id: u32, payload: impl Into<Bytes>) -> Self {
        let channel = if stream_id == 0 {
            CHUNK_STREAM_COMMAND
        } else {
            CHUNK_STREAM_STREAM_COMMAND
        };
        RtmpMessage::new(channel, MSG_TYPE_COMMAND_AMF0, 0, stream_id, payload)
    }

    /// AMF0 data message (metadata)
    pub fn data(stream_id: u32, timestamp: u32, payload: impl Into<Bytes>) -> Self {
        RtmpMessage::new(CHUNK_STREAM_DATA, MSG_TYPE_DATA_AMF0, timestamp, stream_id, payload)
    }

    pub fn audio(stream_id: u32, timestamp: u32, payload: impl Into<Bytes>) -> Self {
        RtmpMessage::new(CHUNK_STREAM_AUDIO, MSG_TYPE_AUDIO, timestamp, stream_id, payload)
    }

    pub fn video(stream_id: u32, timestamp: u32, payload: impl Into<Bytes>) -> Self {
        RtmpMessage::new(CHUNK_STREAM_VIDEO, MSG_TYPE_VIDEO, timestamp, stream_id, payload)
    }

    /// Protocol control or user control message
    pub fn control(message_type: u8, payload: impl Into<Bytes>) -> Self {
        RtmpMessage::new(CHUNK_STREAM_PROTOCOL, message_type, 0, 0, payload)
    }

    /// Application command understood by this crate's server and clients
    pub fn custom_command(stream_id: u32, payload: impl Into<Bytes>) -> Self {
        RtmpMessage::new(CHUNK_STREAM_COMMAND, MSG_TYPE_CUSTOM_COMMAND, 0, stream_id, payload)
    }

    /// Header view used by the chunk layer
    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            timestamp: self.timestamp,
            length: self.payload.len() as u32,
            message_type: self.message_type,
            stream_id: self.stream_id,
        }
    }

    /// Same message readdressed to another stream id
    pub fn with_stream_id(&self, stream_id: u32) -> Self {
        RtmpMessage {
            stream_id,
            ..self.clone()
        }
    }

    /// Check if this is an audio message
    pub fn is_audio(&self) -> bool {
        self.message_type == MSG_TYPE_AUDIO
    }

    /// Check if this is a video message
    pub fn is_video(&self) -> bool {
        self.message_type == MSG_TYPE_VIDEO
    }

    /// Check if this is a command message
    pub fn is_command(&self) -> bool {
        self.message_type == MSG_TYPE_COMMAND_AMF0 || self.message_type == MSG_TYPE_COMMAND_AMF3
    }

    /// Check if this is a data message
    pub fn is_data(&self) -> bool {
        self.message_type == MSG_TYPE_DATA_AMF0 || self.message_type == MSG_TYPE_DATA_AMF3
    }

    /// Check if this is a protocol or user control message
    pub fn is_control(&self) -> bool {
        matches!(
            self.message_type,
            MSG_TYPE_SET_CHUNK_SIZE
                | MSG_TYPE_ABORT
                | MSG_TYPE_ACK
                | MSG_TYPE_USER_CONTROL
                | MSG_TYPE_WINDOW_ACK
                | MSG_TYPE_SET_PEER_BW
        )
    }

    pub fn is_custom_command(&self) -> bool {
        self.message_type == MSG_TYPE_CUSTOM_COMMAND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_pick_channels() {
        let msg = RtmpMessage::audio(1, 40, vec![0xAF, 0x01]);
        assert_eq!(msg.channel, CHUNK_STREAM_AUDIO);
        assert!(msg.is_audio());
        assert_eq!(msg.header().length, 2);

        assert_eq!(RtmpMessage::command(0, vec![]).channel, CHUNK_STREAM_COMMAND);
        assert_eq!(RtmpMessage::command(1, vec![]).channel, CHUNK_STREAM_STREAM_COMMAND);
        assert!(RtmpMessage::control(MSG_TYPE_USER_CONTROL, vec![0; 6]).is_control());
    }

    #[test]
    fn test_with_stream_id() {
        let msg = RtmpMessage::video(1, 0, vec![0x17]);
        let moved = msg.with_stream_id(3);
        assert_eq!(moved.stream_id, 3);
        assert_eq!(moved.payload, msg.payload);
    }
}
