use crate::protocol::constants::*;
use crate::protocol::RtmpMessage;
use crate::{ByteQueue, ByteReader, Error, Result};

/// Set Peer Bandwidth limit types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthLimit {
    Hard,
    Soft,
    Dynamic,
}

impl BandwidthLimit {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(BandwidthLimit::Hard),
            1 => Ok(BandwidthLimit::Soft),
            2 => Ok(BandwidthLimit::Dynamic),
            _ => Err(Error::bad_data(format!("Unknown bandwidth limit type {}", value))),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            BandwidthLimit::Hard => 0,
            BandwidthLimit::Soft => 1,
            BandwidthLimit::Dynamic => 2,
        }
    }
}

/// User control message events (message type 4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    StreamDry(u32),
    SetBufferLength { stream_id: u32, buffer_ms: u32 },
    StreamIsRecorded(u32),
    PingRequest(u32),
    PingResponse(u32),
    Unknown(u16),
}

/// Protocol control messages: fixed binary layouts, no AMF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    SetChunkSize(u32),
    Abort(u32),
    Acknowledgement(u32),
    WindowAckSize(u32),
    SetPeerBandwidth { size: u32, limit: BandwidthLimit },
    UserControl(UserControlEvent),
}

impl ControlMessage {
    /// Wrap into a message on the protocol control chunk stream
    pub fn encode(&self) -> Result<RtmpMessage> {
        let mut queue = ByteQueue::with_capacity(10);
        let message_type = match *self {
            ControlMessage::SetChunkSize(size) => {
                // Top bit must be zero
                queue.put_u32_be(size & 0x7FFF_FFFF)?;
                MSG_TYPE_SET_CHUNK_SIZE
            }
            ControlMessage::Abort(channel) => {
                queue.put_u32_be(channel)?;
                MSG_TYPE_ABORT
            }
            ControlMessage::Acknowledgement(sequence) => {
                queue.put_u32_be(sequence)?;
                MSG_TYPE_ACK
            }
            ControlMessage::WindowAckSize(size) => {
                queue.put_u32_be(size)?;
                MSG_TYPE_WINDOW_ACK
            }
            ControlMessage::SetPeerBandwidth { size, limit } => {
                queue.put_u32_be(size)?;
                queue.put_u8(limit.as_u8())?;
                MSG_TYPE_SET_PEER_BW
            }
            ControlMessage::UserControl(event) => {
                encode_user_control(&mut queue, event)?;
                MSG_TYPE_USER_CONTROL
            }
        };
        Ok(RtmpMessage::control(message_type, queue.take_all()))
    }

    /// Parse a control message; `None` when the type is not a control type
    pub fn parse(message: &RtmpMessage) -> Result<Option<Self>> {
        let mut reader = ByteReader::new(&message.payload);
        let control = match message.message_type {
            MSG_TYPE_SET_CHUNK_SIZE => ControlMessage::SetChunkSize(reader.read_u32_be()? & 0x7FFF_FFFF),
            MSG_TYPE_ABORT => ControlMessage::Abort(reader.read_u32_be()?),
            MSG_TYPE_ACK => ControlMessage::Acknowledgement(reader.read_u32_be()?),
            MSG_TYPE_WINDOW_ACK => ControlMessage::WindowAckSize(reader.read_u32_be()?),
            MSG_TYPE_SET_PEER_BW => {
                let size = reader.read_u32_be()?;
                // Some encoders omit the limit byte
                let limit = match reader.read_u8() {
                    Ok(value) => BandwidthLimit::from_u8(value)?,
                    Err(_) => BandwidthLimit::Dynamic,
                };
                ControlMessage::SetPeerBandwidth { size, limit }
            }
            MSG_TYPE_USER_CONTROL => ControlMessage::UserControl(parse_user_control(&mut reader)?),
            _ => return Ok(None),
        };
        Ok(Some(control))
    }
}

fn encode_user_control(queue: &mut ByteQueue, event: UserControlEvent) -> Result<()> {
    match event {
        UserControlEvent::StreamBegin(id) => {
            queue.put_u16_be(USER_CONTROL_STREAM_BEGIN)?;
            queue.put_u32_be(id)
        }
        UserControlEvent::StreamEof(id) => {
            queue.put_u16_be(USER_CONTROL_STREAM_EOF)?;
            queue.put_u32_be(id)
        }
        UserControlEvent::StreamDry(id) => {
            queue.put_u16_be(USER_CONTROL_STREAM_DRY)?;
            queue.put_u32_be(id)
        }
        UserControlEvent::SetBufferLength { stream_id, buffer_ms } => {
            queue.put_u16_be(USER_CONTROL_SET_BUFFER_LENGTH)?;
            queue.put_u32_be(stream_id)?;
            queue.put_u32_be(buffer_ms)
        }
        UserControlEvent::StreamIsRecorded(id) => {
            queue.put_u16_be(USER_CONTROL_STREAM_IS_RECORDED)?;
            queue.put_u32_be(id)
        }
        UserControlEvent::PingRequest(time) => {
            queue.put_u16_be(USER_CONTROL_PING_REQUEST)?;
            queue.put_u32_be(time)
        }
        UserControlEvent::PingResponse(time) => {
            queue.put_u16_be(USER_CONTROL_PING_RESPONSE)?;
            queue.put_u32_be(time)
        }
        UserControlEvent::Unknown(kind) => Err(Error::invalid_arg(format!(
            "cannot encode unknown user control event {}",
            kind
        ))),
    }
}

fn parse_user_control(reader: &mut ByteReader<'_>) -> Result<UserControlEvent> {
    let kind = reader.read_u16_be()?;
    let event = match kind {
        USER_CONTROL_STREAM_BEGIN => UserControlEvent::StreamBegin(reader.read_u32_be()?),
        USER_CONTROL_STREAM_EOF => UserControlEvent::StreamEof(reader.read_u32_be()?),
        USER_CONTROL_STREAM_DRY => UserControlEvent::StreamDry(reader.read_u32_be()?),
        USER_CONTROL_SET_BUFFER_LENGTH => UserControlEvent::SetBufferLength {
            stream_id: reader.read_u32_be()?,
            buffer_ms: reader.read_u32_be()?,
        },
        USER_CONTROL_STREAM_IS_RECORDED => UserControlEvent::StreamIsRecorded(reader.read_u32_be()?),
        USER_CONTROL_PING_REQUEST => UserControlEvent::PingRequest(reader.read_u32_be()?),
        USER_CONTROL_PING_RESPONSE => UserControlEvent::PingResponse(reader.read_u32_be()?),
        other => UserControlEvent::Unknown(other),
    };
    Ok(event)
}
