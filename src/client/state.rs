use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    /// Opened, no stream info yet
    Idle,

    /// Audio and/or video info set
    InfoSet,

    /// Handshake and publish negotiation running
    Connecting,

    /// Accepting frames
    Publishing,

    /// Close in progress
    Closing,

    Closed,
}

impl PushState {
    /// Stream info may still change
    pub fn can_set_info(&self) -> bool {
        matches!(self, PushState::Idle | PushState::InfoSet)
    }

    pub fn can_connect(&self) -> bool {
        *self == PushState::InfoSet
    }

    pub fn is_publishing(&self) -> bool {
        *self == PushState::Publishing
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PushState::Closing | PushState::Closed)
    }
}

impl fmt::Display for PushState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PushState::Idle => "IDLE",
            PushState::InfoSet => "INFO_SET",
            PushState::Connecting => "CONNECTING",
            PushState::Publishing => "PUBLISHING",
            PushState::Closing => "CLOSING",
            PushState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,

    /// Handshake and play negotiation running
    Connecting,

    /// Receive loop running
    Playing,

    Closed,
}

impl SourceState {
    pub fn can_connect(&self) -> bool {
        *self == SourceState::Idle
    }

    pub fn is_playing(&self) -> bool {
        *self == SourceState::Playing
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Idle => "IDLE",
            SourceState::Connecting => "CONNECTING",
            SourceState::Playing => "PLAYING",
            SourceState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}
