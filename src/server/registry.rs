use std::collections::HashMap;
use log::debug;
use uuid::Uuid;
use crate::processing::{is_video_sequence_header, AudioTag};
use crate::protocol::{RtmpData, RtmpMessage};
use crate::utils::current_timestamp;
use crate::{Error, Result};

/// Identifies one accepted connection
pub type ClientId = Uuid;

/// A named stream: its publisher, its players and what late joiners need
#[derive(Debug, Clone)]
pub struct LiveStream {
    /// Stream name, query string stripped
    pub name: String,

    /// Publishing client; `None` while waiting for one
    pub publisher: Option<ClientId>,

    /// Publishing start time
    pub started_at: u32,

    /// Last onMetaData, without `@setDataFrame`
    pub metadata: Option<RtmpMessage>,

    pub audio_header: Option<RtmpMessage>,

    pub video_header: Option<RtmpMessage>,

    /// Players in attach order
    pub players: Vec<ClientId>,
}

impl LiveStream {
    fn new(name: &str) -> Self {
        LiveStream {
            name: name.to_string(),
            publisher: None,
            started_at: 0,
            metadata: None,
            audio_header: None,
            video_header: None,
            players: Vec::new(),
        }
    }

    /// Remember metadata and sequence headers from the publisher
    pub fn cache(&mut self, message: &RtmpMessage) {
        if message.is_data() {
            if RtmpData::parse(&message.payload).is_ok_and(|data| data.is_metadata()) {
                self.metadata = Some(message.clone());
            }
        } else if message.is_video() && is_video_sequence_header(&message.payload) {
            self.video_header = Some(message.clone());
        } else if message.is_audio()
            && AudioTag::parse(&message.payload).is_ok_and(|tag| tag.is_sequence_header())
        {
            self.audio_header = Some(message.clone());
        }
    }

    /// Cached messages a new player gets before live media
    pub fn preamble(&self) -> Vec<RtmpMessage> {
        [&self.metadata, &self.audio_header, &self.video_header]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn has_players(&self) -> bool {
        !self.players.is_empty()
    }
}

/// Streams by name. Owned by the reactor, never shared.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: HashMap<String, LiveStream>,
}

impl StreamRegistry {
    /// Create new registry
    pub fn new() -> Self {
        StreamRegistry::default()
    }

    pub fn get(&self, name: &str) -> Option<&LiveStream> {
        self.streams.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut LiveStream> {
        self.streams.get_mut(name)
    }

    /// Check if stream is being published
    pub fn is_publishing(&self, name: &str) -> bool {
        self.streams.get(name).is_some_and(|s| s.publisher.is_some())
    }

    /// Register `client` as publisher of `name`.
    ///
    /// Returns the players already waiting on the stream.
    pub fn publish(&mut self, name: &str, client: ClientId) -> Result<Vec<ClientId>> {
        let stream = self
            .streams
            .entry(name.to_string())
            .or_insert_with(|| LiveStream::new(name));

        if stream.publisher.is_some() {
            return Err(Error::wrong_state(format!(
                "Stream '{}' is already being published",
                name
            )));
        }

        stream.publisher = Some(client);
        stream.started_at = current_timestamp();
        Ok(stream.players.clone())
    }

    /// Publisher left. With `keep` the stream stays for its players and the
    /// next publisher; otherwise it is removed. Returns the players.
    pub fn unpublish(&mut self, name: &str, client: ClientId, keep: bool) -> Vec<ClientId> {
        let Some(stream) = self.streams.get_mut(name) else {
            return Vec::new();
        };
        if stream.publisher != Some(client) {
            return Vec::new();
        }

        if keep {
            stream.publisher = None;
            debug!("Stream '{}' kept without publisher", name);
            return stream.players.clone();
        }

        self.streams
            .remove(name)
            .map(|stream| stream.players)
            .unwrap_or_default()
    }

    /// Attach a player, creating a waiting stream if needed.
    ///
    /// Returns true when it is the first player.
    pub fn add_player(&mut self, name: &str, client: ClientId) -> bool {
        let stream = self
            .streams
            .entry(name.to_string())
            .or_insert_with(|| LiveStream::new(name));
        if stream.players.contains(&client) {
            return false;
        }
        stream.players.push(client);
        stream.players.len() == 1
    }

    /// Detach a player. Returns true when it was the last one.
    pub fn remove_player(&mut self, name: &str, client: ClientId) -> bool {
        let Some(stream) = self.streams.get_mut(name) else {
            return false;
        };
        let before = stream.players.len();
        stream.players.retain(|id| *id != client);
        let last = before > 0 && stream.players.is_empty();

        // Nobody publishes and nobody watches
        if stream.players.is_empty() && stream.publisher.is_none() {
            self.streams.remove(name);
        }
        last
    }

    pub fn names(&self) -> Vec<String> {
        self.streams.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
