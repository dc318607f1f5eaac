use std::collections::HashMap;
use std::sync::Arc;
use log::{debug, info, trace};
use crate::processing::{is_key_frame_payload, is_video_sequence_header, AudioTag};
use crate::protocol::{status, ControlMessage, RtmpCommand, RtmpMessage, UserControlEvent};
use crate::server::config::{MonitorCallback, ServerConfig};
use crate::server::registry::{ClientId, StreamRegistry};
use crate::server::session::{ClientRole, ClientSession};
use crate::Result;

/// Everything the reactor owns: clients, streams and settings.
///
/// Command handlers get it mutably; nothing here is shared with another task.
pub struct ServerContext {
    config: Arc<ServerConfig>,
    monitor: Option<MonitorCallback>,
    pub clients: HashMap<ClientId, ClientSession>,
    pub streams: StreamRegistry,
}

impl ServerContext {
    /// Create new context
    pub fn new(config: Arc<ServerConfig>, monitor: Option<MonitorCallback>) -> Self {
        ServerContext {
            config,
            monitor,
            clients: HashMap::new(),
            streams: StreamRegistry::new(),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn client(&mut self, id: ClientId) -> Option<&mut ClientSession> {
        self.clients.get_mut(&id)
    }

    /// Queue a message for one client
    pub fn send(&mut self, id: ClientId, message: RtmpMessage) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.send(message);
        }
    }

    /// Queue an onStatus on `stream_id`
    pub fn send_status(
        &mut self,
        id: ClientId,
        stream_id: u32,
        level: &str,
        code: &str,
        description: &str,
    ) -> Result<()> {
        let payload = RtmpCommand::on_status(level, code, description)?;
        self.send(id, RtmpMessage::command(stream_id, payload));
        Ok(())
    }

    pub fn send_user_control(&mut self, id: ClientId, event: UserControlEvent) -> Result<()> {
        let message = ControlMessage::UserControl(event).encode()?;
        self.send(id, message);
        Ok(())
    }

    /// Tell the monitor a stream became watched or unwatched
    pub fn notify_monitor(&self, stream: &str, watched: bool) {
        info!("Stream '{}' {}", stream, if watched { "has players" } else { "has no players" });
        if let Some(cb) = &self.monitor {
            cb(stream, watched);
        }
    }

    /// Drop whatever publish or play role the client holds
    pub fn release_role(&mut self, id: ClientId) -> Result<()> {
        let Some(client) = self.clients.get_mut(&id) else {
            return Ok(());
        };
        match std::mem::replace(&mut client.role, ClientRole::Idle) {
            ClientRole::Publisher { stream, .. } => self.end_publish(&stream, id),
            ClientRole::Player { stream, .. } => {
                debug!("Player {} left '{}'", id, stream);
                if self.streams.remove_player(&stream, id) {
                    self.notify_monitor(&stream, false);
                }
                Ok(())
            }
            ClientRole::Idle => Ok(()),
        }
    }

    fn end_publish(&mut self, stream: &str, id: ClientId) -> Result<()> {
        let keep = self.config.keep_src;
        let players = self.streams.unpublish(stream, id, keep);
        info!("Publisher {} left '{}' ({} players, keep={})", id, stream, players.len(), keep);

        for player in &players {
            let Some(client) = self.clients.get_mut(player) else {
                continue;
            };
            let ClientRole::Player { stream_id, .. } = client.role else {
                continue;
            };
            client.send(ControlMessage::UserControl(UserControlEvent::StreamEof(stream_id)).encode()?);
            client.send(RtmpMessage::command(
                stream_id,
                RtmpCommand::on_status("status", status::PLAY_UNPUBLISH_NOTIFY, stream)?,
            ));
            if keep {
                client.wait_key_frame = true;
            } else {
                client.role = ClientRole::Idle;
                client.begin_close();
            }
        }

        if !keep && !players.is_empty() {
            self.notify_monitor(stream, false);
        }
        Ok(())
    }

    /// Fan a publisher's audio, video or metadata out to its players
    pub fn forward_media(&mut self, id: ClientId, message: RtmpMessage) {
        let Some(ClientRole::Publisher { stream, .. }) = self.clients.get(&id).map(|c| &c.role) else {
            debug!("Client {} sent media without publishing", id);
            return;
        };
        let Some(live) = self.streams.get_mut(stream) else {
            return;
        };
        live.cache(&message);
        let players = live.players.clone();

        let header = is_header(&message);
        let key_frame = message.is_video() && is_key_frame_payload(&message.payload);

        for player in players {
            let Some(client) = self.clients.get_mut(&player) else {
                continue;
            };
            let ClientRole::Player { stream_id, .. } = client.role else {
                continue;
            };
            if client.is_closing() {
                continue;
            }

            if !header {
                if message.is_audio() && !client.receive_audio {
                    continue;
                }
                if message.is_video() {
                    if !client.receive_video {
                        continue;
                    }
                    if client.wait_key_frame {
                        if !key_frame {
                            continue;
                        }
                        client.wait_key_frame = false;
                    }
                }
            }

            if !client.send(message.with_stream_id(stream_id)) {
                trace!("Player {} dropped message at {}", player, message.timestamp);
            }
        }
    }

    /// Custom commands go from publisher to players and from a player to its publisher
    pub fn forward_custom(&mut self, id: ClientId, message: RtmpMessage) {
        let Some(role) = self.clients.get(&id).map(|c| c.role.clone()) else {
            return;
        };
        let targets: Vec<ClientId> = match &role {
            ClientRole::Publisher { stream, .. } => self
                .streams
                .get(stream)
                .map(|live| live.players.clone())
                .unwrap_or_default(),
            ClientRole::Player { stream, .. } => self
                .streams
                .get(stream)
                .and_then(|live| live.publisher)
                .into_iter()
                .collect(),
            ClientRole::Idle => {
                debug!("Custom command from idle client {} dropped", id);
                return;
            }
        };

        for target in targets {
            let Some(client) = self.clients.get_mut(&target) else {
                continue;
            };
            let stream_id = match client.role {
                ClientRole::Publisher { stream_id, .. } | ClientRole::Player { stream_id, .. } => stream_id,
                ClientRole::Idle => continue,
            };
            trace!("Custom command {} -> {}", id, target);
            client.send(message.with_stream_id(stream_id));
        }
    }
}

/// Sequence headers and metadata reach every player regardless of gating
fn is_header(message: &RtmpMessage) -> bool {
    message.is_data()
        || (message.is_video() && is_video_sequence_header(&message.payload))
        || (message.is_audio()
            && AudioTag::parse(&message.payload).is_ok_and(|tag| tag.is_sequence_header()))
}
