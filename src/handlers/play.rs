use log::{debug, info, warn};
use crate::handlers::{CommandHandler, Request};
use crate::protocol::{status, stream_name, RtmpCommand, UserControlEvent};
use crate::server::{ClientRole, ServerContext};
use crate::{Error, Result};

pub struct PlayHandler;

impl CommandHandler for PlayHandler {
    fn command_name(&self) -> &str {
        "play"
    }

    fn handle(&self, command: &RtmpCommand<'_>, request: Request, ctx: &mut ServerContext) -> Result<()> {
        let Request { client: id, stream_id } = request;
        let stream_key = command
            .arg_str(0)
            .ok_or_else(|| Error::bad_data("play without stream name"))?;
        let name = stream_name(stream_key);

        let Some(client) = ctx.client(id) else {
            return Ok(());
        };
        if !client.app_connected || stream_id == 0 {
            return Err(Error::wrong_state("play before connect/createStream"));
        }
        if client.role != ClientRole::Idle {
            return Err(Error::wrong_state(format!("Client {} already has a stream", id)));
        }

        if !ctx.config().authorize(stream_key) {
            warn!("Play of '{}' refused by auth callback", stream_key);
            ctx.send_status(id, stream_id, "error", status::PLAY_UNAUTHORIZED, "Not authorized")?;
            if let Some(client) = ctx.client(id) {
                client.begin_close();
            }
            return Ok(());
        }

        let first = ctx.streams.add_player(name, id);
        let (publishing, preamble) = match ctx.streams.get(name) {
            Some(live) => (live.publisher.is_some(), live.preamble()),
            None => (false, Vec::new()),
        };

        if let Some(client) = ctx.client(id) {
            client.role = ClientRole::Player {
                stream: name.to_string(),
                stream_id,
            };
            // Late joiners start at the next key frame
            client.wait_key_frame = true;
        }

        ctx.send_user_control(id, UserControlEvent::StreamBegin(stream_id))?;
        ctx.send_status(id, stream_id, "status", status::PLAY_RESET, name)?;
        ctx.send_status(id, stream_id, "status", status::PLAY_START, name)?;
        if publishing {
            ctx.send_status(id, stream_id, "status", status::PLAY_PUBLISH_NOTIFY, name)?;
        }
        for message in preamble {
            ctx.send(id, message.with_stream_id(stream_id));
        }
        info!("Client {} playing '{}'", id, name);

        if first {
            ctx.notify_monitor(name, true);
        }
        Ok(())
    }
}

/// receiveAudio / receiveVideo from a player
pub struct ReceiveMediaHandler {
    name: &'static str,
}

impl ReceiveMediaHandler {
    pub fn new(name: &'static str) -> Self {
        ReceiveMediaHandler { name }
    }
}

impl CommandHandler for ReceiveMediaHandler {
    fn command_name(&self) -> &str {
        self.name
    }

    fn handle(&self, command: &RtmpCommand<'_>, request: Request, ctx: &mut ServerContext) -> Result<()> {
        let enable = command
            .arguments
            .first()
            .and_then(|v| v.as_bool())
            .ok_or_else(|| Error::bad_data(format!("{} without flag", self.name)))?;
        let Some(client) = ctx.client(request.client) else {
            return Ok(());
        };

        if self.name == "receiveAudio" {
            client.receive_audio = enable;
        } else {
            if enable && !client.receive_video {
                client.wait_key_frame = true;
            }
            client.receive_video = enable;
        }
        debug!("Client {} {} {}", client.id, self.name, enable);
        Ok(())
    }
}
