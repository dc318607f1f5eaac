use log::{info, warn};
use crate::handlers::{CommandHandler, Request};
use crate::protocol::{status, stream_name, RtmpCommand, UserControlEvent};
use crate::server::{ClientRole, ServerContext};
use crate::{Error, Result};

pub struct PublishHandler;

impl CommandHandler for PublishHandler {
    fn command_name(&self) -> &str {
        "publish"
    }

    fn handle(&self, command: &RtmpCommand<'_>, request: Request, ctx: &mut ServerContext) -> Result<()> {
        let Request { client: id, stream_id } = request;
        let stream_key = command
            .arg_str(0)
            .ok_or_else(|| Error::bad_data("publish without stream name"))?;
        let name = stream_name(stream_key);

        let Some(client) = ctx.client(id) else {
            return Ok(());
        };
        if !client.app_connected || stream_id == 0 {
            return Err(Error::wrong_state("publish before connect/createStream"));
        }
        if client.role != ClientRole::Idle {
            return Err(Error::wrong_state(format!("Client {} already has a stream", id)));
        }

        if !ctx.config().authorize(stream_key) {
            warn!("Publish of '{}' refused by auth callback", stream_key);
            ctx.send_status(id, stream_id, "error", status::PUBLISH_UNAUTHORIZED, "Not authorized")?;
            if let Some(client) = ctx.client(id) {
                client.begin_close();
            }
            return Ok(());
        }

        let waiting = match ctx.streams.publish(name, id) {
            Ok(players) => players,
            Err(e) => {
                warn!("Publish refused: {}", e);
                ctx.send_status(id, stream_id, "error", status::PUBLISH_BAD_NAME, "Stream already publishing")?;
                if let Some(client) = ctx.client(id) {
                    client.begin_close();
                }
                return Ok(());
            }
        };

        if let Some(client) = ctx.client(id) {
            client.role = ClientRole::Publisher {
                stream: name.to_string(),
                stream_id,
            };
        }
        ctx.send_user_control(id, UserControlEvent::StreamBegin(stream_id))?;
        ctx.send_status(id, stream_id, "status", status::PUBLISH_START, name)?;
        info!("Client {} publishing '{}' ({} players waiting)", id, name, waiting.len());

        // Players that attached before this publisher
        for player in waiting {
            let Some(client) = ctx.client(player) else {
                continue;
            };
            let ClientRole::Player { stream_id: player_stream, .. } = client.role else {
                continue;
            };
            client.wait_key_frame = true;
            ctx.send_user_control(player, UserControlEvent::StreamBegin(player_stream))?;
            ctx.send_status(player, player_stream, "status", status::PLAY_PUBLISH_NOTIFY, name)?;
        }
        Ok(())
    }
}
