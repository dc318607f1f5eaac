use log::debug;
use crate::handlers::{CommandHandler, Request};
use crate::protocol::{RtmpCommand, RtmpMessage};
use crate::server::ServerContext;
use crate::{Error, Result};

pub struct CreateStreamHandler;

impl CommandHandler for CreateStreamHandler {
    fn command_name(&self) -> &str {
        "createStream"
    }

    fn handle(&self, command: &RtmpCommand<'_>, request: Request, ctx: &mut ServerContext) -> Result<()> {
        let Some(client) = ctx.client(request.client) else {
            return Ok(());
        };
        if !client.app_connected {
            return Err(Error::wrong_state("createStream before connect"));
        }

        // Allocate new stream ID
        let stream_id = client.allocate_stream_id();
        debug!("Client {} created stream {}", client.id, stream_id);
        client.send(RtmpMessage::command(
            0,
            RtmpCommand::result(command.transaction_id, Some(stream_id as f64))?,
        ));
        Ok(())
    }
}

/// releaseStream, FCPublish and FCUnpublish sent by encoders around publish;
/// acknowledged and otherwise ignored
pub struct ReleaseStreamHandler {
    name: &'static str,
}

impl ReleaseStreamHandler {
    pub fn new(name: &'static str) -> Self {
        ReleaseStreamHandler { name }
    }
}

impl CommandHandler for ReleaseStreamHandler {
    fn command_name(&self) -> &str {
        self.name
    }

    fn handle(&self, command: &RtmpCommand<'_>, request: Request, ctx: &mut ServerContext) -> Result<()> {
        debug!("{} {}", self.name, command.arg_str(0).unwrap_or_default());
        if command.transaction_id != 0.0 {
            ctx.send(
                request.client,
                RtmpMessage::command(0, RtmpCommand::result(command.transaction_id, None)?),
            );
        }
        Ok(())
    }
}
