use log::debug;
use crate::handlers::{CommandHandler, Request};
use crate::protocol::RtmpCommand;
use crate::server::ServerContext;
use crate::Result;

/// deleteStream / closeStream: the client gives up its publish or play role
pub struct DeleteStreamHandler {
    name: &'static str,
}

impl DeleteStreamHandler {
    pub fn new(name: &'static str) -> Self {
        DeleteStreamHandler { name }
    }
}

impl CommandHandler for DeleteStreamHandler {
    fn command_name(&self) -> &str {
        self.name
    }

    fn handle(&self, command: &RtmpCommand<'_>, request: Request, ctx: &mut ServerContext) -> Result<()> {
        let stream_id = command
            .arguments
            .first()
            .and_then(|v| v.as_number())
            .map(|n| n as u32)
            .unwrap_or(request.stream_id);
        debug!("Client {} {} {}", request.client, self.name, stream_id);

        // No response expected
        ctx.release_role(request.client)
    }
}
