mod connect;
mod create_stream;
mod publish;
mod play;
mod delete_stream;

use std::collections::HashMap;
use std::sync::Arc;
use crate::protocol::RtmpCommand;
use crate::server::{ClientId, ServerContext};
use crate::Result;
use crate::handlers::connect::ConnectHandler;
use crate::handlers::create_stream::{CreateStreamHandler, ReleaseStreamHandler};
use crate::handlers::delete_stream::DeleteStreamHandler;
use crate::handlers::play::{PlayHandler, ReceiveMediaHandler};
use crate::handlers::publish::PublishHandler;

/// Where a command came from
#[derive(Debug, Clone, Copy)]
pub struct Request {
    pub client: ClientId,

    /// Message stream id the command arrived on
    pub stream_id: u32,
}

/// Server side of one AMF0 command.
///
/// Runs on the reactor task; must not block.
pub trait CommandHandler: Send + Sync {
    /// Get command name this handler processes
    fn command_name(&self) -> &str;

    /// Handle the command; an error ends the client
    fn handle(&self, command: &RtmpCommand<'_>, request: Request, ctx: &mut ServerContext) -> Result<()>;
}

/// Command handler registry
pub struct CommandHandlerRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl Default for CommandHandlerRegistry {
    fn default() -> Self {
        CommandHandlerRegistry::new()
    }
}

impl CommandHandlerRegistry {
    pub fn new() -> Self {
        let mut registry = CommandHandlerRegistry {
            handlers: HashMap::new(),
        };

        // Register default handlers
        registry.register(Arc::new(ConnectHandler));
        registry.register(Arc::new(CreateStreamHandler));
        registry.register(Arc::new(ReleaseStreamHandler::new("releaseStream")));
        registry.register(Arc::new(ReleaseStreamHandler::new("FCPublish")));
        registry.register(Arc::new(ReleaseStreamHandler::new("FCUnpublish")));
        registry.register(Arc::new(PublishHandler));
        registry.register(Arc::new(PlayHandler));
        registry.register(Arc::new(ReceiveMediaHandler::new("receiveAudio")));
        registry.register(Arc::new(ReceiveMediaHandler::new("receiveVideo")));
        registry.register(Arc::new(DeleteStreamHandler::new("deleteStream")));
        registry.register(Arc::new(DeleteStreamHandler::new("closeStream")));

        registry
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(handler.command_name().to_string(), handler);
    }

    pub fn find(&self, name: &str) -> Option<&dyn CommandHandler> {
        self.handlers.get(name).map(|h| h.as_ref())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use tokio::net::{TcpListener, TcpStream};
    use crate::chunk::ChunkDemux;
    use crate::protocol::RtmpMessage;
    use crate::server::session::ClientSession;
    use crate::server::{ClientId, ServerConfig, ServerContext};

    /// A session over a real loopback socket; the peer end is returned to keep it open
    pub async fn add_client(ctx: &mut ServerContext) -> (ClientId, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = TcpStream::connect(addr).await.unwrap();
        let (socket, remote) = listener.accept().await.unwrap();
        let session = ClientSession::new(socket, remote, ctx.config().client_cache_size);
        let id = session.id;
        ctx.clients.insert(id, session);
        (id, peer)
    }

    pub fn context(config: ServerConfig) -> ServerContext {
        ServerContext::new(Arc::new(config), None)
    }

    /// Everything queued for the client, decoded
    pub fn drain(ctx: &mut ServerContext, id: ClientId) -> Vec<RtmpMessage> {
        let client = ctx.client(id).unwrap();
        let mut demux = ChunkDemux::new();
        while let Some(bytes) = client.output.next_chunk().unwrap() {
            let bytes = bytes.to_vec();
            demux.feed(&bytes).unwrap();
            client.output.consume(bytes.len());
        }
        let mut out = Vec::new();
        while let Some(message) = demux.next_message().unwrap() {
            out.push(message);
        }
        out
    }

    /// Command names and status codes, in order
    pub fn commands(messages: &[RtmpMessage]) -> Vec<String> {
        messages
            .iter()
            .filter(|m| m.is_command())
            .map(|m| {
                let cmd = crate::protocol::RtmpCommand::parse(&m.payload).unwrap();
                match cmd.status_code() {
                    Some(code) => format!("{} {}", cmd.name, code),
                    None => cmd.name.to_string(),
                }
            })
            .collect()
    }
}
