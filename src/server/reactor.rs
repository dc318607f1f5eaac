use std::future::poll_fn;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use log::{debug, info, trace, warn};
use tokio::net::TcpListener;
use tokio::sync::watch;
use crate::handlers::{CommandHandlerRegistry, Request};
use crate::message::MessageType;
use crate::protocol::constants::MSG_TYPE_COMMAND_AMF3;
use crate::protocol::{strip_set_data_frame, ControlMessage, RtmpCommand, RtmpMessage, UserControlEvent};
use crate::server::context::ServerContext;
use crate::server::registry::ClientId;
use crate::server::session::{ClientSession, InputStatus};
use crate::{Error, Result};

/// Bytes read from one client before the others get their turn
const READ_BUDGET: usize = 64 * 1024;

/// How often closing and idle clients are checked against their deadlines
const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Single task serving the listener and every client.
///
/// Sockets are polled for readiness from one `poll_fn`; reads and writes are
/// non-blocking, so a slow client never holds up the others.
pub(crate) struct Reactor {
    listener: TcpListener,
    ctx: ServerContext,
    handlers: CommandHandlerRegistry,
    active: Arc<AtomicUsize>,
}

impl Reactor {
    pub fn new(listener: TcpListener, ctx: ServerContext, active: Arc<AtomicUsize>) -> Self {
        Reactor {
            listener,
            ctx,
            handlers: CommandHandlerRegistry::new(),
            active,
        }
    }

    /// Serve until `shutdown` turns true or its sender goes away
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = sweep.tick() => self.sweep(),
                _ = poll_fn(|cx| self.poll(cx)) => {}
            }
        }

        info!("Reactor stopping, dropping {} clients", self.ctx.clients.len());
        self.ctx.clients.clear();
        self.active.store(0, Ordering::SeqCst);
    }

    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        self.accept(cx);

        let ids: Vec<ClientId> = self.ctx.clients.keys().copied().collect();
        for id in &ids {
            if let Err(e) = self.service_input(*id, cx) {
                self.drop_client(*id, Some(&e));
            }
        }

        // Writes after all reads so fan-out from this pass goes out now
        let ids: Vec<ClientId> = self.ctx.clients.keys().copied().collect();
        for id in ids {
            let Some(client) = self.ctx.clients.get_mut(&id) else {
                continue;
            };
            if let Err(e) = client.poll_output(cx) {
                self.drop_client(id, Some(&e));
            }
        }

        self.reap();
        Poll::Pending
    }

    fn accept(&mut self, cx: &mut Context<'_>) {
        loop {
            match self.listener.poll_accept(cx) {
                Poll::Pending => return,
                Poll::Ready(Err(e)) => {
                    warn!("Accept error: {}", e);
                    cx.waker().wake_by_ref();
                    return;
                }
                Poll::Ready(Ok((socket, peer))) => {
                    let config = self.ctx.config();
                    if self.ctx.clients.len() >= config.max_clients {
                        warn!("Client limit {} reached, rejecting {}", config.max_clients, peer);
                        continue;
                    }
                    if let Err(e) = socket.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY: {}", e);
                    }
                    let client = ClientSession::new(socket, peer, config.client_cache_size);
                    info!("Client {} connected from {}", client.id, peer);
                    self.ctx.clients.insert(client.id, client);
                    self.active.store(self.ctx.clients.len(), Ordering::SeqCst);
                }
            }
        }
    }

    fn service_input(&mut self, id: ClientId, cx: &mut Context<'_>) -> Result<()> {
        let Some(client) = self.ctx.clients.get_mut(&id) else {
            return Ok(());
        };
        let status = client.poll_input(cx, READ_BUDGET)?;

        loop {
            let Some(client) = self.ctx.clients.get_mut(&id) else {
                return Ok(());
            };
            let closing = client.is_closing();
            let Some(message) = client.next_message()? else {
                break;
            };
            if closing {
                trace!("Client {} closing, ignoring message type {}", id, message.message_type);
                continue;
            }
            self.handle_message(id, message)?;
        }

        match status {
            InputStatus::Eof => Err(Error::reset("Peer closed connection")),
            InputStatus::Throttled => {
                cx.waker().wake_by_ref();
                Ok(())
            }
            InputStatus::Idle => Ok(()),
        }
    }

    fn handle_message(&mut self, id: ClientId, message: RtmpMessage) -> Result<()> {
        match MessageType::from_id(message.message_type) {
            MessageType::Control => self.handle_control(id, &message),
            MessageType::Command => self.handle_command(id, &message),
            MessageType::Data => {
                let payload = strip_set_data_frame(&message.payload)?;
                let data = RtmpMessage::data(message.stream_id, message.timestamp, payload);
                self.ctx.forward_media(id, data);
                Ok(())
            }
            MessageType::Audio | MessageType::Video => {
                self.ctx.forward_media(id, message);
                Ok(())
            }
            MessageType::Custom => {
                self.ctx.forward_custom(id, message);
                Ok(())
            }
            MessageType::Unknown(kind) => {
                debug!("Client {} sent unsupported message type {}", id, kind);
                Ok(())
            }
        }
    }

    fn handle_control(&mut self, id: ClientId, message: &RtmpMessage) -> Result<()> {
        let Some(control) = ControlMessage::parse(message)? else {
            return Ok(());
        };
        match control {
            ControlMessage::WindowAckSize(size) => {
                if let Some(client) = self.ctx.client(id) {
                    client.set_peer_window(size);
                }
                Ok(())
            }
            ControlMessage::UserControl(UserControlEvent::PingRequest(time)) => {
                self.ctx.send_user_control(id, UserControlEvent::PingResponse(time))
            }
            other => {
                // Chunk size and abort are applied by the demuxer
                trace!("Client {} control {:?}", id, other);
                Ok(())
            }
        }
    }

    fn handle_command(&mut self, id: ClientId, message: &RtmpMessage) -> Result<()> {
        let payload: &[u8] = if message.message_type == MSG_TYPE_COMMAND_AMF3 {
            // AMF3 commands carry AMF0 after a format byte
            message.payload.get(1..).unwrap_or_default()
        } else {
            &message.payload
        };
        let command = RtmpCommand::parse(payload)?;
        debug!("Client {} command {} ({})", id, command.name, command.transaction_id);

        match self.handlers.find(command.name) {
            Some(handler) => handler.handle(
                &command,
                Request {
                    client: id,
                    stream_id: message.stream_id,
                },
                &mut self.ctx,
            ),
            None => {
                debug!("Ignoring command {}", command.name);
                Ok(())
            }
        }
    }

    /// Drop closing clients that drained or ran out of time, and idle ones
    /// that went silent
    fn reap(&mut self) {
        let config = self.ctx.config();
        let (grace, idle_timeout) = (config.close_grace, config.idle_timeout);

        let mut done = Vec::new();
        let mut expired = Vec::new();
        for client in self.ctx.clients.values() {
            if client.can_drop(grace) {
                done.push(client.id);
            } else if client.is_timed_out(idle_timeout) {
                let stage = if client.is_handshaking() { "handshake" } else { "connected" };
                expired.push((client.id, stage));
            }
        }

        for id in done {
            self.drop_client(id, None);
        }
        for (id, stage) in expired {
            let err = Error::read_data(format!("No data for {:?} ({})", idle_timeout, stage));
            self.drop_client(id, Some(&err));
        }
    }

    fn sweep(&mut self) {
        self.reap();
        let queued: usize = self.ctx.clients.values().map(|c| c.output.size()).sum();
        trace!("{} clients, {} bytes queued", self.ctx.clients.len(), queued);
    }

    fn drop_client(&mut self, id: ClientId, err: Option<&Error>) {
        if let Err(e) = self.ctx.release_role(id) {
            warn!("Cleanup of client {} failed: {}", id, e);
        }
        let Some(client) = self.ctx.clients.remove(&id) else {
            return;
        };
        match err {
            Some(e) if e.is_closed() => info!("Client {} ({}) disconnected", id, client.peer),
            Some(e) => warn!("Client {} ({}) dropped: {}", id, client.peer, e),
            None => info!("Client {} ({}) closed", id, client.peer),
        }
        if client.output.evicted() > 0 {
            debug!("Client {} evicted {} messages", id, client.output.evicted());
        }
        self.active.store(self.ctx.clients.len(), Ordering::SeqCst);
    }
}
