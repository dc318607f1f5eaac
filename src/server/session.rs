use std::io::ErrorKind;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use log::{debug, trace};
use tokio::net::TcpStream;
use uuid::Uuid;
use crate::chunk::ChunkDemux;
use crate::handshake::{HandshakeStep, ServerHandshake};
use crate::message::OutputQueue;
use crate::protocol::constants::DEFAULT_WINDOW_SIZE;
use crate::protocol::{ControlMessage, RtmpMessage};
use crate::server::registry::ClientId;
use crate::{ByteQueue, Result};

const READ_CHUNK: usize = 16 * 1024;

/// What a client is doing with its stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRole {
    Idle,
    Publisher { stream: String, stream_id: u32 },
    Player { stream: String, stream_id: u32 },
}

/// Result of one read pass over a client socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    /// Socket drained; readiness is armed again
    Idle,

    /// Read budget spent with data possibly left
    Throttled,

    /// Peer closed its side
    Eof,
}

/// One accepted connection, owned and driven by the reactor
pub struct ClientSession {
    pub id: ClientId,
    pub peer: SocketAddr,
    socket: TcpStream,

    /// Present until C2 has been verified
    handshake: Option<ServerHandshake>,

    /// Handshake reply, written ahead of any chunk
    raw_out: ByteQueue,

    demux: ChunkDemux,
    pub output: OutputQueue,
    pub role: ClientRole,

    /// `connect` accepted
    pub app_connected: bool,
    next_stream_id: u32,

    pub receive_audio: bool,
    pub receive_video: bool,

    /// Player skips video until a key frame
    pub wait_key_frame: bool,

    bytes_in: u64,
    peer_window: u32,
    last_acked: u64,

    closing_since: Option<Instant>,

    /// Last time the peer sent anything
    last_activity: Instant,
}

impl ClientSession {
    pub fn new(socket: TcpStream, peer: SocketAddr, cache_size: usize) -> Self {
        ClientSession {
            id: Uuid::new_v4(),
            peer,
            socket,
            handshake: Some(ServerHandshake::new()),
            raw_out: ByteQueue::with_capacity(2 * 1536 + 1),
            demux: ChunkDemux::new(),
            output: OutputQueue::new(cache_size),
            role: ClientRole::Idle,
            app_connected: false,
            next_stream_id: 1,
            receive_audio: true,
            receive_video: true,
            wait_key_frame: false,
            bytes_in: 0,
            peer_window: DEFAULT_WINDOW_SIZE,
            last_acked: 0,
            closing_since: None,
            last_activity: Instant::now(),
        }
    }

    pub fn is_handshaking(&self) -> bool {
        self.handshake.is_some()
    }

    #[cfg(test)]
    pub(crate) fn is_publisher(&self) -> bool {
        matches!(self.role, ClientRole::Publisher { .. })
    }

    /// Stream id for the next createStream
    pub fn allocate_stream_id(&mut self) -> u32 {
        let id = self.next_stream_id;
        self.next_stream_id += 1;
        id
    }

    pub fn set_peer_window(&mut self, window: u32) {
        if window > 0 {
            self.peer_window = window;
        }
    }

    /// Queue for sending; false when it was dropped by the queue policy
    pub fn send(&mut self, message: RtmpMessage) -> bool {
        self.output.push(message)
    }

    /// Stop reading requests; the socket closes once output drains
    pub fn begin_close(&mut self) {
        if self.closing_since.is_none() {
            debug!("Client {} closing after drain", self.id);
            self.closing_since = Some(Instant::now());
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing_since.is_some()
    }

    /// Closing and either drained or out of time
    pub fn can_drop(&self, grace: Duration) -> bool {
        match self.closing_since {
            Some(since) => self.is_drained() || since.elapsed() >= grace,
            None => false,
        }
    }

    /// Silent for `timeout` without ever publishing or playing.
    ///
    /// Players may legitimately send nothing, and an unwatched publisher may
    /// pause, so only idle sessions expire.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.role == ClientRole::Idle
            && !self.is_closing()
            && self.last_activity.elapsed() >= timeout
    }

    pub fn is_drained(&self) -> bool {
        self.raw_out.is_empty() && self.output.is_empty()
    }

    /// Read at most about `budget` bytes and feed them to the handshake or demuxer
    pub fn poll_input(&mut self, cx: &mut Context<'_>, budget: usize) -> Result<InputStatus> {
        let mut buf = [0u8; READ_CHUNK];
        let mut taken = 0;

        while taken < budget {
            match self.socket.poll_read_ready(cx) {
                Poll::Pending => return Ok(InputStatus::Idle),
                Poll::Ready(Err(e)) => return Err(e.into()),
                Poll::Ready(Ok(())) => {}
            }
            match self.socket.try_read(&mut buf) {
                Ok(0) => return Ok(InputStatus::Eof),
                Ok(n) => {
                    taken += n;
                    self.ingest(&buf[..n])?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(InputStatus::Throttled)
    }

    fn ingest(&mut self, data: &[u8]) -> Result<()> {
        self.bytes_in += data.len() as u64;
        self.last_activity = Instant::now();

        match self.handshake.as_mut() {
            Some(handshake) => {
                let mut step = handshake.feed(data)?;
                loop {
                    match step {
                        HandshakeStep::NeedMore => break,
                        HandshakeStep::Reply(bytes) => {
                            self.raw_out.put_bytes(&bytes)?;
                            // C2 may already be buffered
                            step = handshake.feed(&[])?;
                        }
                        HandshakeStep::Done { leftover } => {
                            debug!("Client {} handshake done", self.id);
                            self.handshake = None;
                            self.demux.feed(&leftover)?;
                            break;
                        }
                    }
                }
            }
            None => self.demux.feed(data)?,
        }

        if self.bytes_in - self.last_acked >= self.peer_window as u64 {
            self.last_acked = self.bytes_in;
            self.output
                .push(ControlMessage::Acknowledgement(self.bytes_in as u32).encode()?);
        }
        Ok(())
    }

    /// Next reassembled message, if a whole one is buffered
    pub fn next_message(&mut self) -> Result<Option<RtmpMessage>> {
        if self.handshake.is_some() {
            return Ok(None);
        }
        self.demux.next_message()
    }

    /// Write as much queued output as the socket takes
    pub fn poll_output(&mut self, cx: &mut Context<'_>) -> Result<()> {
        loop {
            let from_raw = !self.raw_out.is_empty();
            let pending: &[u8] = if from_raw {
                self.raw_out.as_slice()
            } else {
                match self.output.next_chunk()? {
                    Some(bytes) => bytes,
                    None => return Ok(()),
                }
            };

            match self.socket.poll_write_ready(cx) {
                Poll::Pending => return Ok(()),
                Poll::Ready(Err(e)) => return Err(e.into()),
                Poll::Ready(Ok(())) => {}
            }
            match self.socket.try_write(pending) {
                Ok(n) => {
                    trace!("Client {} wrote {} bytes", self.id, n);
                    if from_raw {
                        self.raw_out.pop(n);
                    } else {
                        self.output.consume(n);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
