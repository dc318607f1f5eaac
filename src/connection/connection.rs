use std::collections::VecDeque;
use log::{debug, trace, warn};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use crate::chunk::{ChunkDemux, ChunkMux};
use crate::connection::transport::BoxedTransport;
use crate::handshake::client_handshake;
use crate::protocol::{
    status, stream_name, ControlMessage, RtmpCommand, RtmpMessage, RtmpUrl, UserControlEvent,
    DEFAULT_WINDOW_SIZE, MSG_TYPE_COMMAND_AMF0,
};
use crate::{ByteQueue, Error, Result};

/// Buffer length announced before play, in milliseconds
const PLAY_BUFFER_MS: u32 = 1000;

/// Receiving half of a client connection
pub struct ConnReader {
    reader: ReadHalf<BoxedTransport>,
    demux: ChunkDemux,
    pending: VecDeque<RtmpMessage>,
    window: u32,
    last_acked: u64,
}

impl ConnReader {
    fn new(reader: ReadHalf<BoxedTransport>) -> Self {
        ConnReader {
            reader,
            demux: ChunkDemux::new(),
            pending: VecDeque::new(),
            window: DEFAULT_WINDOW_SIZE,
            last_acked: 0,
        }
    }

    /// Next message from the peer, deferred ones first.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Result<RtmpMessage> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }
        self.demux.read_message(&mut self.reader).await.map_err(|e| match e {
            Error::Io(io) => Error::read_data(io.to_string()),
            other => other,
        })
    }

    /// Control replies owed for `message`: ping responses and window acks
    pub fn replies(&mut self, message: &RtmpMessage) -> Result<Vec<RtmpMessage>> {
        let mut replies = Vec::new();
        match ControlMessage::parse(message)? {
            Some(ControlMessage::WindowAckSize(size)) if size > 0 => {
                debug!("Peer window ack size {}", size);
                self.window = size;
            }
            Some(ControlMessage::UserControl(UserControlEvent::PingRequest(time))) => {
                trace!("Ping {}", time);
                replies.push(ControlMessage::UserControl(UserControlEvent::PingResponse(time)).encode()?);
            }
            _ => {}
        }

        let received = self.demux.bytes_fed();
        if received - self.last_acked >= self.window as u64 {
            self.last_acked = received;
            replies.push(ControlMessage::Acknowledgement(received as u32).encode()?);
        }
        Ok(replies)
    }
}

/// Sending half of a client connection
pub struct ConnWriter {
    writer: WriteHalf<BoxedTransport>,
    mux: ChunkMux,
    out: ByteQueue,

    /// A message write was cancelled or failed part way; the peer may hold a
    /// partial chunk, so nothing more can be framed on this stream
    interrupted: bool,
}

impl ConnWriter {
    pub(crate) fn new(writer: WriteHalf<BoxedTransport>) -> Self {
        ConnWriter {
            writer,
            mux: ChunkMux::new(),
            out: ByteQueue::with_capacity(4096),
            interrupted: false,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Not cancel safe: dropping it mid-write marks the writer interrupted
    pub async fn send(&mut self, message: &RtmpMessage) -> Result<()> {
        if self.interrupted {
            return Err(Error::write_data("Stream broken by an interrupted write"));
        }
        self.out.pop_all();
        self.mux.write_message(message, &mut self.out)?;

        self.interrupted = true;
        self.writer
            .write_all(self.out.as_slice())
            .await
            .map_err(|e| Error::write_data(e.to_string()))?;
        self.interrupted = false;
        self.out.pop_all();
        self.writer
            .flush()
            .await
            .map_err(|e| Error::write_data(e.to_string()))
    }

    pub async fn send_all(&mut self, messages: &[RtmpMessage]) -> Result<()> {
        for message in messages {
            self.send(message).await?;
        }
        Ok(())
    }

    /// Announce and switch the outgoing chunk size
    pub async fn set_chunk_size(&mut self, size: usize) -> Result<()> {
        self.send(&ControlMessage::SetChunkSize(size as u32).encode()?).await?;
        self.mux.set_chunk_size(size)
    }

    pub async fn shutdown(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("Transport shutdown: {}", e);
        }
    }
}

/// Client side NetConnection: handshake plus command negotiation.
///
/// Messages that arrive during negotiation and are not part of it are kept
/// and handed out first by the reader after [`NetConnection::into_parts`].
pub struct NetConnection {
    reader: ConnReader,
    writer: ConnWriter,
    next_transaction: f64,
    deferred: VecDeque<RtmpMessage>,
}

impl NetConnection {
    /// Run the handshake over `transport` and switch to `chunk_size`
    pub async fn establish(mut transport: BoxedTransport, chunk_size: usize) -> Result<Self> {
        client_handshake(&mut transport).await?;
        let (read_half, write_half) = tokio::io::split(transport);
        let mut conn = NetConnection {
            reader: ConnReader::new(read_half),
            writer: ConnWriter::new(write_half),
            next_transaction: 1.0,
            deferred: VecDeque::new(),
        };
        conn.writer.set_chunk_size(chunk_size).await?;
        Ok(conn)
    }

    fn transaction(&mut self) -> f64 {
        let id = self.next_transaction;
        self.next_transaction += 1.0;
        id
    }

    async fn send_command(&mut self, stream_id: u32, payload: Vec<u8>) -> Result<()> {
        self.writer.send(&RtmpMessage::command(stream_id, payload)).await
    }

    /// Next message during negotiation, with control replies already sent
    async fn next_message(&mut self) -> Result<RtmpMessage> {
        let message = self.reader.recv().await?;
        let replies = self.reader.replies(&message)?;
        self.writer.send_all(&replies).await?;
        Ok(message)
    }

    /// Keep media, data and custom messages for the session; drop the rest
    fn defer(&mut self, message: RtmpMessage) {
        if message.is_audio() || message.is_video() || message.is_data() || message.is_custom_command() {
            self.deferred.push_back(message);
        } else if message.is_command() {
            if let Ok(cmd) = RtmpCommand::parse(&message.payload) {
                debug!("Ignoring {} during negotiation", cmd.name);
            }
        }
    }

    /// Wait for `_result` of `transaction_id`; `_error` fails the connect
    async fn wait_result(&mut self, transaction_id: f64) -> Result<RtmpMessage> {
        loop {
            let message = self.next_message().await?;
            if message.message_type == MSG_TYPE_COMMAND_AMF0 {
                let cmd = RtmpCommand::parse(&message.payload)?;
                if cmd.transaction_id == transaction_id {
                    match cmd.name {
                        "_result" => return Ok(message.clone()),
                        "_error" => {
                            let code = cmd.status_code().unwrap_or("unknown");
                            return Err(Error::connect_fail(format!("Server refused: {}", code)));
                        }
                        _ => {}
                    }
                }
            }
            self.defer(message);
        }
    }

    /// Wait for onStatus `code` on `stream_id`; an error level fails the connect
    async fn wait_status(&mut self, stream_id: u32, code: &str) -> Result<()> {
        loop {
            let message = self.next_message().await?;
            if message.message_type == MSG_TYPE_COMMAND_AMF0 && message.stream_id == stream_id {
                let cmd = RtmpCommand::parse(&message.payload)?;
                if cmd.name == "onStatus" {
                    let received = cmd.status_code().unwrap_or_default();
                    if cmd.status_level() == Some("error") {
                        return Err(Error::connect_fail(format!("Server refused: {}", received)));
                    }
                    if received == code {
                        return Ok(());
                    }
                    debug!("Status {} while waiting for {}", received, code);
                    continue;
                }
            }
            self.defer(message);
        }
    }

    /// `connect` to the URL's application
    pub async fn connect_app(&mut self, url: &RtmpUrl) -> Result<()> {
        let tid = self.transaction();
        self.send_command(0, RtmpCommand::connect(tid, &url.app, &url.tc_url())?).await?;
        let reply = self.wait_result(tid).await?;
        let cmd = RtmpCommand::parse(&reply.payload)?;
        match cmd.status_code() {
            Some(status::CONNECT_SUCCESS) | None => {
                debug!("Connected to app {}", url.app);
                Ok(())
            }
            Some(code) => Err(Error::connect_fail(format!("Connect answered with {}", code))),
        }
    }

    /// `createStream`, returning the new message stream id
    pub async fn create_stream(&mut self) -> Result<u32> {
        let tid = self.transaction();
        self.send_command(0, RtmpCommand::create_stream(tid)?).await?;
        let reply = self.wait_result(tid).await?;
        let cmd = RtmpCommand::parse(&reply.payload)?;
        let stream_id = cmd
            .arguments
            .first()
            .and_then(|v| v.as_number())
            .ok_or_else(|| Error::connect_fail("createStream result without stream id"))?;
        Ok(stream_id as u32)
    }

    /// releaseStream, FCPublish, createStream, publish; returns the stream id
    pub async fn publish(&mut self, url: &RtmpUrl) -> Result<u32> {
        let name = stream_name(&url.stream_key);
        let tid = self.transaction();
        self.send_command(0, RtmpCommand::release_stream(tid, name)?).await?;
        let tid = self.transaction();
        self.send_command(0, RtmpCommand::fc_publish(tid, name)?).await?;

        let stream_id = self.create_stream().await?;
        self.send_command(stream_id, RtmpCommand::publish(0.0, &url.stream_key, "live")?)
            .await?;
        self.wait_status(stream_id, status::PUBLISH_START).await?;
        debug!("Publishing {} on stream {}", url.stream_key, stream_id);
        Ok(stream_id)
    }

    /// createStream, buffer length, play; returns the stream id
    pub async fn play(&mut self, url: &RtmpUrl) -> Result<u32> {
        let stream_id = self.create_stream().await?;
        let buffer = ControlMessage::UserControl(UserControlEvent::SetBufferLength {
            stream_id,
            buffer_ms: PLAY_BUFFER_MS,
        });
        self.writer.send(&buffer.encode()?).await?;
        self.send_command(stream_id, RtmpCommand::play(0.0, &url.stream_key)?)
            .await?;
        self.wait_status(stream_id, status::PLAY_START).await?;
        debug!("Playing {} on stream {}", url.stream_key, stream_id);
        Ok(stream_id)
    }

    /// Send a message on the not yet split connection
    pub async fn send(&mut self, message: &RtmpMessage) -> Result<()> {
        self.writer.send(message).await
    }

    /// Split into reader and writer, deferred messages first in line
    pub fn into_parts(self) -> (ConnReader, ConnWriter) {
        let NetConnection {
            mut reader,
            writer,
            deferred,
            ..
        } = self;
        if !deferred.is_empty() {
            warn!("{} messages arrived before negotiation finished", deferred.len());
        }
        reader.pending.extend(deferred);
        (reader, writer)
    }
}
