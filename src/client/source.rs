use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use log::{debug, info, warn};
use tokio::sync::RwLock;
use crate::client::config::SourceConfig;
use crate::client::events::{CommandCallback, SourceFrame, SourceStreamInfo};
use crate::client::fifo::MediaFifo;
use crate::client::link::SessionLink;
use crate::client::state::SourceState;
use crate::connection::{connect_transport, ConnReader, ConnWriter, NetConnection};
use crate::processing::{
    avcc_to_annexb, parse_aac_config, AudioFrame, AudioInfo, AudioPacket, AudioTag,
    AvcDecoderConfig, FlvMuxer, StreamMetadata, VideoCodec, VideoFrame, VideoInfo, VideoPacket,
    VideoTag, FLV_TAG_AUDIO, FLV_TAG_SCRIPT, FLV_TAG_VIDEO,
};
use crate::protocol::{RtmpCommand, RtmpData, RtmpMessage, RtmpUrl};
use crate::{Error, Result};

struct SourceShared {
    config: SourceConfig,
    url: RtmpUrl,
    state: RwLock<SourceState>,
    info: RwLock<SourceStreamInfo>,
    fifo: MediaFifo,
    media_enabled: AtomicBool,
    /// Start a fresh FLV stream with the next message
    restart: AtomicBool,
    link: SessionLink,
}

/// Playing client session.
///
/// In FLV mode the received stream is readable as an FLV byte stream through
/// [`SourceSession::read`]; in callback mode frames go to `data_cb`.
#[derive(Clone)]
pub struct SourceSession {
    shared: Arc<SourceShared>,
}

impl SourceSession {
    pub fn open(config: SourceConfig) -> Result<Self> {
        let url = config.validate()?;
        let link = SessionLink::new(config.event_cb.clone(), config.command_cb.clone());
        let fifo = MediaFifo::new(config.fifo_size);
        Ok(SourceSession {
            shared: Arc::new(SourceShared {
                config,
                url,
                state: RwLock::new(SourceState::Idle),
                info: RwLock::new(SourceStreamInfo::default()),
                fifo,
                media_enabled: AtomicBool::new(true),
                restart: AtomicBool::new(false),
                link,
            }),
        })
    }

    pub async fn state(&self) -> SourceState {
        *self.shared.state.read().await
    }

    pub fn url(&self) -> &RtmpUrl {
        &self.shared.url
    }

    /// Audio codec seen on the stream so far
    pub async fn audio_info(&self) -> Option<AudioInfo> {
        self.shared.info.read().await.audio.clone()
    }

    pub async fn video_info(&self) -> Option<VideoInfo> {
        self.shared.info.read().await.video.clone()
    }

    /// Handshake, connect and play; starts the receive loop
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.shared.state.write().await;
            if !state.can_connect() {
                return Err(Error::wrong_state(format!("Cannot connect in {}", state)));
            }
            *state = SourceState::Connecting;
        }
        info!("Source session connecting to {}", self.shared.config.url);

        let result = self
            .shared
            .link
            .negotiate(self.shared.config.connect_timeout, self.negotiate())
            .await;

        let mut state = self.shared.state.write().await;
        match result {
            Ok(_) if *state == SourceState::Closed => Err(Error::connect_fail("Closed while connecting")),
            Ok((reader, writer, stream_id)) => {
                self.shared.link.attach(writer, stream_id).await;
                let demux = SourceDemux::new(self.shared.config.is_callback_mode());
                let handle = tokio::spawn(receive_loop(self.shared.clone(), reader, demux));
                self.shared.link.set_task(handle);
                *state = SourceState::Playing;
                info!("Playing {}", self.shared.url.stream_key);
                Ok(())
            }
            Err(e) => {
                warn!("Source connect failed: {}", e);
                *state = SourceState::Closed;
                self.shared.fifo.close();
                Err(e)
            }
        }
    }

    async fn negotiate(&self) -> Result<(ConnReader, ConnWriter, u32)> {
        let url = &self.shared.url;
        let transport = connect_transport(url, self.shared.config.tls.as_ref()).await?;
        let mut conn = NetConnection::establish(transport, self.shared.config.chunk_size as usize).await?;
        conn.connect_app(url).await?;
        let stream_id = conn.play(url).await?;
        let (reader, writer) = conn.into_parts();
        Ok((reader, writer, stream_id))
    }

    async fn ensure_playing(&self) -> Result<()> {
        let state = self.shared.state.read().await;
        if !state.is_playing() {
            return Err(Error::wrong_state(format!("Not playing ({})", state)));
        }
        Ok(())
    }

    /// Fill `buf` with FLV bytes, waiting until enough arrived.
    ///
    /// Fails with `ReadData` when the session is closed or the server ends it.
    pub async fn read(&self, buf: &mut [u8]) -> Result<()> {
        if self.shared.config.is_callback_mode() {
            return Err(Error::not_supported("read is unavailable in callback mode"));
        }
        self.ensure_playing().await?;
        self.shared.fifo.read_exact(buf).await
    }

    /// Pause or resume media delivery
    pub async fn receive_media(&self, allow: bool) -> Result<()> {
        self.ensure_playing().await?;
        if self.shared.media_enabled.swap(allow, Ordering::SeqCst) == allow {
            return Ok(());
        }
        if allow {
            self.shared.restart.store(true, Ordering::SeqCst);
        }
        let stream_id = self.shared.link.stream_id();
        self.shared
            .link
            .send(&[
                RtmpMessage::command(stream_id, RtmpCommand::receive("receiveAudio", allow)?),
                RtmpMessage::command(stream_id, RtmpCommand::receive("receiveVideo", allow)?),
            ])
            .await
    }

    /// Custom command for the stream's publisher
    pub async fn send_command(&self, payload: &[u8]) -> Result<()> {
        self.ensure_playing().await?;
        let stream_id = self.shared.link.stream_id();
        self.shared
            .link
            .send(&[RtmpMessage::custom_command(stream_id, payload.to_vec())])
            .await
    }

    pub fn set_command_cb<F>(&self, cb: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let cb: CommandCallback = Arc::new(cb);
        self.shared.link.set_command_cb(Some(cb));
    }

    /// Close from any state; a blocked `read` returns `ReadData`
    pub async fn close(&self) -> Result<()> {
        let was_playing = {
            let mut state = self.shared.state.write().await;
            if *state == SourceState::Closed {
                return Ok(());
            }
            let was_playing = state.is_playing();
            *state = SourceState::Closed;
            was_playing
        };
        self.shared.fifo.close();

        let mut farewell = Vec::new();
        if was_playing {
            let stream_id = self.shared.link.stream_id();
            farewell.push(RtmpMessage::command(stream_id, RtmpCommand::delete_stream(0.0, stream_id)?));
        }
        self.shared.link.close(&farewell).await;
        info!("Source session closed");
        Ok(())
    }
}

async fn receive_loop(shared: Arc<SourceShared>, mut reader: ConnReader, mut demux: SourceDemux) {
    while let Some(result) = shared.link.recv(&mut reader).await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                shared.fifo.close();
                shared.link.closed_by_peer(&e);
                return;
            }
        };

        if let Err(e) = shared.link.reply(&mut reader, &message).await {
            shared.fifo.close();
            shared.link.closed_by_peer(&e);
            return;
        }

        if let Err(e) = demux.handle(&shared, &message).await {
            if shared.fifo.is_closed() {
                return;
            }
            warn!("Dropping message type {}: {}", message.message_type, e);
        }
    }
}

/// Turns received messages into FLV bytes or frame callbacks
struct SourceDemux {
    callback_mode: bool,
    metadata: Option<StreamMetadata>,
    metadata_tag: Option<Vec<u8>>,
    audio_header: Option<Vec<u8>>,
    video_header: Option<Vec<u8>>,
    flv_started: bool,
}

impl SourceDemux {
    fn new(callback_mode: bool) -> Self {
        SourceDemux {
            callback_mode,
            metadata: None,
            metadata_tag: None,
            audio_header: None,
            video_header: None,
            flv_started: false,
        }
    }

    async fn handle(&mut self, shared: &SourceShared, message: &RtmpMessage) -> Result<()> {
        if shared.restart.swap(false, Ordering::SeqCst) {
            debug!("Restarting FLV output");
            self.flv_started = false;
            shared.fifo.clear();
        }

        if message.is_custom_command() {
            shared.link.dispatch_command(&message.payload);
            return Ok(());
        }
        if message.is_command() {
            let cmd = RtmpCommand::parse(&message.payload)?;
            debug!("Server sent {} {}", cmd.name, cmd.status_code().unwrap_or_default());
            return Ok(());
        }
        // Headers and metadata are tracked while paused; only output stops
        if message.is_data() {
            return self.on_data(shared, message).await;
        }
        if message.is_audio() {
            self.on_audio(shared, message).await
        } else if message.is_video() {
            self.on_video(shared, message).await
        } else {
            Ok(())
        }
    }

    async fn on_data(&mut self, shared: &SourceShared, message: &RtmpMessage) -> Result<()> {
        let data = RtmpData::parse(&message.payload)?;
        let Some(metadata) = StreamMetadata::from_data(&data) else {
            debug!("Ignoring data message {}", data.name);
            return Ok(());
        };

        let tag = metadata.encode_on_metadata()?;
        {
            let mut info = shared.info.write().await;
            if let Some(video) = info.video.as_mut() {
                apply_dimensions(video, &metadata);
            }
        }
        self.metadata = Some(metadata);
        self.metadata_tag = Some(tag.clone());
        self.emit(shared, FLV_TAG_SCRIPT, 0, &tag, true).await
    }

    async fn on_audio(&mut self, shared: &SourceShared, message: &RtmpMessage) -> Result<()> {
        let tag = AudioTag::parse(&message.payload)?;
        let codec = tag
            .codec()
            .ok_or_else(|| Error::bad_data(format!("Unknown sound format {}", tag.sound_format)))?;

        match tag.packet {
            AudioPacket::SequenceHeader(config) => {
                let (sample_rate, channels) = parse_aac_config(config)?;
                let audio = AudioInfo::new(codec, sample_rate, channels).with_spec_info(config);
                self.audio_header = Some(message.payload.to_vec());
                self.update_audio(shared, audio).await;
                self.emit(shared, FLV_TAG_AUDIO, message.timestamp, &message.payload, true)
                    .await
            }
            AudioPacket::Raw(data) => {
                if shared.info.read().await.audio.is_none() {
                    let mut audio = AudioInfo::new(codec, tag.sample_rate, tag.channels);
                    audio.bits_per_sample = tag.bits_per_sample;
                    self.update_audio(shared, audio).await;
                }
                if self.callback_mode {
                    let frame = AudioFrame::new(message.timestamp, message.payload.slice_ref(data));
                    self.deliver(shared, SourceFrame::Audio(frame));
                    return Ok(());
                }
                self.emit(shared, FLV_TAG_AUDIO, message.timestamp, &message.payload, false)
                    .await
            }
        }
    }

    async fn on_video(&mut self, shared: &SourceShared, message: &RtmpMessage) -> Result<()> {
        let tag = VideoTag::parse(&message.payload)?;
        let codec = tag
            .codec()
            .ok_or_else(|| Error::bad_data(format!("Unknown video codec {}", tag.codec_id)))?;

        match tag.packet {
            VideoPacket::SequenceHeader(record) => {
                let config = AvcDecoderConfig::parse(record)?;
                let mut video = VideoInfo::new(codec, 0, 0, 0).with_spec_info(config.to_annexb());
                if let Some(metadata) = &self.metadata {
                    apply_dimensions(&mut video, metadata);
                }
                self.video_header = Some(message.payload.to_vec());
                self.update_video(shared, video).await;
                self.emit(shared, FLV_TAG_VIDEO, message.timestamp, &message.payload, true)
                    .await
            }
            VideoPacket::Nalus { data, .. } => {
                self.ensure_video(shared, codec).await;
                if self.callback_mode {
                    let frame = VideoFrame::new(message.timestamp, tag.is_key_frame(), avcc_to_annexb(data)?);
                    self.deliver(shared, SourceFrame::Video(frame));
                    return Ok(());
                }
                self.emit(shared, FLV_TAG_VIDEO, message.timestamp, &message.payload, false)
                    .await
            }
            VideoPacket::Raw(data) => {
                self.ensure_video(shared, codec).await;
                if self.callback_mode {
                    let frame = VideoFrame::new(message.timestamp, true, message.payload.slice_ref(data));
                    self.deliver(shared, SourceFrame::Video(frame));
                    return Ok(());
                }
                self.emit(shared, FLV_TAG_VIDEO, message.timestamp, &message.payload, false)
                    .await
            }
            VideoPacket::EndOfSequence => {
                if self.callback_mode {
                    let mut frame = VideoFrame::new(message.timestamp, false, Vec::new());
                    frame.eos = true;
                    self.deliver(shared, SourceFrame::Video(frame));
                    return Ok(());
                }
                self.emit(shared, FLV_TAG_VIDEO, message.timestamp, &message.payload, false)
                    .await
            }
        }
    }

    /// Record a video codec seen without a sequence header
    async fn ensure_video(&self, shared: &SourceShared, codec: VideoCodec) {
        if shared.info.read().await.video.is_some() {
            return;
        }
        let mut video = VideoInfo::new(codec, 0, 0, 0);
        if let Some(metadata) = &self.metadata {
            apply_dimensions(&mut video, metadata);
        }
        self.update_video(shared, video).await;
    }

    async fn update_audio(&self, shared: &SourceShared, audio: AudioInfo) {
        let snapshot = {
            let mut info = shared.info.write().await;
            if info.audio.as_ref() == Some(&audio) {
                return;
            }
            info.audio = Some(audio);
            info.clone()
        };
        self.announce(shared, &snapshot);
    }

    async fn update_video(&self, shared: &SourceShared, video: VideoInfo) {
        let snapshot = {
            let mut info = shared.info.write().await;
            if info.video.as_ref() == Some(&video) {
                return;
            }
            info.video = Some(video);
            info.clone()
        };
        self.announce(shared, &snapshot);
    }

    fn announce(&self, shared: &SourceShared, info: &SourceStreamInfo) {
        debug!(
            "Stream info: audio {:?}, video {:?}",
            info.audio.as_ref().map(|a| a.codec.name()),
            info.video.as_ref().map(|v| v.codec.name())
        );
        if let Some(cb) = &shared.config.stream_cb {
            cb(info);
        }
    }

    fn deliver(&self, shared: &SourceShared, frame: SourceFrame) {
        if !shared.media_enabled.load(Ordering::SeqCst) {
            return;
        }
        if let Some(cb) = &shared.config.data_cb {
            cb(&frame);
        }
    }

    /// FLV header followed by cached metadata and sequence headers
    async fn start_flv(&mut self, shared: &SourceShared) -> Result<()> {
        let (has_audio, has_video) = match &self.metadata {
            Some(metadata) if metadata.has_audio() || metadata.has_video() => {
                (metadata.has_audio(), metadata.has_video())
            }
            _ => (true, true),
        };
        let mut out = FlvMuxer::header(has_audio, has_video)?;
        if let Some(tag) = &self.metadata_tag {
            out.extend(FlvMuxer::tag(FLV_TAG_SCRIPT, 0, tag)?);
        }
        if let Some(header) = &self.audio_header {
            out.extend(FlvMuxer::tag(FLV_TAG_AUDIO, 0, header)?);
        }
        if let Some(header) = &self.video_header {
            out.extend(FlvMuxer::tag(FLV_TAG_VIDEO, 0, header)?);
        }
        self.flv_started = true;
        shared.fifo.write(&out).await
    }

    /// Append one tag to the FLV output. `cached` tags are part of the
    /// stream preamble and are written by `start_flv` when it runs.
    async fn emit(
        &mut self,
        shared: &SourceShared,
        tag_type: u8,
        timestamp: u32,
        payload: &[u8],
        cached: bool,
    ) -> Result<()> {
        if self.callback_mode || !shared.media_enabled.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !self.flv_started {
            self.start_flv(shared).await?;
            if cached {
                return Ok(());
            }
        }
        shared.fifo.write(&FlvMuxer::tag(tag_type, timestamp, payload)?).await
    }
}

fn apply_dimensions(video: &mut VideoInfo, metadata: &StreamMetadata) {
    if let Some(width) = metadata.width {
        video.width = width as u16;
    }
    if let Some(height) = metadata.height {
        video.height = height as u16;
    }
    if let Some(fps) = metadata.framerate {
        video.fps = fps as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{encode_video_frame, encode_video_sequence_header, FLV_HEADER_SIZE};
    use std::sync::Mutex;

    fn shared(config: SourceConfig) -> SourceShared {
        let url = config.validate().unwrap();
        SourceShared {
            fifo: MediaFifo::new(config.fifo_size),
            link: SessionLink::new(None, None),
            config,
            url,
            state: RwLock::new(SourceState::Playing),
            info: RwLock::new(SourceStreamInfo::default()),
            media_enabled: AtomicBool::new(true),
            restart: AtomicBool::new(false),
        }
    }

    fn codec_data() -> Vec<u8> {
        vec![0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1F, 0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80]
    }

    fn sequence_header() -> RtmpMessage {
        let config = AvcDecoderConfig::from_annexb(&codec_data()).unwrap();
        RtmpMessage::video(1, 0, encode_video_sequence_header(&config).unwrap())
    }

    #[tokio::test]
    async fn test_flv_output_starts_with_preamble() {
        let shared = shared(
            SourceConfig::builder()
                .url("rtmp://127.0.0.1/live/cam")
                .build()
                .unwrap(),
        );
        let mut demux = SourceDemux::new(false);

        demux.handle(&shared, &sequence_header()).await.unwrap();
        let frame = encode_video_frame(VideoCodec::H264, true, &[0, 0, 0, 1, 0x65, 1]).unwrap();
        demux
            .handle(&shared, &RtmpMessage::video(1, 40, frame.clone()))
            .await
            .unwrap();

        let header_tag = FlvMuxer::tag(FLV_TAG_VIDEO, 0, &sequence_header().payload).unwrap();
        let frame_tag = FlvMuxer::tag(FLV_TAG_VIDEO, 40, &frame).unwrap();
        let mut buf = vec![0u8; FLV_HEADER_SIZE + header_tag.len() + frame_tag.len()];
        shared.fifo.read_exact(&mut buf).await.unwrap();

        assert_eq!(&buf[..3], b"FLV");
        assert_eq!(&buf[FLV_HEADER_SIZE..FLV_HEADER_SIZE + header_tag.len()], &header_tag[..]);
        assert_eq!(&buf[FLV_HEADER_SIZE + header_tag.len()..], &frame_tag[..]);
        assert!(shared.fifo.is_empty());

        let video = shared.info.read().await.video.clone().unwrap();
        assert_eq!(video.codec_spec_info, Some(codec_data()));
    }

    #[tokio::test]
    async fn test_callback_mode_frames() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let infos = Arc::new(Mutex::new(Vec::new()));
        let config = {
            let frames = frames.clone();
            let infos = infos.clone();
            SourceConfig::builder()
                .url("rtmp://127.0.0.1/live/cam")
                .data_cb(move |frame| frames.lock().unwrap().push(frame.clone()))
                .stream_cb(move |info| infos.lock().unwrap().push(info.clone()))
                .build()
                .unwrap()
        };
        let shared = shared(config);
        let mut demux = SourceDemux::new(true);

        demux.handle(&shared, &sequence_header()).await.unwrap();
        let payload = encode_video_frame(VideoCodec::H264, true, &[0, 0, 0, 1, 0x65, 7, 8]).unwrap();
        demux
            .handle(&shared, &RtmpMessage::video(1, 80, payload))
            .await
            .unwrap();

        let infos = infos.lock().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].video.as_ref().unwrap().codec_spec_info, Some(codec_data()));

        let frames = frames.lock().unwrap();
        assert_eq!(
            frames[..],
            [SourceFrame::Video(VideoFrame::new(80, true, vec![0, 0, 0, 1, 0x65, 7, 8]))]
        );
        assert!(shared.fifo.is_empty());
    }

    #[tokio::test]
    async fn test_restart_replays_headers() {
        let shared = shared(
            SourceConfig::builder()
                .url("rtmp://127.0.0.1/live/cam")
                .build()
                .unwrap(),
        );
        let mut demux = SourceDemux::new(false);
        demux.handle(&shared, &sequence_header()).await.unwrap();
        let first_len = shared.fifo.len();

        shared.restart.store(true, Ordering::SeqCst);
        let frame = encode_video_frame(VideoCodec::H264, true, &[0, 0, 0, 1, 0x65, 1]).unwrap();
        demux
            .handle(&shared, &RtmpMessage::video(1, 1000, frame.clone()))
            .await
            .unwrap();

        let frame_tag = FlvMuxer::tag(FLV_TAG_VIDEO, 1000, &frame).unwrap();
        assert_eq!(shared.fifo.len(), first_len + frame_tag.len());
    }

    #[tokio::test]
    async fn test_paused_media_is_dropped() {
        let shared = shared(
            SourceConfig::builder()
                .url("rtmp://127.0.0.1/live/cam")
                .build()
                .unwrap(),
        );
        shared.media_enabled.store(false, Ordering::SeqCst);
        let mut demux = SourceDemux::new(false);
        demux.handle(&shared, &sequence_header()).await.unwrap();
        let frame = encode_video_frame(VideoCodec::H264, true, &[0, 0, 0, 1, 0x65, 1]).unwrap();
        demux
            .handle(&shared, &RtmpMessage::video(1, 40, frame))
            .await
            .unwrap();
        assert!(shared.fifo.is_empty());
    }

    #[tokio::test]
    async fn test_header_received_while_paused_is_replayed() {
        let shared = shared(
            SourceConfig::builder()
                .url("rtmp://127.0.0.1/live/cam")
                .build()
                .unwrap(),
        );
        let mut demux = SourceDemux::new(false);
        shared.media_enabled.store(false, Ordering::SeqCst);
        demux.handle(&shared, &sequence_header()).await.unwrap();
        assert!(shared.fifo.is_empty());
        let video = shared.info.read().await.video.clone().unwrap();
        assert_eq!(video.codec_spec_info, Some(codec_data()));

        // Resume the way receive_media(true) does
        shared.media_enabled.store(true, Ordering::SeqCst);
        shared.restart.store(true, Ordering::SeqCst);
        let frame = encode_video_frame(VideoCodec::H264, true, &[0, 0, 0, 1, 0x65, 1]).unwrap();
        demux
            .handle(&shared, &RtmpMessage::video(1, 80, frame.clone()))
            .await
            .unwrap();

        let header_tag = FlvMuxer::tag(FLV_TAG_VIDEO, 0, &sequence_header().payload).unwrap();
        let frame_tag = FlvMuxer::tag(FLV_TAG_VIDEO, 80, &frame).unwrap();
        let mut buf = vec![0u8; FLV_HEADER_SIZE + header_tag.len() + frame_tag.len()];
        shared.fifo.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[FLV_HEADER_SIZE..FLV_HEADER_SIZE + header_tag.len()], &header_tag[..]);
        assert_eq!(&buf[FLV_HEADER_SIZE + header_tag.len()..], &frame_tag[..]);
        assert!(shared.fifo.is_empty());
    }

    #[tokio::test]
    async fn test_callback_mode_announces_while_paused() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let infos = Arc::new(Mutex::new(Vec::new()));
        let config = {
            let frames = frames.clone();
            let infos = infos.clone();
            SourceConfig::builder()
                .url("rtmp://127.0.0.1/live/cam")
                .data_cb(move |frame| frames.lock().unwrap().push(frame.clone()))
                .stream_cb(move |info| infos.lock().unwrap().push(info.clone()))
                .build()
                .unwrap()
        };
        let shared = shared(config);
        shared.media_enabled.store(false, Ordering::SeqCst);
        let mut demux = SourceDemux::new(true);

        demux.handle(&shared, &sequence_header()).await.unwrap();
        let payload = encode_video_frame(VideoCodec::H264, true, &[0, 0, 0, 1, 0x65, 7]).unwrap();
        demux
            .handle(&shared, &RtmpMessage::video(1, 40, payload))
            .await
            .unwrap();

        assert_eq!(infos.lock().unwrap().len(), 1);
        assert!(frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_requires_playing() {
        let session = SourceSession::open(
            SourceConfig::builder()
                .url("rtmp://127.0.0.1:1/live/cam")
                .build()
                .unwrap(),
        )
        .unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(session.read(&mut buf).await, Err(Error::WrongState(_))));
        assert!(matches!(session.connect().await, Err(Error::ConnectFail(_))));
        assert_eq!(session.state().await, SourceState::Closed);
        assert!(matches!(session.connect().await, Err(Error::WrongState(_))));
    }
}
