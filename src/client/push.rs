use std::sync::Arc;
use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};
use crate::client::config::PushConfig;
use crate::client::events::CommandCallback;
use crate::client::link::SessionLink;
use crate::client::state::PushState;
use crate::connection::{connect_transport, ConnReader, ConnWriter, NetConnection};
use crate::processing::{
    encode_audio_frame, encode_audio_sequence_header, encode_video_frame,
    encode_video_sequence_header, resolve_key_frame, AudioFrame, AudioInfo, AvcDecoderConfig,
    StreamMetadata, VideoCodec, VideoFrame, VideoInfo,
};
use crate::protocol::{stream_name, RtmpCommand, RtmpMessage, RtmpUrl};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct PushMedia {
    audio: Option<AudioInfo>,
    video: Option<VideoInfo>,
    /// AVC sequence header already on the wire
    video_header_sent: bool,
}

struct PushShared {
    config: PushConfig,
    url: RtmpUrl,
    state: RwLock<PushState>,
    media: Mutex<PushMedia>,
    link: SessionLink,
}

/// Publishing client session.
///
/// Cheap to clone; all clones drive the same session, so `close()` may be
/// called from another task while `connect` or a push is in flight.
#[derive(Clone)]
pub struct PushSession {
    shared: Arc<PushShared>,
}

impl PushSession {
    /// Create a session in IDLE
    pub fn open(config: PushConfig) -> Result<Self> {
        let url = config.validate()?;
        let link = SessionLink::new(config.event_cb.clone(), config.command_cb.clone());
        Ok(PushSession {
            shared: Arc::new(PushShared {
                config,
                url,
                state: RwLock::new(PushState::Idle),
                media: Mutex::new(PushMedia::default()),
                link,
            }),
        })
    }

    pub async fn state(&self) -> PushState {
        *self.shared.state.read().await
    }

    pub fn url(&self) -> &RtmpUrl {
        &self.shared.url
    }

    pub async fn set_audio_info(&self, audio: AudioInfo) -> Result<()> {
        audio.validate()?;
        let mut state = self.shared.state.write().await;
        if !state.can_set_info() {
            return Err(Error::wrong_state(format!("Cannot set audio info in {}", state)));
        }
        self.shared.media.lock().await.audio = Some(audio);
        *state = PushState::InfoSet;
        Ok(())
    }

    pub async fn set_video_info(&self, video: VideoInfo) -> Result<()> {
        video.validate()?;
        let mut state = self.shared.state.write().await;
        if !state.can_set_info() {
            return Err(Error::wrong_state(format!("Cannot set video info in {}", state)));
        }
        self.shared.media.lock().await.video = Some(video);
        *state = PushState::InfoSet;
        Ok(())
    }

    /// Handshake, connect, publish and send stream headers.
    ///
    /// Ends in PUBLISHING, or in CLOSED with `ConnectFail`.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.shared.state.write().await;
            if !state.can_connect() {
                return Err(Error::wrong_state(format!("Cannot connect in {}", state)));
            }
            *state = PushState::Connecting;
        }
        info!("Push session connecting to {}", self.shared.config.url);

        let result = self
            .shared
            .link
            .negotiate(self.shared.config.connect_timeout, self.negotiate())
            .await;

        let mut state = self.shared.state.write().await;
        match result {
            Ok(_) if state.is_closed() => {
                *state = PushState::Closed;
                Err(Error::connect_fail("Closed while connecting"))
            }
            Ok((reader, writer, stream_id)) => {
                self.shared.link.attach(writer, stream_id).await;
                let handle = tokio::spawn(receive_loop(self.shared.clone(), reader));
                self.shared.link.set_task(handle);
                *state = PushState::Publishing;
                info!("Publishing {}", self.shared.url.stream_key);
                Ok(())
            }
            Err(e) => {
                warn!("Push connect failed: {}", e);
                *state = PushState::Closed;
                Err(e)
            }
        }
    }

    async fn negotiate(&self) -> Result<(ConnReader, ConnWriter, u32)> {
        let url = &self.shared.url;
        let transport = connect_transport(url, self.shared.config.tls.as_ref()).await?;
        let mut conn = NetConnection::establish(transport, self.shared.config.chunk_size as usize).await?;
        conn.connect_app(url).await?;
        let stream_id = conn.publish(url).await?;

        for message in self.stream_headers(stream_id).await? {
            conn.send(&message).await?;
        }
        let (reader, writer) = conn.into_parts();
        Ok((reader, writer, stream_id))
    }

    /// Metadata plus the sequence headers known up front
    async fn stream_headers(&self, stream_id: u32) -> Result<Vec<RtmpMessage>> {
        let mut media = self.shared.media.lock().await;
        let metadata = StreamMetadata::from_info(media.audio.as_ref(), media.video.as_ref());
        let mut messages = vec![RtmpMessage::data(stream_id, 0, metadata.encode_set_data_frame()?)];

        if let Some(audio) = &media.audio {
            if let Some(header) = encode_audio_sequence_header(audio)? {
                messages.push(RtmpMessage::audio(stream_id, 0, header));
            }
        }

        media.video_header_sent = false;
        if let Some(VideoInfo { codec: VideoCodec::H264, codec_spec_info: Some(spec), .. }) = &media.video {
            let config = AvcDecoderConfig::from_annexb(spec)?;
            messages.push(RtmpMessage::video(stream_id, 0, encode_video_sequence_header(&config)?));
            media.video_header_sent = true;
        }
        Ok(messages)
    }

    async fn ensure_publishing(&self) -> Result<()> {
        let state = self.shared.state.read().await;
        if !state.is_publishing() {
            return Err(Error::wrong_state(format!("Not publishing ({})", state)));
        }
        Ok(())
    }

    pub async fn push_audio(&self, frame: &AudioFrame) -> Result<()> {
        self.ensure_publishing().await?;
        if frame.data.is_empty() {
            return Ok(());
        }
        let payload = {
            let media = self.shared.media.lock().await;
            let audio = media
                .audio
                .as_ref()
                .ok_or_else(|| Error::wrong_state("No audio info set"))?;
            encode_audio_frame(audio, &frame.data)?
        };
        let stream_id = self.shared.link.stream_id();
        self.shared
            .link
            .send(&[RtmpMessage::audio(stream_id, frame.pts, payload)])
            .await
    }

    /// Send one video frame; H264 data is Annex-B
    pub async fn push_video(&self, frame: &VideoFrame) -> Result<()> {
        self.ensure_publishing().await?;
        if frame.data.is_empty() {
            return Ok(());
        }
        let stream_id = self.shared.link.stream_id();
        let mut messages = Vec::with_capacity(2);
        {
            let mut media = self.shared.media.lock().await;
            let codec = media
                .video
                .as_ref()
                .map(|v| v.codec)
                .ok_or_else(|| Error::wrong_state("No video info set"))?;
            let key_frame = resolve_key_frame(codec, frame, self.shared.config.fix_key_frame);

            if codec == VideoCodec::H264 && !media.video_header_sent {
                // Parameter sets come with the first key frame
                if !key_frame {
                    debug!("Dropping frame at {} before the first key frame", frame.pts);
                    return Ok(());
                }
                let config = AvcDecoderConfig::from_annexb(&frame.data)?;
                messages.push(RtmpMessage::video(
                    stream_id,
                    frame.pts,
                    encode_video_sequence_header(&config)?,
                ));
                if let Some(video) = media.video.as_mut() {
                    video.codec_spec_info = Some(config.to_annexb());
                }
                media.video_header_sent = true;
            }

            let payload = encode_video_frame(codec, key_frame, &frame.data)?;
            messages.push(RtmpMessage::video(stream_id, frame.pts, payload));
        }
        self.shared.link.send(&messages).await
    }

    /// Custom command for the server side of this crate
    pub async fn send_command(&self, payload: &[u8]) -> Result<()> {
        self.ensure_publishing().await?;
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

    /// Close from any state; safe while another task is inside a call
    pub async fn close(&self) -> Result<()> {
        let was_publishing = {
            let mut state = self.shared.state.write().await;
            if *state == PushState::Closed {
                return Ok(());
            }
            let was_publishing = state.is_publishing();
            *state = PushState::Closing;
            was_publishing
        };

        let mut farewell = Vec::new();
        if was_publishing {
            let stream_id = self.shared.link.stream_id();
            let name = stream_name(&self.shared.url.stream_key);
            farewell.push(RtmpMessage::command(0, RtmpCommand::fc_unpublish(0.0, name)?));
            farewell.push(RtmpMessage::command(stream_id, RtmpCommand::delete_stream(0.0, stream_id)?));
        }
        self.shared.link.close(&farewell).await;

        *self.shared.state.write().await = PushState::Closed;
        info!("Push session closed");
        Ok(())
    }
}

/// Serve control traffic and custom commands while publishing
async fn receive_loop(shared: Arc<PushShared>, mut reader: ConnReader) {
    while let Some(result) = shared.link.recv(&mut reader).await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                shared.link.closed_by_peer(&e);
                return;
            }
        };

        if let Err(e) = shared.link.reply(&mut reader, &message).await {
            shared.link.closed_by_peer(&e);
            return;
        }

        if message.is_custom_command() {
            shared.link.dispatch_command(&message.payload);
        } else if message.is_command() {
            if let Ok(cmd) = RtmpCommand::parse(&message.payload) {
                debug!("Server sent {} {}", cmd.name, cmd.status_code().unwrap_or_default());
            }
        }
    }
}
