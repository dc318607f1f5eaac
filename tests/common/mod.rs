// Shared helpers for the integration tests: a local server plus
// push and source sessions pointed at it.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rtmp::{
    PushConfig, PushSession, RtmpServer, ServerConfig, ServerConfigBuilder, SourceConfig,
    SourceConfigBuilder, SourceFrame, SourceStreamInfo, VideoCodec, VideoInfo,
};

/// Upper bound for any single step of a test
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Start a server on 127.0.0.1:`port`, letting the test adjust the config
pub async fn start_server<F>(port: u16, tweak: F) -> RtmpServer
where
    F: FnOnce(ServerConfigBuilder) -> ServerConfigBuilder,
{
    init_logging();
    let builder = ServerConfig::builder().host("127.0.0.1").port(port);
    let config = tweak(builder).build().expect("server config");
    let server = RtmpServer::open(config).expect("open server");
    server.setup().await.expect("setup server");
    server
}

pub fn stream_url(port: u16, key: &str) -> String {
    format!("rtmp://127.0.0.1:{}/live/{}", port, key)
}

pub fn push_config(port: u16, key: &str) -> PushConfig {
    PushConfig::builder()
        .url(stream_url(port, key))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .expect("push config")
}

pub fn source_builder(port: u16, key: &str) -> SourceConfigBuilder {
    SourceConfig::builder()
        .url(stream_url(port, key))
        .connect_timeout(Duration::from_secs(5))
}

/// SPS and PPS as Annex-B with 4-byte start codes
pub fn h264_codec_data() -> Vec<u8> {
    vec![
        0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE8, //
        0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80,
    ]
}

/// IDR access unit tagged with `marker`
pub fn idr_frame(marker: u8) -> Vec<u8> {
    let mut frame = vec![0, 0, 0, 1, 0x65, 0x88, 0x84, marker];
    frame.extend(std::iter::repeat_n(marker, 64));
    frame
}

/// Non-IDR slice tagged with `marker`
pub fn inter_frame(marker: u8) -> Vec<u8> {
    let mut frame = vec![0, 0, 0, 1, 0x41, 0x9A, marker];
    frame.extend(std::iter::repeat_n(marker, 32));
    frame
}

pub fn h264_info() -> VideoInfo {
    VideoInfo::new(VideoCodec::H264, 640, 360, 25).with_spec_info(h264_codec_data())
}

/// Open, describe and connect a H264 publisher
pub async fn start_h264_push(port: u16, key: &str) -> rtmp::Result<PushSession> {
    let push = PushSession::open(push_config(port, key))?;
    push.set_video_info(h264_info()).await?;
    push.connect().await?;
    Ok(push)
}

/// Everything a callback-mode source reported
#[derive(Default, Clone)]
pub struct Collected {
    pub infos: Arc<Mutex<Vec<SourceStreamInfo>>>,
    pub frames: Arc<Mutex<Vec<SourceFrame>>>,
}

impl Collected {
    /// Attach stream and data callbacks that record into `self`
    pub fn attach(&self, builder: SourceConfigBuilder) -> SourceConfigBuilder {
        let infos = self.infos.clone();
        let frames = self.frames.clone();
        builder
            .stream_cb(move |info: &SourceStreamInfo| infos.lock().unwrap().push(info.clone()))
            .data_cb(move |frame: &SourceFrame| frames.lock().unwrap().push(frame.clone()))
    }

    pub fn video_frames(&self) -> Vec<rtmp::VideoFrame> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter_map(|f| match f {
                SourceFrame::Video(v) => Some(v.clone()),
                SourceFrame::Audio(_) => None,
            })
            .collect()
    }

    pub fn audio_count(&self) -> usize {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|f| matches!(f, SourceFrame::Audio(_)))
            .count()
    }
}

/// Poll `cond` until it holds or `STEP_TIMEOUT` runs out
pub async fn wait_until<F>(mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

pub async fn with_timeout<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(STEP_TIMEOUT, fut)
        .await
        .expect("step timed out")
}
