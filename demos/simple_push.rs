// Simple Push Demo
//
// Publishes a synthetic H264 + AAC stream. The frames are placeholders, so
// players will see the stream but not decode a picture.
//
// Usage:
//   cargo run --example simple_push -- rtmp://127.0.0.1/live/demo

use std::time::Duration;
use log::{info, warn};
use rtmp::{
    AudioCodec, AudioFrame, AudioInfo, PushConfig, PushSession, Result, RtmpEvent, VideoCodec,
    VideoFrame, VideoInfo,
};

const SPS_PPS: [u8; 21] = [
    0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE8, //
    0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80,
];

fn frame(key: bool, n: u32) -> Vec<u8> {
    let mut data = if key {
        vec![0, 0, 0, 1, 0x65, 0x88, 0x84]
    } else {
        vec![0, 0, 0, 1, 0x41, 0x9A]
    };
    data.extend_from_slice(&n.to_be_bytes());
    data.resize(2048, 0);
    data
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rtmp://127.0.0.1:1935/live/demo".to_string());

    let config = PushConfig::builder()
        .url(url)
        .fix_key_frame(true)
        .event_cb(|event| {
            if event == RtmpEvent::ClosedByServer {
                warn!("Server closed the session");
            }
        })
        .build()?;

    let push = PushSession::open(config)?;
    push.set_video_info(VideoInfo::new(VideoCodec::H264, 640, 360, 25).with_spec_info(SPS_PPS))
        .await?;
    push.set_audio_info(AudioInfo::new(AudioCodec::Aac, 44100, 2)).await?;
    push.set_command_cb(|payload: &[u8]| info!("Player says: {}", String::from_utf8_lossy(payload)));
    push.connect().await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(40));
    for n in 0..1500u32 {
        ticker.tick().await;
        let pts = n * 40;
        push.push_video(&VideoFrame::new(pts, n % 50 == 0, frame(n % 50 == 0, n)))
            .await?;
        push.push_audio(&AudioFrame::new(pts, vec![0x21, 0x10, 0x04, 0x60])).await?;
        if n % 250 == 0 {
            info!("Pushed {} frames", n);
        }
    }

    push.close().await
}
