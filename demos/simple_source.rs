// Simple Source Demo
//
// Plays a stream and writes it to an FLV file, or with `--frames` logs the
// decoded frames instead.
//
// Usage:
//   cargo run --example simple_source -- rtmp://127.0.0.1/live/demo out.flv
//   cargo run --example simple_source -- rtmp://127.0.0.1/live/demo --frames

use std::time::Duration;
use log::info;
use rtmp::{Result, SourceConfig, SourceFrame, SourceSession, SourceStreamInfo};
use tokio::io::AsyncWriteExt;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "rtmp://127.0.0.1:1935/live/demo".to_string());
    let target = args.next().unwrap_or_else(|| "out.flv".to_string());

    if target == "--frames" {
        let config = SourceConfig::builder()
            .url(url)
            .stream_cb(|info: &SourceStreamInfo| info!("Stream info: {:?}", info))
            .data_cb(|frame: &SourceFrame| match frame {
                SourceFrame::Video(v) => info!("video pts={} key={} {} bytes", v.pts, v.key_frame, v.data.len()),
                SourceFrame::Audio(a) => info!("audio pts={} {} bytes", a.pts, a.data.len()),
            })
            .build()?;
        let source = SourceSession::open(config)?;
        source.connect().await?;
        tokio::time::sleep(Duration::from_secs(30)).await;
        return source.close().await;
    }

    let source = SourceSession::open(SourceConfig::builder().url(url).build()?)?;
    source.connect().await?;

    let mut file = tokio::fs::File::create(&target).await?;
    let mut buf = vec![0u8; 4096];
    let mut total = 0usize;
    while source.read(&mut buf).await.is_ok() {
        file.write_all(&buf).await?;
        total += buf.len();
        if total % (1024 * 1024) < buf.len() {
            info!("Wrote {} KB to {}", total / 1024, target);
        }
    }

    file.flush().await?;
    info!("Stream ended after {} bytes", total);
    source.close().await
}
