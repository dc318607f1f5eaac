// Simple RTMP Server Demo
//
// Serves the `live` application on port 1935. Publish keys starting with
// `deny` are refused, and the monitor logs when streams gain or lose their
// last player.
//
// Usage:
//   cargo run --example simple_server

use log::info;
use rtmp::{Result, RtmpServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = ServerConfig::builder()
        .host("0.0.0.0")
        .port(1935)
        .app_name("live")
        .max_clients(8)
        .keep_src(true)
        .auth_cb(|key: &str| !key.starts_with("deny"))
        .build()?;

    info!("Configuration:");
    info!("  - Max clients: {}", config.max_clients);
    info!("  - Client cache: {} bytes", config.client_cache_size);
    info!("  - Keep source: {}", config.keep_src);

    let server = RtmpServer::open(config)?;
    server.monitor_puller(|stream: &str, watched: bool| {
        if watched {
            info!("Stream '{}' has viewers", stream);
        } else {
            info!("Stream '{}' lost its last viewer", stream);
        }
    });
    server.setup().await?;

    info!("Press Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Error waiting for Ctrl+C: {}", e);
    }

    info!("Shutting down with {} clients", server.client_count());
    server.close().await
}
