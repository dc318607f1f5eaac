use std::net::SocketAddr;
use tokio::net::TcpListener;
use crate::{Error, Result};

mod server;
mod config;
mod context;
mod reactor;
mod registry;
pub(crate) mod session;

pub use server::RtmpServer;
pub use config::*;
pub use context::ServerContext;
pub use registry::*;
pub use session::ClientRole;

/// Bind the configured address with SO_REUSEADDR; any failure is `ConnectFail`
pub async fn bind_server(config: &ServerConfig) -> Result<TcpListener> {
    let addr = format!("{}:{}", config.host, config.port);
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::invalid_arg(format!("Invalid address {}: {}", addr, e)))?;

    let bind = || -> std::io::Result<TcpListener> {
        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()?
        } else {
            tokio::net::TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(1024)
    };

    bind().map_err(|e| Error::connect_fail(format!("Failed to bind {}: {}", addr, e)))
}
