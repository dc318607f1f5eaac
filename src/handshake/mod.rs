mod state;
mod c0c1;
mod s0s1s2;

pub use state::*;
pub use c0c1::*;
pub use s0s1s2::*;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use crate::{Error, Result};

/// Client side of the simple handshake: C0C1 out, S0S1S2 in, C2 out
pub async fn client_handshake<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let c0c1 = C0C1::create_client();
    stream
        .write_all(&c0c1.encode()?)
        .await
        .map_err(|e| Error::connect_fail(format!("Failed to write C0+C1: {}", e)))?;
    stream.flush().await?;

    let mut s0s1s2_buf = vec![0u8; 1 + HANDSHAKE_SIZE * 2];
    stream
        .read_exact(&mut s0s1s2_buf)
        .await
        .map_err(|e| Error::connect_fail(format!("Failed to read S0+S1+S2: {}", e)))?;
    let s0s1s2 = S0S1S2::parse(&s0s1s2_buf)?;
    s0s1s2.validate(&c0c1)?;

    let c2 = C2::create_from_s1(&s0s1s2);
    stream
        .write_all(&c2.encode()?)
        .await
        .map_err(|e| Error::connect_fail(format!("Failed to write C2: {}", e)))?;
    stream.flush().await?;

    debug!("Client handshake completed");
    Ok(())
}

/// Server side of the simple handshake over a blocking-style stream.
///
/// The reactor uses [`ServerHandshake`] directly; this wrapper serves callers
/// that own a dedicated stream.
pub async fn server_handshake<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = ServerHandshake::new();
    let mut buf = vec![0u8; 4096];

    loop {
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| Error::connect_fail(format!("Handshake read failed: {}", e)))?;
        if n == 0 {
            return Err(Error::connect_fail("Peer closed during handshake"));
        }

        match handshake.feed(&buf[..n])? {
            HandshakeStep::NeedMore => {}
            HandshakeStep::Reply(reply) => {
                stream
                    .write_all(&reply)
                    .await
                    .map_err(|e| Error::connect_fail(format!("Failed to write S0+S1+S2: {}", e)))?;
                stream.flush().await?;
            }
            HandshakeStep::Done { leftover } => {
                debug!("Server handshake completed");
                return Ok(leftover);
            }
        }
    }
}
