use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use crate::protocol::RtmpUrl;
use crate::{Error, Result};

/// Byte stream a client session runs over (plain TCP or TLS)
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedTransport = Box<dyn Transport>;

/// TLS options for `rtmps://` URLs
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Extra root certificate (PEM) trusted besides the system store
    pub ca_cert_pem: Option<Vec<u8>>,
    pub accept_invalid_certs: bool,
    /// Server name for SNI and verification; the URL host when unset
    pub sni_host: Option<String>,
}

impl TlsConfig {
    fn connector(&self) -> Result<tokio_native_tls::TlsConnector> {
        let mut builder = native_tls::TlsConnector::builder();
        if let Some(pem) = &self.ca_cert_pem {
            let cert = native_tls::Certificate::from_pem(pem)
                .map_err(|e| Error::invalid_arg(format!("Bad CA certificate: {}", e)))?;
            builder.add_root_certificate(cert);
        }
        if self.accept_invalid_certs {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        let connector = builder
            .build()
            .map_err(|e| Error::connect_fail(format!("TLS setup failed: {}", e)))?;
        Ok(tokio_native_tls::TlsConnector::from(connector))
    }
}

/// Open the transport for `url`: TCP, wrapped in TLS for `rtmps`
pub async fn connect_transport(url: &RtmpUrl, tls: Option<&TlsConfig>) -> Result<BoxedTransport> {
    let tcp = TcpStream::connect((url.host.as_str(), url.port))
        .await
        .map_err(|e| Error::connect_fail(format!("Connect to {}:{} failed: {}", url.host, url.port, e)))?;
    tcp.set_nodelay(true)?;
    debug!("TCP connected to {}:{}", url.host, url.port);

    if !url.tls {
        return Ok(Box::new(tcp));
    }

    let default_tls = TlsConfig::default();
    let tls = tls.unwrap_or(&default_tls);
    let domain = tls.sni_host.as_deref().unwrap_or(&url.host);
    let stream = tls
        .connector()?
        .connect(domain, tcp)
        .await
        .map_err(|e| Error::connect_fail(format!("TLS handshake with {} failed: {}", domain, e)))?;
    debug!("TLS established with {}", domain);
    Ok(Box::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_plain_tcp_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = RtmpUrl::parse(&format!("rtmp://127.0.0.1:{}/live/test", port)).unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });
        let transport = connect_transport(&url, None).await;
        assert!(transport.is_ok());
        assert!(accept.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_refused_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = RtmpUrl::parse(&format!("rtmp://127.0.0.1:{}/live/test", port)).unwrap();
        let result = connect_transport(&url, None).await;
        assert!(matches!(result, Err(Error::ConnectFail(_))));
    }

    #[test]
    fn test_bad_ca_certificate() {
        let tls = TlsConfig {
            ca_cert_pem: Some(b"not a certificate".to_vec()),
            ..Default::default()
        };
        assert!(matches!(tls.connector(), Err(Error::InvalidArg(_))));
    }
}
