use url::{Host, Url};
use crate::protocol::constants::{DEFAULT_RTMPS_PORT, DEFAULT_RTMP_PORT};
use crate::{Error, Result};

/// Parsed `rtmp://host[:port]/app/stream[?query]` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpUrl {
    pub host: String,
    pub port: u16,
    pub app: String,
    /// Everything after the app segment, query string included
    pub stream_key: String,
    pub tls: bool,
}

impl RtmpUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| Error::invalid_arg(format!("Invalid URL {}: {}", raw, e)))?;

        let tls = match url.scheme() {
            "rtmp" => false,
            "rtmps" => true,
            scheme => return Err(Error::invalid_arg(format!("Unsupported scheme: {}", scheme))),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(Error::invalid_arg("Missing host in URL")),
        };
        let port = url
            .port()
            .unwrap_or(if tls { DEFAULT_RTMPS_PORT } else { DEFAULT_RTMP_PORT });

        let path = url.path().trim_start_matches('/');
        let (app, stream) = match path.split_once('/') {
            Some((app, stream)) => (app, stream),
            None => (path, ""),
        };
        if app.is_empty() {
            return Err(Error::invalid_arg(format!("Missing app name in {}", raw)));
        }

        let stream_key = match url.query() {
            Some(query) => format!("{}?{}", stream, query),
            None => stream.to_string(),
        };

        Ok(RtmpUrl {
            host,
            port,
            app: app.to_string(),
            stream_key,
            tls,
        })
    }

    /// tcUrl sent in the connect command
    pub fn tc_url(&self) -> String {
        let scheme = if self.tls { "rtmps" } else { "rtmp" };
        if self.host.contains(':') {
            format!("{}://[{}]:{}/{}", scheme, self.host, self.port, self.app)
        } else {
            format!("{}://{}:{}/{}", scheme, self.host, self.port, self.app)
        }
    }
}

/// Stream name without its query string
pub fn stream_name(stream_key: &str) -> &str {
    match stream_key.split_once('?') {
        Some((name, _)) => name,
        None => stream_key,
    }
}
