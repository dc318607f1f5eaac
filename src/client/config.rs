use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use crate::client::events::{
    CommandCallback, DataCallback, EventCallback, RtmpEvent, SourceFrame, SourceStreamInfo,
    StreamCallback,
};
use crate::connection::TlsConfig;
use crate::protocol::RtmpUrl;
use crate::{Error, Result};

pub const MIN_CLIENT_CHUNK_SIZE: u32 = 128;
pub const MAX_CLIENT_CHUNK_SIZE: u32 = 65536;

/// Default FLV fifo of a source session
pub const DEFAULT_FIFO_SIZE: usize = 256 * 1024;

fn validate_common(url: &str, chunk_size: u32) -> Result<RtmpUrl> {
    if url.is_empty() {
        return Err(Error::invalid_arg("URL must be set"));
    }
    if chunk_size < MIN_CLIENT_CHUNK_SIZE {
        return Err(Error::invalid_arg("Chunk size must be at least 128"));
    }
    if chunk_size > MAX_CLIENT_CHUNK_SIZE {
        return Err(Error::invalid_arg("Chunk size must not exceed 65536"));
    }
    RtmpUrl::parse(url)
}

#[derive(Clone)]
pub struct PushConfig {
    /// `rtmp://host[:port]/app/stream[?query]` or `rtmps://…`
    pub url: String,

    /// Outgoing chunk size
    pub chunk_size: u32,

    /// TLS options for `rtmps`
    pub tls: Option<TlsConfig>,

    /// Derive the key flag of H264 frames from their NAL units
    pub fix_key_frame: bool,

    /// Upper bound for `connect`
    pub connect_timeout: Duration,

    pub event_cb: Option<EventCallback>,

    /// Custom commands forwarded from players
    pub command_cb: Option<CommandCallback>,
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig {
            url: String::new(),
            chunk_size: 4096,
            tls: None,
            fix_key_frame: true,
            connect_timeout: Duration::from_secs(10),
            event_cb: None,
            command_cb: None,
        }
    }
}

impl fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushConfig")
            .field("url", &self.url)
            .field("chunk_size", &self.chunk_size)
            .field("tls", &self.tls)
            .field("fix_key_frame", &self.fix_key_frame)
            .field("connect_timeout", &self.connect_timeout)
            .field("event_cb", &self.event_cb.is_some())
            .field("command_cb", &self.command_cb.is_some())
            .finish()
    }
}

impl PushConfig {
    /// Create config builder
    pub fn builder() -> PushConfigBuilder {
        PushConfigBuilder::new()
    }

    /// Validate configuration and return the parsed URL
    pub fn validate(&self) -> Result<RtmpUrl> {
        validate_common(&self.url, self.chunk_size)
    }
}

/// Builder for PushConfig
pub struct PushConfigBuilder {
    config: PushConfig,
}

impl Default for PushConfigBuilder {
    fn default() -> Self {
        PushConfigBuilder::new()
    }
}

impl PushConfigBuilder {
    pub fn new() -> Self {
        PushConfigBuilder {
            config: PushConfig::default(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn chunk_size(mut self, size: u32) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = Some(tls);
        self
    }

    pub fn fix_key_frame(mut self, enabled: bool) -> Self {
        self.config.fix_key_frame = enabled;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn event_cb<F>(mut self, cb: F) -> Self
    where
        F: Fn(RtmpEvent) + Send + Sync + 'static,
    {
        self.config.event_cb = Some(Arc::new(cb));
        self
    }

    pub fn command_cb<F>(mut self, cb: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.config.command_cb = Some(Arc::new(cb));
        self
    }

    /// Build configuration
    pub fn build(self) -> Result<PushConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[derive(Clone)]
pub struct SourceConfig {
    pub url: String,

    /// Outgoing chunk size
    pub chunk_size: u32,

    pub tls: Option<TlsConfig>,

    /// Bytes of FLV output buffered for `read`
    pub fifo_size: usize,

    pub connect_timeout: Duration,

    /// Codec discovery; setting it or `data_cb` selects callback mode
    pub stream_cb: Option<StreamCallback>,

    /// Decoded frames in callback mode
    pub data_cb: Option<DataCallback>,

    pub event_cb: Option<EventCallback>,

    /// Custom commands forwarded from the publisher
    pub command_cb: Option<CommandCallback>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            url: String::new(),
            chunk_size: 4096,
            tls: None,
            fifo_size: DEFAULT_FIFO_SIZE,
            connect_timeout: Duration::from_secs(10),
            stream_cb: None,
            data_cb: None,
            event_cb: None,
            command_cb: None,
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("url", &self.url)
            .field("chunk_size", &self.chunk_size)
            .field("tls", &self.tls)
            .field("fifo_size", &self.fifo_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("callback_mode", &self.is_callback_mode())
            .field("event_cb", &self.event_cb.is_some())
            .field("command_cb", &self.command_cb.is_some())
            .finish()
    }
}

impl SourceConfig {
    pub fn builder() -> SourceConfigBuilder {
        SourceConfigBuilder::new()
    }

    /// Frames go to callbacks instead of the FLV fifo
    pub fn is_callback_mode(&self) -> bool {
        self.stream_cb.is_some() || self.data_cb.is_some()
    }

    pub fn validate(&self) -> Result<RtmpUrl> {
        if self.fifo_size == 0 {
            return Err(Error::invalid_arg("FIFO size must be non-zero"));
        }
        validate_common(&self.url, self.chunk_size)
    }
}

pub struct SourceConfigBuilder {
    config: SourceConfig,
}

impl Default for SourceConfigBuilder {
    fn default() -> Self {
        SourceConfigBuilder::new()
    }
}

impl SourceConfigBuilder {
    pub fn new() -> Self {
        SourceConfigBuilder {
            config: SourceConfig::default(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn chunk_size(mut self, size: u32) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = Some(tls);
        self
    }

    pub fn fifo_size(mut self, size: usize) -> Self {
        self.config.fifo_size = size;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn stream_cb<F>(mut self, cb: F) -> Self
    where
        F: Fn(&SourceStreamInfo) + Send + Sync + 'static,
    {
        self.config.stream_cb = Some(Arc::new(cb));
        self
    }

    pub fn data_cb<F>(mut self, cb: F) -> Self
    where
        F: Fn(&SourceFrame) + Send + Sync + 'static,
    {
        self.config.data_cb = Some(Arc::new(cb));
        self
    }

    pub fn event_cb<F>(mut self, cb: F) -> Self
    where
        F: Fn(RtmpEvent) + Send + Sync + 'static,
    {
        self.config.event_cb = Some(Arc::new(cb));
        self
    }

    pub fn command_cb<F>(mut self, cb: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.config.command_cb = Some(Arc::new(cb));
        self
    }

    pub fn build(self) -> Result<SourceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_config_validation() {
        assert!(PushConfig::default().validate().is_err());

        let config = PushConfig::builder()
            .url("rtmp://127.0.0.1/live/cam")
            .chunk_size(8192)
            .build()
            .unwrap();
        assert!(config.fix_key_frame);
        assert_eq!(config.validate().unwrap().app, "live");

        let err = PushConfig::builder()
            .url("rtmp://127.0.0.1/live/cam")
            .chunk_size(64)
            .build();
        assert!(matches!(err, Err(Error::InvalidArg(_))));

        let err = PushConfig::builder()
            .url("rtmp://127.0.0.1/live/cam")
            .chunk_size(65537)
            .build();
        assert!(matches!(err, Err(Error::InvalidArg(_))));

        let err = PushConfig::builder().url("http://127.0.0.1/live/cam").build();
        assert!(matches!(err, Err(Error::InvalidArg(_))));
    }

    #[test]
    fn test_source_config_modes() {
        let flv = SourceConfig::builder()
            .url("rtmp://127.0.0.1/live/cam")
            .build()
            .unwrap();
        assert!(!flv.is_callback_mode());
        assert_eq!(flv.fifo_size, DEFAULT_FIFO_SIZE);

        let callbacks = SourceConfig::builder()
            .url("rtmp://127.0.0.1/live/cam")
            .data_cb(|_| {})
            .build()
            .unwrap();
        assert!(callbacks.is_callback_mode());
        assert!(format!("{:?}", callbacks).contains("callback_mode: true"));

        let err = SourceConfig::builder()
            .url("rtmp://127.0.0.1/live/cam")
            .fifo_size(0)
            .build();
        assert!(matches!(err, Err(Error::InvalidArg(_))));
    }
}
