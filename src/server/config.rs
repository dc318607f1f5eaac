use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use crate::protocol::constants::DEFAULT_WINDOW_SIZE;
use crate::{Error, Result};

/// Decides whether a stream key (query string included) may publish or play
pub type AuthCallback = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Told when a stream gains its first player (`true`) or loses its last (`false`)
pub type MonitorCallback = Arc<dyn Fn(&str, bool) + Send + Sync>;

pub const DEFAULT_MAX_CLIENTS: usize = 2;
pub const DEFAULT_CLIENT_CACHE_SIZE: usize = 160 * 1024;
pub const MIN_CLIENT_CACHE_SIZE: usize = 4096;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ServerConfig {
    /// Host to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Application name clients must connect to
    pub app_name: String,

    /// Outgoing chunk size
    pub chunk_size: u32,

    /// Maximum simultaneous clients
    pub max_clients: usize,

    /// Bytes a client's output queue may hold before media is evicted
    pub client_cache_size: usize,

    /// Keep a stream and its players when the publisher leaves
    pub keep_src: bool,

    /// Window acknowledgement size announced on connect
    pub window_ack_size: u32,

    /// How long a closing client may take to drain its queue
    pub close_grace: Duration,

    /// How long a client may stay silent before publishing or playing
    pub idle_timeout: Duration,

    pub auth_cb: Option<AuthCallback>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("app_name", &self.app_name)
            .field("chunk_size", &self.chunk_size)
            .field("max_clients", &self.max_clients)
            .field("client_cache_size", &self.client_cache_size)
            .field("keep_src", &self.keep_src)
            .field("window_ack_size", &self.window_ack_size)
            .field("close_grace", &self.close_grace)
            .field("idle_timeout", &self.idle_timeout)
            .field("auth_cb", &self.auth_cb.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 1935,
            app_name: "live".to_string(),
            chunk_size: 4096,
            max_clients: DEFAULT_MAX_CLIENTS,
            client_cache_size: DEFAULT_CLIENT_CACHE_SIZE,
            keep_src: false,
            window_ack_size: DEFAULT_WINDOW_SIZE,
            close_grace: Duration::from_secs(3),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            auth_cb: None,
        }
    }
}

impl ServerConfig {
    /// Create config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::invalid_arg("Invalid port: 0"));
        }

        if self.app_name.is_empty() {
            return Err(Error::invalid_arg("app_name must not be empty"));
        }

        if self.max_clients == 0 {
            return Err(Error::invalid_arg("Invalid max_clients: 0"));
        }

        if self.chunk_size < 128 {
            return Err(Error::invalid_arg("Chunk size must be at least 128"));
        }

        if self.chunk_size > 65536 {
            return Err(Error::invalid_arg("Chunk size must not exceed 65536"));
        }

        if self.client_cache_size < MIN_CLIENT_CACHE_SIZE {
            return Err(Error::invalid_arg(format!(
                "client_cache_size must be at least {}",
                MIN_CLIENT_CACHE_SIZE
            )));
        }

        if self.idle_timeout.is_zero() {
            return Err(Error::invalid_arg("idle_timeout must not be zero"));
        }

        Ok(())
    }

    /// Run the auth callback; no callback allows everything
    pub fn authorize(&self, stream_key: &str) -> bool {
        self.auth_cb.as_ref().is_none_or(|cb| cb(stream_key))
    }
}

/// Builder for ServerConfig
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        ServerConfigBuilder::new()
    }
}

impl ServerConfigBuilder {
    /// Create new builder
    pub fn new() -> Self {
        ServerConfigBuilder {
            config: ServerConfig::default(),
        }
    }

    /// Set host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn app_name(mut self, app: impl Into<String>) -> Self {
        self.config.app_name = app.into();
        self
    }

    /// Set chunk size
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn max_clients(mut self, max: usize) -> Self {
        self.config.max_clients = max;
        self
    }

    pub fn client_cache_size(mut self, size: usize) -> Self {
        self.config.client_cache_size = size;
        self
    }

    pub fn keep_src(mut self, keep: bool) -> Self {
        self.config.keep_src = keep;
        self
    }

    pub fn window_ack_size(mut self, size: u32) -> Self {
        self.config.window_ack_size = size;
        self
    }

    pub fn close_grace(mut self, grace: Duration) -> Self {
        self.config.close_grace = grace;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn auth_cb<F>(mut self, cb: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.config.auth_cb = Some(Arc::new(cb));
        self
    }

    /// Build configuration
    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
