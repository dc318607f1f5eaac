use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use crate::server::bind_server;
use crate::server::config::{MonitorCallback, ServerConfig};
use crate::server::context::ServerContext;
use crate::server::reactor::Reactor;
use crate::{Error, Result};

/// Time allowed for the reactor to drop its clients on close
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// RTMP server: one listener, one reactor task for every client
pub struct RtmpServer {
    /// Server configuration
    config: Arc<ServerConfig>,

    monitor: Mutex<Option<MonitorCallback>>,

    /// Shutdown flag
    shutdown: watch::Sender<bool>,

    task: Mutex<Option<JoinHandle<()>>>,

    local_addr: Mutex<Option<SocketAddr>>,

    /// Connected clients, as last seen by the reactor
    active: Arc<AtomicUsize>,
}

impl RtmpServer {
    /// Validate the configuration; nothing is bound yet
    pub fn open(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);
        Ok(RtmpServer {
            config: Arc::new(config),
            monitor: Mutex::new(None),
            shutdown,
            task: Mutex::new(None),
            local_addr: Mutex::new(None),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register the player monitor; takes effect at the next `setup`
    pub fn monitor_puller<F>(&self, cb: F)
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        *lock(&self.monitor) = Some(Arc::new(cb));
    }

    /// Bind the port and start the reactor
    pub async fn setup(&self) -> Result<()> {
        if self.is_running() {
            return Err(Error::wrong_state("Server already running"));
        }

        let listener = bind_server(&self.config).await?;
        let addr = listener.local_addr()?;

        let ctx = ServerContext::new(self.config.clone(), lock(&self.monitor).clone());
        let reactor = Reactor::new(listener, ctx, self.active.clone());
        self.shutdown.send_replace(false);
        let handle = tokio::spawn(reactor.run(self.shutdown.subscribe()));

        *lock(&self.task) = Some(handle);
        *lock(&self.local_addr) = Some(addr);
        info!("RTMP server listening on {} (app '{}')", addr, self.config.app_name);
        Ok(())
    }

    /// Stop the reactor, dropping every client and the listener
    pub async fn close(&self) -> Result<()> {
        self.shutdown.send_replace(true);
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if tokio::time::timeout(STOP_TIMEOUT, task).await.is_err() {
                warn!("Reactor did not stop in time");
            }
        }
        if lock(&self.local_addr).take().is_some() {
            info!("RTMP server stopped");
        }
        Ok(())
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Get active client count
    pub fn client_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for RtmpServer {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
