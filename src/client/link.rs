use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use crate::client::events::{CommandCallback, EventCallback, RtmpEvent};
use crate::connection::{ConnReader, ConnWriter};
use crate::protocol::RtmpMessage;
use crate::{Error, Result};

/// Time allowed for goodbye commands and the transport shutdown on close
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Connection plumbing shared by push and source sessions.
///
/// Every blocking call selects on the close signal, so `close()` from another
/// task makes it return instead of hanging on the socket.
pub(crate) struct SessionLink {
    closed: watch::Sender<bool>,
    writer: tokio::sync::Mutex<Option<ConnWriter>>,
    stream_id: AtomicU32,
    task: Mutex<Option<JoinHandle<()>>>,
    command_cb: Mutex<Option<CommandCallback>>,
    event_cb: Option<EventCallback>,
}

impl SessionLink {
    pub fn new(event_cb: Option<EventCallback>, command_cb: Option<CommandCallback>) -> Self {
        let (closed, _) = watch::channel(false);
        SessionLink {
            closed,
            writer: tokio::sync::Mutex::new(None),
            stream_id: AtomicU32::new(0),
            task: Mutex::new(None),
            command_cb: Mutex::new(command_cb),
            event_cb,
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once `close()` has been called
    pub async fn until_closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Run a connect future, bounded by `limit` and cancelled by close.
    ///
    /// Cancelling drops the future and with it the transport it owns.
    pub async fn negotiate<T, F>(&self, limit: Duration, negotiation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            result = tokio::time::timeout(limit, negotiation) => match result {
                Ok(result) => result.map_err(connect_error),
                Err(_) => Err(Error::connect_fail("Connect timed out")),
            },
            _ = self.until_closed() => Err(Error::connect_fail("Closed while connecting")),
        }
    }

    /// Install the writer of a negotiated connection
    pub async fn attach(&self, writer: ConnWriter, stream_id: u32) {
        self.stream_id.store(stream_id, Ordering::SeqCst);
        *self.writer.lock().await = Some(writer);
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id.load(Ordering::SeqCst)
    }

    pub fn set_task(&self, handle: JoinHandle<()>) {
        if let Some(old) = lock(&self.task).replace(handle) {
            old.abort();
        }
    }

    /// Write `messages` in order; a close while waiting fails with `WriteData`
    pub async fn send(&self, messages: &[RtmpMessage]) -> Result<()> {
        let write = async {
            let mut guard = self.writer.lock().await;
            match guard.as_mut() {
                Some(writer) => writer.send_all(messages).await,
                None => Err(Error::wrong_state("Session not connected")),
            }
        };
        tokio::select! {
            result = write => result,
            _ = self.until_closed() => Err(Error::write_data("Session closed")),
        }
    }

    /// Next message, or `None` once the session is closed locally
    pub async fn recv(&self, reader: &mut ConnReader) -> Option<Result<RtmpMessage>> {
        tokio::select! {
            result = reader.recv() => Some(result),
            _ = self.until_closed() => None,
        }
    }

    /// Answer pings and acknowledge received bytes
    pub async fn reply(&self, reader: &mut ConnReader, message: &RtmpMessage) -> Result<()> {
        let replies = reader.replies(message)?;
        if replies.is_empty() {
            return Ok(());
        }
        self.send(&replies).await
    }

    pub fn set_command_cb(&self, cb: Option<CommandCallback>) {
        *lock(&self.command_cb) = cb;
    }

    /// Hand a custom command payload to the registered callback
    pub fn dispatch_command(&self, payload: &[u8]) {
        let cb = lock(&self.command_cb).clone();
        match cb {
            Some(cb) => cb(payload),
            None => debug!("Custom command of {} bytes without callback", payload.len()),
        }
    }

    /// The receive loop ended on its own: report unless a local close did it
    pub fn closed_by_peer(&self, err: &Error) {
        if self.is_closed() {
            return;
        }
        warn!("Session ended by server: {}", err);
        if let Some(cb) = &self.event_cb {
            cb(RtmpEvent::ClosedByServer);
        }
    }

    /// Raise the close signal, send `farewell`, shut the transport down
    pub async fn close(&self, farewell: &[RtmpMessage]) {
        self.closed.send_replace(true);

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let goodbye = async {
                if writer.is_interrupted() {
                    debug!("Skipping farewell after an interrupted write");
                } else if let Err(e) = writer.send_all(farewell).await {
                    debug!("Farewell not sent: {}", e);
                }
                writer.shutdown().await;
            };
            if tokio::time::timeout(CLOSE_GRACE, goodbye).await.is_err() {
                debug!("Transport shutdown timed out");
            }
        }

        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Negotiation failures all surface as `ConnectFail`, bad arguments aside
fn connect_error(err: Error) -> Error {
    match err {
        Error::ConnectFail(_) | Error::InvalidArg(_) => err,
        other => Error::connect_fail(other.to_string()),
    }
}
