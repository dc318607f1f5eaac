use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use crate::{Error, Result};

struct FifoInner {
    data: VecDeque<u8>,
    closed: bool,
}

/// Bounded byte fifo between a source's receive loop and `read`.
///
/// A full fifo makes the writer wait, which in turn stops the receive loop
/// from reading the socket.
pub struct MediaFifo {
    inner: Mutex<FifoInner>,
    capacity: usize,
    readable: Notify,
    writable: Notify,
}

impl MediaFifo {
    pub fn new(capacity: usize) -> Self {
        MediaFifo {
            inner: Mutex::new(FifoInner {
                data: VecDeque::with_capacity(capacity.min(64 * 1024)),
                closed: false,
            }),
            capacity,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FifoInner> {
        // Nothing panics while holding the lock; recover the data if it ever did
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Append all of `bytes`, waiting for room as needed
    pub async fn write(&self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let notified = self.writable.notified();
            {
                let mut inner = self.lock();
                if inner.closed {
                    return Err(Error::reset("FIFO closed"));
                }
                let room = self.capacity.saturating_sub(inner.data.len());
                if room > 0 {
                    let n = room.min(bytes.len());
                    inner.data.extend(&bytes[..n]);
                    bytes = &bytes[n..];
                    drop(inner);
                    self.readable.notify_waiters();
                    continue;
                }
            }
            notified.await;
        }
        Ok(())
    }

    /// Fill `buf` completely; fails with `ReadData` once the fifo is closed
    pub async fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let notified = self.readable.notified();
            {
                let mut inner = self.lock();
                if inner.closed {
                    return Err(Error::read_data("Stream closed"));
                }
                let n = inner.data.len().min(buf.len() - filled);
                if n > 0 {
                    for (dst, src) in buf[filled..filled + n].iter_mut().zip(inner.data.drain(..n)) {
                        *dst = src;
                    }
                    filled += n;
                    drop(inner);
                    self.writable.notify_waiters();
                    continue;
                }
            }
            notified.await;
        }
        Ok(())
    }

    /// Drop buffered bytes
    pub fn clear(&self) {
        self.lock().data.clear();
        self.writable.notify_waiters();
    }

    /// Wake every waiter with an error from now on
    pub fn close(&self) {
        self.lock().closed = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_write_then_read() {
        let fifo = MediaFifo::new(16);
        fifo.write(&[1, 2, 3, 4]).await.unwrap();
        let mut buf = [0u8; 3];
        fifo.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(fifo.len(), 1);
    }

    #[tokio::test]
    async fn test_full_fifo_blocks_writer() {
        let fifo = Arc::new(MediaFifo::new(4));
        let writer = {
            let fifo = fifo.clone();
            tokio::spawn(async move { fifo.write(&[0u8; 10]).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fifo.len(), 4);
        assert!(!writer.is_finished());

        let mut buf = [0u8; 10];
        timeout(Duration::from_secs(1), fifo.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        writer.await.unwrap().unwrap();
        assert!(fifo.is_empty());
    }

    #[tokio::test]
    async fn test_close_wakes_reader() {
        let fifo = Arc::new(MediaFifo::new(16));
        let reader = {
            let fifo = fifo.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8];
                fifo.read_exact(&mut buf).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        fifo.close();
        let result = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::ReadData(_))));
        assert!(fifo.write(&[1]).await.is_err());
    }
}
