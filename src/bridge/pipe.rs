//! Input pipe feeding the exec stream
//!
//! The connection-read pump and the draining logic write into the pipe; the
//! exec driver closes it when the remote session ends. Closing is idempotent
//! so whichever side gets there first wins.

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;

use crate::{Error, Result};

/// Shared write end of the pipe whose read end is the exec stream's stdin
pub struct InputSink {
    writer: Mutex<Option<DuplexStream>>,
}

impl InputSink {
    /// Wrap the write end of a pipe
    pub fn new(writer: DuplexStream) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Write all bytes into the pipe
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::closed_by_peer("input pipe closed"))?;
        writer
            .write_all(data)
            .await
            .map_err(|e| Error::closed_by_peer(format!("input pipe write failed: {}", e)))
    }

    /// Close the pipe so the reader observes end-of-stream
    ///
    /// Returns `true` only for the call that actually closed it.
    pub async fn close(&self) -> bool {
        match self.writer.lock().await.take() {
            Some(mut writer) => {
                let _ = writer.shutdown().await;
                true
            }
            None => false,
        }
    }
}
