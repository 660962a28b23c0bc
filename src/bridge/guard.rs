//! Serialized access to the client connection
//!
//! The output pump, the keepalive pinger and error notices all write to the
//! same WebSocket. Every write goes through [`ConnectionGuard`], which holds the
//! sink behind an async mutex, applies a per-write deadline, and closes the
//! connection exactly once.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message};
use bytes::Bytes;
use futures::{Sink, SinkExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Error, Result};

/// WebSocket close codes
pub mod close_code {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
}

/// Single-writer wrapper around the client connection's sink
pub struct ConnectionGuard<S> {
    sink: Mutex<Option<S>>,
    write_wait: Duration,
}

impl<S> ConnectionGuard<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    /// Wrap a sink; every write must finish within `write_wait`
    pub fn new(sink: S, write_wait: Duration) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
            write_wait,
        }
    }

    /// Send one message
    pub async fn send(&self, msg: Message) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(Error::ConnectionClosed)?;
        send_with_deadline(sink, msg, self.write_wait).await
    }

    /// Send a liveness ping
    pub async fn ping(&self) -> Result<()> {
        self.send(Message::Ping(Bytes::new())).await
    }

    /// Send a human-readable notice; failures are swallowed
    pub async fn notice(&self, text: impl Into<String>) {
        if let Err(e) = self.send(Message::Text(text.into().into())).await {
            debug!(error = %e, "Dropping notice for closed connection");
        }
    }

    /// Close the connection, sending a close frame first if `code` is given
    ///
    /// Returns `true` only for the call that actually closed the connection.
    pub async fn close(&self, code: Option<(u16, &str)>) -> bool {
        let Some(mut sink) = self.sink.lock().await.take() else {
            return false;
        };

        if let Some((code, reason)) = code {
            let frame = Message::Close(Some(CloseFrame {
                code,
                reason: reason.to_string().into(),
            }));
            if let Err(e) = send_with_deadline(&mut sink, frame, self.write_wait).await {
                debug!(error = %e, "Failed to send close frame");
            }
        }

        match tokio::time::timeout(self.write_wait, sink.close()).await {
            Ok(Err(e)) => debug!(error = %e, "Error closing connection"),
            Err(_) => debug!("Timed out closing connection"),
            Ok(Ok(())) => {}
        }
        true
    }

    /// Close with a normal-closure frame
    pub async fn close_normal(&self, reason: &str) -> bool {
        self.close(Some((close_code::NORMAL, reason))).await
    }

    /// Whether the connection has been closed
    pub async fn is_closed(&self) -> bool {
        self.sink.lock().await.is_none()
    }
}

async fn send_with_deadline<S>(sink: &mut S, msg: Message, deadline: Duration) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(deadline, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Connection(e.to_string())),
        Err(_) => Err(Error::WriteTimeout),
    }
}
