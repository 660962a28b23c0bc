//! Concurrent activities of a bridged session
//!
//! - connection-read pump: client frames -> input pipe / resize channel
//! - session-output pump: output pipe -> client data frames
//! - exec driver: runs the blocking exec stream and signals completion
//! - keepalive pinger: periodic pings until shutdown

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::completion::{Completion, SessionExit};
use super::guard::ConnectionGuard;
use super::pipe::InputSink;
use crate::config::BridgeConfig;
use crate::exec::ExecSession;
use crate::frame::{DataEncoder, Frame};
use crate::terminal::{SizeQueue, TerminalSize};
use crate::Error;

/// Why the connection-read pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    /// Client sent a close frame, errored, or the stream ended
    ClientDisconnected,
    /// Nothing arrived from the client within the idle timeout
    IdleTimeout,
    /// The input pipe rejected a write (session already gone or stalled)
    InputClosed,
    /// The output pump finished and closed the connection
    OutputClosed,
}

/// Read client frames until the client leaves or the output side closes
pub(crate) async fn pump_connection<R, E, S>(
    stream: &mut R,
    input: &InputSink,
    resize_tx: &mpsc::Sender<TerminalSize>,
    guard: &ConnectionGuard<S>,
    config: &BridgeConfig,
    output_closed: &CancellationToken,
) -> ReadEnd
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = output_closed.cancelled() => return ReadEnd::OutputClosed,
            next = tokio::time::timeout(config.pong_wait, stream.next()) => next,
        };

        let msg = match next {
            Err(_) => {
                debug!(timeout = ?config.pong_wait, "Client idle timeout");
                return ReadEnd::IdleTimeout;
            }
            Ok(None) => return ReadEnd::ClientDisconnected,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "WebSocket read error");
                return ReadEnd::ClientDisconnected;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        let frame = match msg {
            Message::Binary(data) => Frame::decode(&data),
            Message::Text(text) => Frame::decode(text.as_str().as_bytes()),
            Message::Close(_) => {
                debug!("WebSocket closed by client");
                return ReadEnd::ClientDisconnected;
            }
            // Any traffic, pongs included, has already refreshed the idle timer
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match frame {
            Ok(Frame::Data(data)) => {
                let mut data = data.to_vec();
                if config.append_newline {
                    data.push(b'\n');
                }
                match tokio::time::timeout(config.write_wait, input.write(&data)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(error = %e, "Input pipe closed");
                        return ReadEnd::InputClosed;
                    }
                    Err(_) => {
                        warn!("Input pipe stalled, dropping connection");
                        return ReadEnd::InputClosed;
                    }
                }
            }
            Ok(Frame::Resize(size)) => {
                // The receiver is gone in pipe mode or once the session ended
                let _ = resize_tx.send(size).await;
            }
            Err(e) => {
                warn!(error = %e, "Ignoring malformed client frame");
                guard.notice(e.to_string()).await;
            }
        }
    }
}

/// Forward shell output to the client until the output pipe ends
///
/// Each frame carries at most `chunk_size` bytes of output, a carried partial
/// character included. After end-of-stream a failed session outcome is sent as
/// a notice, behind all of the output. Always finishes by closing the
/// connection and firing `done`; if a write fails, that happens right away and
/// the rest of the output is read and dropped.
pub(crate) async fn pump_output<O, S>(
    mut source: O,
    guard: Arc<ConnectionGuard<S>>,
    chunk_size: usize,
    completion: Arc<Completion>,
    done: CancellationToken,
) where
    O: AsyncRead + Unpin,
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    let mut buf = vec![0u8; chunk_size];
    let mut encoder = DataEncoder::default();

    loop {
        let room = chunk_size.saturating_sub(encoder.pending_len()).max(1);
        let n = match source.read(&mut buf[..room]).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "Output pipe read error");
                break;
            }
        };
        let Some(frame) = encoder.encode(&buf[..n]) else {
            continue;
        };
        if let Err(e) = guard.send(frame).await {
            debug!(error = %e, "Failed to forward output, closing connection");
            guard.close_normal("").await;
            done.cancel();
            // The remote shell must never block on output while it is asked to exit
            discard(source, &mut buf).await;
            return;
        }
    }

    if let Some(frame) = encoder.finish() {
        let _ = guard.send(frame).await;
    }
    if let Some(SessionExit::Failed(reason)) = completion.exit() {
        guard.notice(reason.clone()).await;
    }
    guard.close_normal("").await;
    done.cancel();
}

async fn discard<O: AsyncRead + Unpin>(mut source: O, buf: &mut [u8]) {
    loop {
        match source.read(buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Run the exec stream and record its outcome
///
/// In terminal mode the first resize from the client is the initial size.
/// On return the input pipe is closed and the output pipe shut down, in that
/// order after the outcome has been recorded, so the output pump always sees
/// the outcome once it reaches end-of-stream.
pub(crate) async fn drive_exec(
    mut session: ExecSession,
    input_source: DuplexStream,
    mut output_sink: DuplexStream,
    mut resize_rx: mpsc::Receiver<TerminalSize>,
    completion: Arc<Completion>,
    input: Arc<InputSink>,
) {
    let result = if session.mode().is_tty() {
        match resize_rx.recv().await {
            Some(initial) => {
                let sizes = SizeQueue::new(resize_rx, initial);
                session
                    .stream(input_source, &mut output_sink, Some(sizes))
                    .await
            }
            None => Err(Error::closed_by_peer(
                "client left before the terminal was sized",
            )),
        }
    } else {
        drop(resize_rx);
        session.stream(input_source, &mut output_sink, None).await
    };

    let exit = match result {
        Ok(()) => {
            debug!(target = %session.target(), "Exec stream ended");
            SessionExit::Success
        }
        Err(e) => {
            warn!(target = %session.target(), error = %e, "Exec stream ended with error");
            SessionExit::Failed(e.to_string())
        }
    };
    completion.complete(exit);

    input.close().await;
    let _ = output_sink.shutdown().await;
}

/// Ping the client every `period` until `stop` fires
pub(crate) async fn keepalive<S>(
    guard: Arc<ConnectionGuard<S>>,
    period: Duration,
    stop: CancellationToken,
) where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    if period.is_zero() {
        warn!("Keepalive period is zero, not pinging");
        stop.cancelled().await;
        return;
    }

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {
                if let Err(e) = guard.ping().await {
                    debug!(error = %e, "Keepalive ping failed");
                    if matches!(e, Error::ConnectionClosed) {
                        return;
                    }
                }
            }
        }
    }
}
