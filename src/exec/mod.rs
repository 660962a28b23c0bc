//! Remote exec sessions
//!
//! An [`ExecSession`] owns one exec transport to a container and drives it:
//! terminal input flows in, shell output flows out, and terminal geometry is
//! applied from a [`SizeQueue`]. The transport itself sits behind the
//! [`ExecConnector`]/[`ExecTransport`] traits so the session logic can be
//! exercised without a cluster; [`KubeConnector`] is the kube-rs backend.

mod kube_exec;

pub use kube_exec::{KubeConnector, KubeTransport};

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::BoxError;
use crate::terminal::{SizeQueue, TerminalSize};
use crate::{Error, Result};

/// Boxed remote stdout/stderr reader
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed remote stdin writer
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const READ_BUF_SIZE: usize = 4096;

/// Target container of an exec session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    /// Pod name
    pub name: String,
    /// Pod namespace
    pub namespace: String,
    /// Container name within the pod
    pub container: String,
}

impl PodRef {
    /// Create a pod reference
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            container: container.into(),
        }
    }

    /// Reject empty fields
    pub(crate) fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("podName", &self.name),
            ("namespace", &self.namespace),
            ("container", &self.container),
        ] {
            if value.trim().is_empty() {
                return Err(Error::bad_argument(format!("{} cannot be empty", field)));
            }
        }
        Ok(())
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.name, self.container)
    }
}

/// How the remote process sees its standard streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Allocate a pseudo-terminal; stderr is merged into stdout and the
    /// terminal geometry follows client resizes
    #[default]
    Tty,
    /// Plain byte pipes; stdout and stderr are both forwarded, resizes ignored
    Pipe,
}

impl TransportMode {
    /// Whether a pseudo-terminal is allocated
    pub fn is_tty(self) -> bool {
        matches!(self, TransportMode::Tty)
    }
}

/// Lifecycle of an exec session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, waiting for the terminal to be sized
    Pending,
    /// Bytes are flowing
    Streaming,
    /// Remote output ended, waiting for the exit status
    Draining,
    /// Finished
    Closed,
}

/// An open exec transport to one remote process
///
/// Streams are handed out once; subsequent calls return `None`.
#[async_trait]
pub trait ExecTransport: Send {
    /// Take the remote stdin writer
    fn stdin(&mut self) -> Option<BoxedWriter>;

    /// Take the remote stdout reader
    fn stdout(&mut self) -> Option<BoxedReader>;

    /// Take the remote stderr reader (absent in terminal mode)
    fn stderr(&mut self) -> Option<BoxedReader>;

    /// Apply a new terminal geometry to the remote pseudo-terminal
    async fn resize(&mut self, size: TerminalSize) -> std::result::Result<(), BoxError>;

    /// Wait for the exit status reported by the remote side
    async fn status(&mut self) -> Option<Status>;

    /// Tear the transport down without waiting for the remote process
    fn abort(&mut self);
}

/// Opens exec transports against the remote API
///
/// Carries the credentials needed to reach the cluster.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecConnector: Send + Sync {
    /// Perform the exec handshake for `command` in the target container
    async fn connect(
        &self,
        target: &PodRef,
        command: &[String],
        mode: TransportMode,
    ) -> std::result::Result<Box<dyn ExecTransport>, BoxError>;
}

/// One remote exec stream against a named container
pub struct ExecSession {
    target: PodRef,
    mode: TransportMode,
    state: SessionState,
    transport: Box<dyn ExecTransport>,
}

impl ExecSession {
    /// Validate the target and open the exec transport
    ///
    /// Empty pod fields or an empty command are rejected as `BadArgument`
    /// before the connector is used. Handshake failures are returned as
    /// `TransportSetupFailed` with the cause attached.
    pub async fn open(
        connector: &dyn ExecConnector,
        target: PodRef,
        command: Vec<String>,
        mode: TransportMode,
    ) -> Result<Self> {
        target.validate()?;
        if command.is_empty() || command.iter().all(|arg| arg.trim().is_empty()) {
            return Err(Error::bad_argument("command cannot be empty"));
        }

        let transport = connector
            .connect(&target, &command, mode)
            .await
            .map_err(|e| Error::transport_setup(target.to_string(), e))?;

        debug!(target = %target, ?command, ?mode, "Exec transport established");

        Ok(Self {
            target,
            mode,
            state: SessionState::Pending,
            transport,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transport mode the session was opened with
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Target container
    pub fn target(&self) -> &PodRef {
        &self.target
    }

    /// Stream until the remote process exits or the transport fails
    ///
    /// Bytes read from `input` are written to the remote stdin (which is shut
    /// down when `input` reaches EOF); remote output is written to `output`.
    /// In terminal mode the first value from `sizes` sizes the terminal before
    /// streaming starts and later values are applied as they arrive.
    pub async fn stream<R, W>(
        &mut self,
        input: R,
        output: &mut W,
        sizes: Option<SizeQueue>,
    ) -> Result<()>
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        if self.state != SessionState::Pending {
            return Err(Error::bad_argument("exec session already streamed"));
        }

        let result = self.run_stream(input, output, sizes).await;
        if result.is_err() {
            self.transport.abort();
        }
        self.state = SessionState::Closed;
        result
    }

    async fn run_stream<R, W>(
        &mut self,
        mut input: R,
        output: &mut W,
        sizes: Option<SizeQueue>,
    ) -> Result<()>
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        let mut sizes = if self.mode.is_tty() { sizes } else { None };

        if let Some(queue) = sizes.as_mut() {
            let Some(initial) = queue.next().await else {
                return Err(Error::closed_by_peer(
                    "size source closed before the terminal was sized",
                ));
            };
            self.apply_size(initial).await;
        }
        self.state = SessionState::Streaming;

        let stdin = self.transport.stdin();
        let mut stdout = self.transport.stdout();
        let mut stderr = if self.mode.is_tty() {
            None
        } else {
            self.transport.stderr()
        };

        let pump_input = async move {
            let Some(mut stdin) = stdin else {
                return;
            };
            if let Err(e) = tokio::io::copy(&mut input, &mut stdin).await {
                debug!(error = %e, "Stdin copy ended with error");
            }
            let _ = stdin.shutdown().await;
        };
        tokio::pin!(pump_input);
        let mut input_done = false;

        let mut out_buf = vec![0u8; READ_BUF_SIZE];
        let mut err_buf = vec![0u8; READ_BUF_SIZE];

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                read = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => {
                    match read {
                        Ok(0) => stdout = None,
                        Ok(n) => forward(output, &out_buf[..n]).await?,
                        Err(e) => {
                            return Err(Error::closed_by_peer(format!("stdout read failed: {}", e)));
                        }
                    }
                }
                read = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => {
                    match read {
                        Ok(0) => stderr = None,
                        Ok(n) => forward(output, &err_buf[..n]).await?,
                        Err(e) => {
                            return Err(Error::closed_by_peer(format!("stderr read failed: {}", e)));
                        }
                    }
                }
                size = next_size(&mut sizes), if sizes.is_some() => {
                    match size {
                        Some(size) => self.apply_size(size).await,
                        None => sizes = None,
                    }
                }
                _ = &mut pump_input, if !input_done => {
                    input_done = true;
                }
            }
        }

        self.state = SessionState::Draining;
        let _ = output.flush().await;

        match self.transport.status().await {
            Some(status) if status.status.as_deref() == Some("Failure") => {
                let message = status
                    .message
                    .or(status.reason)
                    .unwrap_or_else(|| "remote command failed".to_string());
                Err(Error::stream_failed(message))
            }
            Some(status) => {
                debug!(target = %self.target, status = ?status.status, "Exec completed with status");
                Ok(())
            }
            None => {
                debug!(target = %self.target, "Exec completed with no status");
                Ok(())
            }
        }
    }

    async fn apply_size(&mut self, size: TerminalSize) {
        if let Err(e) = self.transport.resize(size).await {
            warn!(target = %self.target, error = %e, cols = size.cols, rows = size.rows, "Failed to resize terminal");
        }
    }
}

impl Drop for ExecSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            debug!(target = %self.target, state = ?self.state, "Aborting unfinished exec transport");
            self.transport.abort();
        }
    }
}

async fn read_some(reader: &mut Option<BoxedReader>, buf: &mut [u8]) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn next_size(sizes: &mut Option<SizeQueue>) -> Option<TerminalSize> {
    match sizes {
        Some(queue) => queue.next().await,
        None => std::future::pending().await,
    }
}

async fn forward<W: AsyncWrite + Unpin>(output: &mut W, data: &[u8]) -> Result<()> {
    output
        .write_all(data)
        .await
        .map_err(|e| Error::closed_by_peer(format!("output sink closed: {}", e)))
}
