//! Gateway configuration
//!
//! All tunables are plain values constructed once at startup and passed down,
//! so independent bridges (and tests) can run with different settings.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::exec::TransportMode;
use crate::{Error, Result};

/// Default HTTP listen address
pub const DEFAULT_ADDR: &str = "0.0.0.0:8081";

/// Time allowed to read the next message (or pong) from the client
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Time allowed to write a message to the client
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Maximum inbound message size accepted from the client
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8192;

/// Maximum shell output bytes per outbound frame
pub const DEFAULT_OUTPUT_CHUNK_SIZE: usize = 1024;

/// Smallest output chunk that still fits one whole UTF-8 character
pub const MIN_OUTPUT_CHUNK_SIZE: usize = 4;

/// Buffer size of the in-process pipes between the bridge and the exec stream
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Exit nudges sent after the client disconnects
pub const DEFAULT_NUDGE_ATTEMPTS: u32 = 5;

/// Spacing between exit nudges
pub const DEFAULT_NUDGE_INTERVAL: Duration = Duration::from_secs(1);

/// Command written to the shell to ask it to exit
pub const DEFAULT_NUDGE_COMMAND: &[u8] = b"exit\n";

/// Settings for one bridged terminal session
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Idle read timeout on the client connection
    pub pong_wait: Duration,
    /// Deadline for each write to the client connection
    pub write_wait: Duration,
    /// Maximum inbound message size
    pub max_message_size: usize,
    /// Maximum shell output bytes per outbound frame
    pub output_chunk_size: usize,
    /// Capacity of the input/output pipes
    pub pipe_capacity: usize,
    /// Exit nudges sent when the client leaves first
    pub nudge_attempts: u32,
    /// Spacing between exit nudges
    pub nudge_interval: Duration,
    /// Bytes written to the shell as an exit nudge
    pub nudge_command: Vec<u8>,
    /// Append a newline to every client data frame
    pub append_newline: bool,
    /// Pseudo-terminal or plain pipes
    pub transport_mode: TransportMode,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pong_wait: DEFAULT_PONG_WAIT,
            write_wait: DEFAULT_WRITE_WAIT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            output_chunk_size: DEFAULT_OUTPUT_CHUNK_SIZE,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            nudge_attempts: DEFAULT_NUDGE_ATTEMPTS,
            nudge_interval: DEFAULT_NUDGE_INTERVAL,
            nudge_command: DEFAULT_NUDGE_COMMAND.to_vec(),
            append_newline: false,
            transport_mode: TransportMode::Tty,
        }
    }
}

impl BridgeConfig {
    /// Keepalive ping period, 9/10 of the idle read timeout so a ping always
    /// lands before the client side gives up
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }

    /// Reject settings that would make the bridge spin or never time out
    pub fn validate(&self) -> Result<()> {
        if self.pong_wait.is_zero() {
            return Err(Error::config("pong wait must be greater than zero"));
        }
        if self.write_wait.is_zero() {
            return Err(Error::config("write wait must be greater than zero"));
        }
        if self.ping_period().is_zero() {
            return Err(Error::config("pong wait is too short to derive a ping period"));
        }
        if self.output_chunk_size < MIN_OUTPUT_CHUNK_SIZE {
            return Err(Error::config(format!(
                "output chunk size must be at least {} bytes",
                MIN_OUTPUT_CHUNK_SIZE
            )));
        }
        if self.pipe_capacity == 0 {
            return Err(Error::config("pipe capacity must be greater than zero"));
        }
        if self.max_message_size == 0 {
            return Err(Error::config("max message size must be greater than zero"));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// Kubeconfig path; `None` infers in-cluster or default config
    pub kubeconfig: Option<PathBuf>,
    /// Per-session bridge settings
    pub bridge: BridgeConfig,
}
