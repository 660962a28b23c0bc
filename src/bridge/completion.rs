//! Single-assignment completion signal for the exec stream

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

/// How the remote session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// Remote process exited cleanly
    Success,
    /// Remote process or transport failed
    Failed(String),
}

/// Completion of the exec stream
///
/// Written once by the exec driver, observed by the draining logic and the
/// keepalive pinger. The outcome is stored before the token fires, so
/// `is_complete() == true` implies `exit()` is `Some`.
#[derive(Debug, Default)]
pub struct Completion {
    exit: OnceLock<SessionExit>,
    token: CancellationToken,
}

impl Completion {
    /// Create an unsignaled completion
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome; only the first call has any effect
    pub fn complete(&self, exit: SessionExit) -> bool {
        let first = self.exit.set(exit).is_ok();
        self.token.cancel();
        first
    }

    /// Whether the session has completed
    pub fn is_complete(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the session completes
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// Recorded outcome, if complete
    pub fn exit(&self) -> Option<&SessionExit> {
        self.exit.get()
    }

    /// Token that fires on completion, for deriving child tokens
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
