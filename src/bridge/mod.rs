//! WebSocket <-> exec bridge
//!
//! A [`SessionBridge`] turns one client WebSocket into one remote shell:
//!
//! ```text
//!              ┌── read pump ──► input pipe ──► exec stream ──► output pipe ──► output pump ──┐
//! WebSocket ◄──┤       └────► resize channel ──► SizeQueue ─┘                                  ├──► WebSocket
//!              └─────────────────────────────── keepalive pinger ──────────────────────────────┘
//! ```
//!
//! Lifecycle: Init (validate, open the exec transport) -> Running (all pumps)
//! -> Draining (whichever side ended first gives the other a bounded window to
//! end cleanly) -> Closed (pipes and connection released exactly once).

mod completion;
mod guard;
mod pipe;
mod pump;

pub use completion::{Completion, SessionExit};
pub use guard::{close_code, ConnectionGuard};
pub use pipe::InputSink;
pub use pump::ReadEnd;

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, Stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::BridgeConfig;
use crate::exec::{ExecConnector, ExecSession, PodRef};
use crate::{Error, Result};

/// Command used when the client does not ask for one
pub const DEFAULT_COMMAND: &str = "sh";

/// Pending resize events buffered between the read pump and the size queue
const RESIZE_BACKLOG: usize = 16;

/// Session parameters supplied with the WebSocket request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionRequest {
    /// Pod name
    pub pod_name: String,
    /// Pod namespace
    pub namespace: String,
    /// Container name
    pub container: String,
    /// Shell command, defaults to `sh`
    pub command: Option<String>,
}

/// Validated session target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    /// Container to exec into
    pub pod: PodRef,
    /// Command argv
    pub command: Vec<String>,
}

impl SessionRequest {
    /// Validate the request into an exec target
    ///
    /// The command must look like a shell (contain `sh`); anything else is
    /// rejected before any remote resource is touched.
    pub fn validate(&self) -> Result<SessionTarget> {
        let command = match self.command.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_COMMAND,
            Some(command) => command,
        };
        if !command.contains("sh") {
            return Err(Error::bad_argument(format!(
                "command {:?} needs to be an sh-like command",
                command
            )));
        }

        let pod = PodRef::new(
            self.pod_name.trim(),
            self.namespace.trim(),
            self.container.trim(),
        );
        pod.validate()?;

        Ok(SessionTarget {
            pod,
            command: command.split_whitespace().map(str::to_string).collect(),
        })
    }
}

/// Bridge lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Validating parameters and opening the exec transport
    Init,
    /// All pumps running
    Running,
    /// One side ended; waiting for the other
    Draining,
    /// Everything released
    Closed,
}

/// Report of a finished bridged session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Final bridge state (always `Closed`)
    pub state: BridgeState,
    /// How the remote session ended, if it did
    pub exit: Option<SessionExit>,
    /// Why the connection-read pump stopped
    pub drain_cause: ReadEnd,
    /// Exit nudges written into the shell
    pub nudges: u32,
    /// Whether the remote process failed to confirm exit
    pub teardown_anomaly: bool,
}

/// Bridges client connections to remote exec sessions
pub struct SessionBridge {
    connector: Arc<dyn ExecConnector>,
    config: Arc<BridgeConfig>,
}

impl SessionBridge {
    /// Create a bridge using `connector` to reach the cluster
    pub fn new(connector: Arc<dyn ExecConnector>, config: BridgeConfig) -> Self {
        Self {
            connector,
            config: Arc::new(config),
        }
    }

    /// Bridge settings
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run one session over an already upgraded connection
    ///
    /// Returns once the connection and the exec session have been released.
    /// Parameter and setup errors are reported to the client as a text notice
    /// and returned without a session ever starting.
    pub async fn run<S, R, E>(
        &self,
        request: SessionRequest,
        sink: S,
        mut stream: R,
    ) -> Result<SessionSummary>
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display,
        R: Stream<Item = std::result::Result<Message, E>> + Unpin + Send,
        E: Display,
    {
        let config = self.config.clone();
        let guard = Arc::new(ConnectionGuard::new(sink, config.write_wait));
        let mut state = BridgeState::Init;

        let target = match request.validate() {
            Ok(target) => target,
            Err(e) => return reject(&guard, e).await,
        };

        let span = info_span!(
            "session",
            pod = %target.pod.name,
            namespace = %target.pod.namespace,
            container = %target.pod.container,
            command = %target.command.join(" "),
        );

        async move {
            info!("Starting terminal session");

            let session = match ExecSession::open(
                self.connector.as_ref(),
                target.pod.clone(),
                target.command.clone(),
                config.transport_mode,
            )
            .await
            {
                Ok(session) => session,
                Err(e) => return reject(&guard, e).await,
            };

            transition(&mut state, BridgeState::Running);

            let (input_writer, input_reader) = tokio::io::duplex(config.pipe_capacity);
            let (output_writer, output_reader) = tokio::io::duplex(config.pipe_capacity);
            let input = Arc::new(InputSink::new(input_writer));
            let completion = Arc::new(Completion::new());
            let (resize_tx, resize_rx) = mpsc::channel(RESIZE_BACKLOG);
            let output_closed = CancellationToken::new();
            // Stops the pinger on completion or once the client side is done
            let shutdown = completion.token().child_token();

            let driver = tokio::spawn(
                pump::drive_exec(
                    session,
                    input_reader,
                    output_writer,
                    resize_rx,
                    completion.clone(),
                    input.clone(),
                )
                .in_current_span(),
            );
            let mut output_pump = tokio::spawn(
                pump::pump_output(
                    output_reader,
                    guard.clone(),
                    config.output_chunk_size,
                    completion.clone(),
                    output_closed.clone(),
                )
                .in_current_span(),
            );
            let pinger = tokio::spawn(
                pump::keepalive(guard.clone(), config.ping_period(), shutdown.clone())
                    .in_current_span(),
            );

            let drain_cause = pump::pump_connection(
                &mut stream,
                &input,
                &resize_tx,
                &guard,
                &config,
                &output_closed,
            )
            .await;
            debug!(cause = ?drain_cause, "Connection read pump ended");

            transition(&mut state, BridgeState::Draining);
            drop(resize_tx);
            shutdown.cancel();

            let nudges = if completion.is_complete() {
                0
            } else {
                nudge_exit(&config, &input, &completion).await
            };

            let teardown_anomaly = !completion.is_complete();
            if teardown_anomaly {
                let anomaly = Error::ResourceTeardownAnomaly { attempts: nudges };
                warn!(
                    error = %anomaly,
                    "Stream did not exit successfully, releasing resources anyway"
                );
            }

            input.close().await;
            if teardown_anomaly {
                // Dropping the session aborts the exec transport
                driver.abort();
            }
            let _ = driver.await;

            if tokio::time::timeout(config.write_wait, &mut output_pump)
                .await
                .is_err()
            {
                debug!("Output pump did not finish in time, aborting it");
                output_pump.abort();
            }
            guard.close(None).await;
            let _ = pinger.await;

            transition(&mut state, BridgeState::Closed);
            let summary = SessionSummary {
                state,
                exit: completion.exit().cloned(),
                drain_cause,
                nudges,
                teardown_anomaly,
            };
            info!(exit = ?summary.exit, nudges, "Terminal session closed");
            Ok(summary)
        }
        .instrument(span)
        .await
    }
}

/// Report a setup failure to the client and close without a session
async fn reject<S, T>(guard: &ConnectionGuard<S>, err: Error) -> Result<T>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    error!(error = %err, "Rejecting terminal session");
    guard.notice(err.to_string()).await;
    guard.close_normal("").await;
    Err(err)
}

/// Coax the remote shell into exiting after the client left
///
/// The exec protocol has no kill signal on this channel, so an exit command is
/// written into the shell's input up to `nudge_attempts` times, stopping as soon
/// as completion is observed. Returns the number of nudges attempted.
async fn nudge_exit(config: &BridgeConfig, input: &InputSink, completion: &Completion) -> u32 {
    let mut attempts = 0;
    for attempt in 1..=config.nudge_attempts {
        if completion.is_complete() {
            break;
        }
        attempts = attempt;

        match tokio::time::timeout(config.nudge_interval, input.write(&config.nudge_command)).await
        {
            Ok(Ok(())) => debug!(attempt, "Sent exit nudge"),
            Ok(Err(e)) => debug!(attempt, error = %e, "Exit nudge not delivered"),
            Err(_) => debug!(attempt, "Exit nudge write stalled"),
        }

        tokio::select! {
            _ = completion.wait() => break,
            _ = tokio::time::sleep(config.nudge_interval) => {}
        }
    }
    attempts
}

fn transition(state: &mut BridgeState, next: BridgeState) {
    debug!(from = ?*state, to = ?next, "Bridge state change");
    *state = next;
}
