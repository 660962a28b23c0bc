//! Exec transport backed by kube-rs
//!
//! Opens the `pods/exec` subresource over WebSocket with kube-rs and adapts the
//! resulting `AttachedProcess` to [`ExecTransport`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, AttachedProcess, TerminalSize as KubeTerminalSize};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use super::{BoxedReader, BoxedWriter, ExecConnector, ExecTransport, PodRef, TransportMode};
use crate::error::BoxError;
use crate::terminal::TerminalSize;
use crate::{Error, Result};

/// Default connection timeout for the kube client
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build exec parameters for the given transport mode
///
/// A pseudo-terminal merges stderr into stdout, so stderr is only requested
/// for plain pipes.
fn attach_params(container: &str, mode: TransportMode) -> AttachParams {
    AttachParams::default()
        .container(container)
        .stdin(true)
        .stdout(true)
        .stderr(!mode.is_tty())
        .tty(mode.is_tty())
}

/// Connector that execs into pods through the Kubernetes API
#[derive(Clone)]
pub struct KubeConnector {
    client: Client,
}

impl KubeConnector {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a connector from a kubeconfig file, or the inferred
    /// configuration (in-cluster service account, then `~/.kube/config`)
    pub async fn from_kubeconfig(kubeconfig: Option<&Path>) -> Result<Self> {
        let mut config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::config(format!(
                        "failed to read kubeconfig {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?
            }
            None => Config::infer()
                .await
                .map_err(|e| Error::config(format!("failed to infer kube config: {}", e)))?,
        };

        config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
        // Exec streams can sit idle for as long as the user leaves the shell alone
        config.read_timeout = None;

        let client = Client::try_from(config)
            .map_err(|e| Error::config(format!("failed to create kube client: {}", e)))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ExecConnector for KubeConnector {
    async fn connect(
        &self,
        target: &PodRef,
        command: &[String],
        mode: TransportMode,
    ) -> std::result::Result<Box<dyn ExecTransport>, BoxError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let params = attach_params(&target.container, mode);

        let process = pods.exec(&target.name, command.to_vec(), &params).await?;
        debug!(target = %target, "Kube exec session established");

        Ok(Box::new(KubeTransport::new(process)))
    }
}

/// Exec transport wrapping a kube-rs `AttachedProcess`
pub struct KubeTransport {
    process: AttachedProcess,
    terminal_size_tx: Option<futures::channel::mpsc::Sender<KubeTerminalSize>>,
}

impl KubeTransport {
    /// Adapt an attached process
    pub fn new(mut process: AttachedProcess) -> Self {
        let terminal_size_tx = process.terminal_size();
        Self {
            process,
            terminal_size_tx,
        }
    }
}

#[async_trait]
impl ExecTransport for KubeTransport {
    fn stdin(&mut self) -> Option<BoxedWriter> {
        self.process.stdin().map(|w| Box::new(w) as BoxedWriter)
    }

    fn stdout(&mut self) -> Option<BoxedReader> {
        self.process.stdout().map(|r| Box::new(r) as BoxedReader)
    }

    fn stderr(&mut self) -> Option<BoxedReader> {
        self.process.stderr().map(|r| Box::new(r) as BoxedReader)
    }

    async fn resize(&mut self, size: TerminalSize) -> std::result::Result<(), BoxError> {
        match self.terminal_size_tx.as_mut() {
            Some(tx) => Ok(tx.send(size.into()).await?),
            None => Ok(()),
        }
    }

    async fn status(&mut self) -> Option<Status> {
        // Drop the resize sender so kube-rs can close the WebSocket
        drop(self.terminal_size_tx.take());
        self.process.take_status()?.await
    }

    fn abort(&mut self) {
        drop(self.terminal_size_tx.take());
        self.process.abort();
    }
}
