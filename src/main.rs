//! kube-web-terminal - browser terminal gateway for Kubernetes pods

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kube_web_terminal::config::{
    BridgeConfig, ServerConfig, DEFAULT_ADDR, DEFAULT_NUDGE_ATTEMPTS, DEFAULT_PONG_WAIT,
    DEFAULT_WRITE_WAIT,
};
use kube_web_terminal::exec::{KubeConnector, TransportMode};
use kube_web_terminal::server::start_server;

/// Browser terminal gateway bridging WebSocket clients to Kubernetes pod exec
#[derive(Parser, Debug)]
#[command(name = "kube-web-terminal", version, about, long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "KWT_ADDR", default_value = DEFAULT_ADDR)]
    addr: SocketAddr,

    /// Path to a kubeconfig file
    ///
    /// Without it the in-cluster service account or the default kubeconfig
    /// is used.
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Run commands over plain pipes instead of a pseudo-terminal
    #[arg(long, env = "KWT_PIPE")]
    pipe: bool,

    /// Append a newline to every input frame (line-oriented clients)
    #[arg(long, env = "KWT_APPEND_NEWLINE")]
    append_newline: bool,

    /// Seconds without client traffic before the connection is dropped
    #[arg(long, env = "KWT_PONG_WAIT_SECS", default_value_t = DEFAULT_PONG_WAIT.as_secs())]
    pong_wait_secs: u64,

    /// Seconds allowed for each write to the client
    #[arg(long, env = "KWT_WRITE_WAIT_SECS", default_value_t = DEFAULT_WRITE_WAIT.as_secs())]
    write_wait_secs: u64,

    /// Exit nudges sent to the shell after the client disconnects
    #[arg(long, env = "KWT_NUDGE_ATTEMPTS", default_value_t = DEFAULT_NUDGE_ATTEMPTS)]
    nudge_attempts: u32,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        let transport_mode = if self.pipe {
            TransportMode::Pipe
        } else {
            TransportMode::Tty
        };

        ServerConfig {
            addr: self.addr,
            kubeconfig: self.kubeconfig,
            bridge: BridgeConfig {
                pong_wait: Duration::from_secs(self.pong_wait_secs),
                write_wait: Duration::from_secs(self.write_wait_secs),
                nudge_attempts: self.nudge_attempts,
                append_newline: self.append_newline,
                transport_mode,
                ..Default::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().into_config();

    let connector = KubeConnector::from_kubeconfig(config.kubeconfig.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    start_server(config, Arc::new(connector))
        .await
        .map_err(|e| anyhow::anyhow!("Terminal gateway failed: {}", e))
}
