//! Teardown stories
//!
//! What these tests verify:
//! - A shell that exits first closes the connection normally with no nudges
//! - A failing remote command is reported before the close frame
//! - A client that leaves first gets its shell nudged until it exits
//! - A shell that ignores every nudge is aborted after the budget is spent

use std::sync::Arc;
use std::time::Duration;

use kube_web_terminal::bridge::{close_code, BridgeState, ReadEnd, SessionExit};
use kube_web_terminal::config::BridgeConfig;
use kube_web_terminal::SessionBridge;

use super::helpers::{fast_config, finish, request, start_session, FakeConnector, Shell};

#[tokio::test]
async fn shell_exiting_first_closes_without_nudges() {
    let connector = Arc::new(FakeConnector::new(Shell::OneShot("hello from the pod\n")));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(Some("sh -c 'echo hi'")));

    client.resize(80, 24);
    client.read_to_close().await;

    assert_eq!(client.output(), "hello from the pod\n");
    assert_eq!(client.close_code(), Some(close_code::NORMAL));

    let summary = finish(session).await.unwrap();
    assert_eq!(summary.exit, Some(SessionExit::Success));
    assert_eq!(summary.drain_cause, ReadEnd::OutputClosed);
    assert_eq!(summary.nudges, 0);
    assert!(!summary.teardown_anomaly);
    assert!(connector.remote.lines().is_empty());
    assert_eq!(connector.remote.aborts(), 0);
}

#[tokio::test]
async fn failing_command_is_reported_before_close() {
    let connector = Arc::new(FakeConnector::new(Shell::Fails("no such file\n")));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(None));

    client.resize(80, 24);
    client.read_to_close().await;

    assert!(client.output().starts_with("no such file\n"));
    // The failure notice is the last text frame, after all shell output
    let texts = client.texts();
    assert!(texts.last().is_some_and(|t| t.contains("exit code 2")));
    assert_eq!(
        texts.iter().filter(|t| t.contains("exit code 2")).count(),
        1
    );
    assert_eq!(client.close_code(), Some(close_code::NORMAL));

    let summary = finish(session).await.unwrap();
    match summary.exit {
        Some(SessionExit::Failed(message)) => assert!(message.contains("exit code 2")),
        other => panic!("expected failed exit, got {:?}", other),
    }
    assert_eq!(summary.nudges, 0);
}

#[tokio::test]
async fn client_leaving_first_nudges_shell_to_exit() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(None));

    client.resize(80, 24);
    client.type_input("ls\n");
    client.read_until("ls\n").await;
    client.disconnect();

    let summary = finish(session).await.unwrap();
    assert_eq!(summary.state, BridgeState::Closed);
    assert_eq!(summary.drain_cause, ReadEnd::ClientDisconnected);
    assert_eq!(summary.exit, Some(SessionExit::Success));
    // The first nudge is enough
    assert_eq!(summary.nudges, 1);
    assert!(!summary.teardown_anomaly);
    assert_eq!(connector.remote.lines(), vec!["ls", "exit"]);
    assert_eq!(connector.remote.aborts(), 0);
}

#[tokio::test]
async fn stubborn_shell_is_aborted_after_nudge_budget() {
    let connector = Arc::new(FakeConnector::new(Shell::Stubborn));
    let config = BridgeConfig {
        nudge_attempts: 3,
        nudge_interval: Duration::from_millis(50),
        ..fast_config()
    };
    let bridge = Arc::new(SessionBridge::new(connector.clone(), config));
    let (mut client, session) = start_session(bridge, request(None));

    client.resize(80, 24);
    client.type_input("ls\n");
    client.read_until("ls\n").await;
    client.disconnect();

    let summary = finish(session).await.unwrap();
    assert_eq!(summary.drain_cause, ReadEnd::ClientDisconnected);
    assert_eq!(summary.exit, None);
    assert_eq!(summary.nudges, 3);
    assert!(summary.teardown_anomaly);

    assert_eq!(connector.remote.lines(), vec!["ls", "exit", "exit", "exit"]);
    assert_eq!(connector.remote.aborts(), 1);
}

#[tokio::test]
async fn client_leaving_before_sizing_never_starts_the_stream() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(None));

    client.disconnect();

    let summary = finish(session).await.unwrap();
    assert!(matches!(summary.exit, Some(SessionExit::Failed(_))));
    assert!(!summary.teardown_anomaly);
    assert!(connector.remote.sizes().is_empty());
    // The unstarted transport is torn down
    assert_eq!(connector.remote.aborts(), 1);
}

#[tokio::test]
async fn idle_client_times_out_and_shell_is_nudged() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let config = BridgeConfig {
        pong_wait: Duration::from_millis(150),
        ..fast_config()
    };
    let bridge = Arc::new(SessionBridge::new(connector.clone(), config));
    let (mut client, session) = start_session(bridge, request(None));

    client.resize(80, 24);
    // Connection stays open but goes quiet; pings are not answered
    client.read_to_close().await;

    let summary = finish(session).await.unwrap();
    assert_eq!(summary.drain_cause, ReadEnd::IdleTimeout);
    assert_eq!(summary.exit, Some(SessionExit::Success));
    assert_eq!(summary.nudges, 1);
}
