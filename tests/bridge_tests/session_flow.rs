//! Terminal session stories
//!
//! What these tests verify:
//! - Typed input reaches the shell and its output comes back as data frames
//! - The first resize sizes the terminal before anything streams
//! - A malformed frame produces exactly one notice and the session carries on
//! - Bad parameters and failed handshakes are rejected without a session

use std::sync::Arc;
use std::time::Duration;

use kube_web_terminal::bridge::{close_code, BridgeState, ReadEnd, SessionExit};
use kube_web_terminal::config::BridgeConfig;
use kube_web_terminal::exec::TransportMode;
use kube_web_terminal::terminal::TerminalSize;
use kube_web_terminal::{Error, SessionBridge};

use super::helpers::{
    fast_config, finish, request, start_session, FakeConnector, Shell, STEP_TIMEOUT,
};

#[tokio::test]
async fn typed_command_is_echoed_back() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(None));

    client.resize(120, 40);
    client.type_input("ls\n");
    let output = client.read_until("ls\n").await;
    assert_eq!(output, "ls\n");

    client.type_input("exit\n");
    client.read_to_close().await;
    assert_eq!(client.close_code(), Some(close_code::NORMAL));

    let summary = finish(session).await.unwrap();
    assert_eq!(summary.state, BridgeState::Closed);
    assert_eq!(summary.exit, Some(SessionExit::Success));
    assert_eq!(summary.nudges, 0);
    assert!(!summary.teardown_anomaly);

    assert_eq!(connector.remote.lines(), vec!["ls", "exit"]);
    assert_eq!(connector.remote.sizes()[0], TerminalSize::new(120, 40));
}

#[tokio::test]
async fn resizes_after_the_first_are_applied() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(Some("bash")));

    client.resize(80, 24);
    client.type_input("first\n");
    client.read_until("first\n").await;

    client.resize(100, 50);
    tokio::time::timeout(STEP_TIMEOUT, async {
        while connector.remote.sizes().last() != Some(&TerminalSize::new(100, 50)) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("resize never reached the terminal");

    client.type_input("exit\n");
    client.read_to_close().await;
    finish(session).await.unwrap();

    let sizes = connector.remote.sizes();
    assert_eq!(sizes.first(), Some(&TerminalSize::new(80, 24)));
    assert_eq!(sizes.last(), Some(&TerminalSize::new(100, 50)));
}

#[tokio::test]
async fn malformed_resize_gets_one_notice_and_session_continues() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(None));

    client.resize(80, 24);
    client.send_text("1{bad json");
    client.type_input("ls\n");
    client.read_until("ls\n").await;

    let notices: Vec<String> = client
        .texts()
        .into_iter()
        .filter(|t| t.contains("malformed frame"))
        .collect();
    assert_eq!(notices.len(), 1);

    client.type_input("exit\n");
    client.read_to_close().await;
    let summary = finish(session).await.unwrap();
    assert_eq!(summary.exit, Some(SessionExit::Success));
    assert_eq!(connector.remote.sizes(), vec![TerminalSize::new(80, 24)]);
}

#[tokio::test]
async fn unknown_frame_tag_is_reported_not_fatal() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(None));

    client.resize(80, 24);
    client.send_text("9what");
    client.send_text("");
    client.type_input("pwd\n");
    client.read_until("pwd\n").await;

    client.type_input("exit\n");
    client.read_to_close().await;
    finish(session).await.unwrap();

    let notices = client
        .texts()
        .into_iter()
        .filter(|t| t.contains("malformed frame"))
        .count();
    assert_eq!(notices, 2);
    assert_eq!(connector.remote.lines(), vec!["pwd", "exit"]);
}

#[tokio::test]
async fn pipe_mode_streams_without_waiting_for_a_size() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let config = BridgeConfig {
        transport_mode: TransportMode::Pipe,
        ..fast_config()
    };
    let bridge = Arc::new(SessionBridge::new(connector.clone(), config));
    let (mut client, session) = start_session(bridge, request(None));

    client.type_input("whoami\n");
    client.read_until("whoami\n").await;
    // Ignored in pipe mode
    client.resize(100, 30);

    client.type_input("exit\n");
    client.read_to_close().await;
    let summary = finish(session).await.unwrap();
    assert_eq!(summary.exit, Some(SessionExit::Success));
    assert!(connector.remote.sizes().is_empty());
}

#[tokio::test]
async fn append_newline_turns_frames_into_lines() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let config = BridgeConfig {
        append_newline: true,
        ..fast_config()
    };
    let bridge = Arc::new(SessionBridge::new(connector.clone(), config));
    let (mut client, session) = start_session(bridge, request(None));

    client.resize(80, 24);
    client.type_input("date");
    client.read_until("date\n").await;

    client.type_input("exit");
    client.read_to_close().await;
    finish(session).await.unwrap();
    assert_eq!(connector.remote.lines(), vec!["date", "exit"]);
}

#[tokio::test]
async fn non_shell_command_is_rejected_before_connecting() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(Some("rm -rf /")));

    client.read_to_close().await;
    let err = finish(session).await.unwrap_err();

    assert!(matches!(err, Error::BadArgument(_)));
    assert_eq!(connector.connects(), 0);
    assert!(client.output().contains("sh-like"));
    assert_eq!(client.close_code(), Some(close_code::NORMAL));
}

#[tokio::test]
async fn missing_pod_name_is_rejected_before_connecting() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let mut req = request(None);
    req.pod_name.clear();
    let (mut client, session) = start_session(bridge, req);

    client.read_to_close().await;
    let err = finish(session).await.unwrap_err();

    assert!(matches!(err, Error::BadArgument(_)));
    assert_eq!(connector.connects(), 0);
    assert!(client.output().contains("podName"));
}

#[tokio::test]
async fn failed_handshake_is_reported_to_the_client() {
    let connector = Arc::new(FakeConnector::refusing());
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(None));

    client.read_to_close().await;
    let err = finish(session).await.unwrap_err();

    assert!(matches!(err, Error::TransportSetupFailed { .. }));
    assert!(err.is_rejection());
    assert_eq!(connector.connects(), 1);
    assert!(client.output().contains("not found"));
}

#[tokio::test]
async fn client_close_frame_ends_the_read_side() {
    let connector = Arc::new(FakeConnector::new(Shell::Interactive));
    let bridge = Arc::new(SessionBridge::new(connector.clone(), fast_config()));
    let (mut client, session) = start_session(bridge, request(None));

    client.resize(80, 24);
    client.type_input("ls\n");
    client.read_until("ls\n").await;
    client.close();

    client.read_to_close().await;
    let summary = finish(session).await.unwrap();
    assert_eq!(summary.drain_cause, ReadEnd::ClientDisconnected);
    assert_eq!(summary.exit, Some(SessionExit::Success));
}
