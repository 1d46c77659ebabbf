//! Client E2E tests. Require a real agent CLI binary; skipped otherwise.

use cli_agent_sdk::{Client, ClientOptions, ConnectionState};

mod testharness;
use testharness::cli_path;

macro_rules! require_cli {
    () => {
        if cli_path().is_none() {
            eprintln!("Skipping test: agent CLI not found. Set CLI_AGENT_PATH or build one.");
            return;
        }
    };
}

#[tokio::test]
async fn test_start_and_connect_using_stdio() {
    require_cli!();

    let cli = cli_path().unwrap();
    let client = Client::new(Some(ClientOptions {
        cli_path: Some(cli),
        use_stdio: Some(true),
        ..Default::default()
    }));

    let result = client.start().await;
    assert!(result.is_ok(), "failed to start client: {:?}", result.err());
    assert_eq!(client.get_state(), ConnectionState::Connected);

    let pong = client.ping(Some("test message")).await;
    assert!(pong.is_ok(), "failed to ping: {:?}", pong.err());
    assert!(pong.unwrap().timestamp >= 0);

    let errors = client.stop().await;
    assert!(errors.is_empty(), "expected no errors on stop, got: {errors:?}");
    assert_eq!(client.get_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_start_and_connect_using_tcp() {
    require_cli!();

    let cli = cli_path().unwrap();
    let client = Client::new(Some(ClientOptions {
        cli_path: Some(cli),
        use_stdio: Some(false),
        ..Default::default()
    }));

    let result = client.start().await;
    assert!(result.is_ok(), "failed to start client: {:?}", result.err());
    assert_eq!(client.get_state(), ConnectionState::Connected);

    let pong = client.ping(Some("test message")).await;
    assert!(pong.is_ok(), "failed to ping: {:?}", pong.err());

    let errors = client.stop().await;
    assert!(errors.is_empty(), "expected no errors on stop, got: {errors:?}");
    assert_eq!(client.get_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_force_stop_without_cleanup() {
    require_cli!();

    let cli = cli_path().unwrap();
    let client = Client::new(Some(ClientOptions { cli_path: Some(cli), ..Default::default() }));

    let session = client.create_session(None).await;
    assert!(session.is_ok(), "failed to create session: {:?}", session.err());

    client.force_stop().await;
    assert_eq!(client.get_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_auto_start_on_create_session() {
    require_cli!();

    let cli = cli_path().unwrap();
    let client = Client::new(Some(ClientOptions {
        cli_path: Some(cli),
        auto_start: Some(true),
        ..Default::default()
    }));

    assert_eq!(client.get_state(), ConnectionState::Disconnected);

    let session = client.create_session(None).await;
    assert!(session.is_ok(), "failed to create session: {:?}", session.err());
    assert_eq!(client.get_state(), ConnectionState::Connected);

    client.force_stop().await;
}
