mod common;

use async_trait::async_trait;
use mockall::mock;
use std::time::Duration;

use common::{keys, MemConnector, MemSession};
use nbench_remoting::{
    AlwaysReady, EnsureOutcome, PollPolicy, ReadinessCheck, RemoteSession, RemotingErrorKind,
    SessionRegistry, SessionState,
};

mock! {
    pub Readiness {}

    #[async_trait]
    impl ReadinessCheck<String> for Readiness {
        async fn is_ready(&self, key: &String) -> bool;
    }
}

fn registry() -> SessionRegistry<String, MemSession> {
    SessionRegistry::new()
}

#[tokio::test]
async fn test_one_failing_connector_does_not_block_others() {
    let mut reg = registry();
    let hosts = keys(&["vm-a", "vm-b", "vm-c"]);
    let connector = MemConnector::failing(&["vm-b"]);

    let report = reg.ensure_sessions(&hosts, &AlwaysReady, &connector).await;

    assert_eq!(report[0].1, EnsureOutcome::Connected);
    match &report[1].1 {
        EnsureOutcome::Failed(e) => {
            assert_eq!(e.kind, RemotingErrorKind::Connect);
            assert_eq!(e.host.as_deref(), Some("vm-b"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report[2].1, EnsureOutcome::Connected);
    assert!(reg.get(&"vm-a".to_string()).is_some());
    assert!(reg.get(&"vm-b".to_string()).is_none());
    assert!(reg.get(&"vm-c".to_string()).is_some());
    assert_eq!(connector.calls(), hosts);
}

#[tokio::test]
async fn test_open_sessions_skip_readiness_and_connector() {
    let mut reg = registry();
    let hosts = keys(&["server", "client"]);
    let connector = MemConnector::default();
    reg.ensure_sessions(&hosts, &AlwaysReady, &connector).await;

    let mut readiness = MockReadiness::new();
    readiness.expect_is_ready().never();
    let report = reg.ensure_sessions(&hosts, &readiness, &connector).await;

    assert!(report.iter().all(|(_, o)| *o == EnsureOutcome::Reused));
    assert_eq!(connector.calls().len(), 2);
}

#[tokio::test]
async fn test_readiness_gates_connect() {
    let mut reg = registry();
    let connector = MemConnector::default();
    let mut readiness = MockReadiness::new();
    readiness
        .expect_is_ready()
        .withf(|k| k == "server")
        .times(1)
        .return_const(false);
    readiness
        .expect_is_ready()
        .withf(|k| k == "client")
        .times(1)
        .return_const(true);

    let report = reg
        .ensure_sessions(&keys(&["server", "client"]), &readiness, &connector)
        .await;

    assert_eq!(report[0].1, EnsureOutcome::NotReady);
    assert_eq!(report[1].1, EnsureOutcome::Connected);
    assert_eq!(connector.calls(), keys(&["client"]));
}

#[tokio::test]
async fn test_closed_session_is_replaced_not_mutated() {
    let mut reg = registry();
    let hosts = keys(&["server"]);
    let connector = MemConnector::default();
    reg.ensure_sessions(&hosts, &AlwaysReady, &connector).await;
    reg.get_mut(&hosts[0]).unwrap().close().await.unwrap();

    let report = reg.ensure_sessions(&hosts, &AlwaysReady, &connector).await;

    assert_eq!(report[0].1, EnsureOutcome::Connected);
    assert_eq!(reg.get(&hosts[0]).unwrap().state(), SessionState::Opened);
    assert_eq!(connector.calls().len(), 2);
    assert_eq!(reg.len(), 1);
}

#[tokio::test]
async fn test_wait_for_sessions_polls_until_ready() {
    let mut reg = registry();
    let hosts = keys(&["server"]);
    let connector = MemConnector::default();
    let mut readiness = MockReadiness::new();
    let mut seq = mockall::Sequence::new();
    readiness
        .expect_is_ready()
        .times(2)
        .in_sequence(&mut seq)
        .return_const(false);
    readiness
        .expect_is_ready()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(true);

    let policy = PollPolicy {
        interval: Duration::from_millis(5),
        max_attempts: 5,
    };
    reg.wait_for_sessions(&hosts, &readiness, &connector, policy)
        .await
        .unwrap();

    assert!(reg.all_open(&hosts));
    assert_eq!(connector.calls().len(), 1);
}

#[tokio::test]
async fn test_wait_for_sessions_reports_stuck_hosts() {
    let mut reg = registry();
    let connector = MemConnector::failing(&["client"]);
    let policy = PollPolicy {
        interval: Duration::from_millis(1),
        max_attempts: 2,
    };

    let err = reg
        .wait_for_sessions(&keys(&["server", "client"]), &AlwaysReady, &connector, policy)
        .await
        .unwrap_err();

    assert_eq!(err.kind, RemotingErrorKind::Connect);
    assert!(err.message.contains("client"));
    assert!(!err.message.contains("server"));
    // server connected once and was reused on the second attempt
    assert_eq!(connector.calls(), keys(&["server", "client", "client"]));
}

#[tokio::test]
async fn test_replaced_broken_session_is_closed() {
    let mut reg = registry();
    let hosts = keys(&["client"]);
    let connector = MemConnector::default();
    reg.ensure_sessions(&hosts, &AlwaysReady, &connector).await;
    reg.get_mut(&hosts[0]).unwrap().state = SessionState::Broken;

    let report = reg.ensure_sessions(&hosts, &AlwaysReady, &connector).await;

    assert_eq!(report[0].1, EnsureOutcome::Connected);
    assert_eq!(reg.get(&hosts[0]).unwrap().state(), SessionState::Opened);
    assert_eq!(connector.ops.lock().unwrap().clone(), vec!["close".to_string()]);
}
