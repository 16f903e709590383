mod common;

use std::path::Path;

use common::MemConnector;
use nbench_remoting::{AlwaysReady, RemotingErrorKind, TransferOutcome};
use netbench::{BenchConfig, BenchErrorKind, BenchmarkDriver, PayloadOutcome};

fn config(payload: &Path, skip: bool) -> BenchConfig {
    let json = serde_json::json!({
        "server": {"name": "server", "address": "10.0.0.4"},
        "client": {"name": "client", "address": "10.0.0.5"},
        "remoting": {"credential": {"username": "bench"}},
        "payload": {
            "localPath": payload,
            "remotePath": "C:/netbench/payload",
            "skipIfExists": skip,
            "chunkSize": 4
        },
        "benchmark": {"serverCommand": "start-server", "clientCommand": "run-client"},
        "poll": {"intervalSec": 0, "maxAttempts": 1}
    });
    BenchConfig::from_json(&json.to_string()).unwrap()
}

fn connector_with_output() -> MemConnector {
    let mut c = MemConnector::default();
    c.script_output.insert(
        "client".into(),
        "warming up\n\
         {\"throughput_mbps\": 800.0, \"duration_secs\": 10.0, \"bytes_transferred\": 1000}\n\
         {\"throughput_mbps\": 1000.0, \"duration_secs\": 10.0, \"bytes_transferred\": 1250}\n"
            .into(),
    );
    c
}

#[tokio::test]
async fn test_run_pushes_payload_and_summarises() {
    let tmp = tempfile::tempdir().unwrap();
    let payload = tmp.path().join("payload.bin");
    std::fs::write(&payload, b"0123456789").unwrap();
    let connector = connector_with_output();
    let server_disk = connector.disk("server");
    let client_disk = connector.disk("client");
    let ops = connector.ops.clone();

    let mut driver = BenchmarkDriver::new(config(&payload, true), AlwaysReady, connector);
    let report = driver.run().await.unwrap();

    assert_eq!(report.payload.len(), 2);
    for (_, outcome) in &report.payload {
        assert_eq!(
            *outcome,
            PayloadOutcome::File {
                outcome: TransferOutcome::Completed { bytes: 10, chunks: 3 }
            }
        );
    }
    for disk in [server_disk, client_disk] {
        assert_eq!(disk.lock().unwrap()["C:/netbench/payload"], b"0123456789");
    }

    let summary = report.summary.unwrap();
    assert_eq!(summary.runs, 2);
    assert_eq!(summary.avg_throughput_mbps, 900.0);

    let ops = ops.lock().unwrap().clone();
    let server_start = ops.iter().position(|o| o == "run start-server").unwrap();
    let client_run = ops.iter().position(|o| o == "run run-client").unwrap();
    assert!(server_start < client_run);
    assert_eq!(ops.iter().filter(|o| *o == "close").count(), 2);
    assert!(driver.registry().is_empty());
}

#[tokio::test]
async fn test_run_pushes_folder_payload() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("payload");
    std::fs::create_dir_all(root.join("bin")).unwrap();
    std::fs::write(root.join("bin").join("tool.exe"), b"tool").unwrap();
    std::fs::write(root.join("readme.txt"), b"hi").unwrap();
    let connector = connector_with_output();
    let server_disk = connector.disk("server");

    let mut driver = BenchmarkDriver::new(config(&root, false), AlwaysReady, connector);
    let report = driver.run().await.unwrap();

    match &report.payload[0].1 {
        PayloadOutcome::Folder { summary } => {
            assert_eq!(summary.files_sent, 2);
            assert_eq!(summary.bytes_sent, 6);
        }
        other => panic!("expected folder outcome, got {:?}", other),
    }
    let disk = server_disk.lock().unwrap();
    assert_eq!(disk["C:/netbench/payload/bin/tool.exe"], b"tool");
    assert_eq!(disk["C:/netbench/payload/readme.txt"], b"hi");
}

#[tokio::test]
async fn test_unreachable_host_fails_fast() {
    let tmp = tempfile::tempdir().unwrap();
    let payload = tmp.path().join("payload.bin");
    std::fs::write(&payload, b"x").unwrap();
    let connector = MemConnector::failing(&["client"]);
    let ops = connector.ops.clone();

    let mut driver = BenchmarkDriver::new(config(&payload, true), AlwaysReady, connector);
    let err = driver.run().await.unwrap_err();

    assert_eq!(err.kind, BenchErrorKind::Remoting);
    assert_eq!(err.remoting.unwrap().kind, RemotingErrorKind::Connect);
    let ops = ops.lock().unwrap().clone();
    assert!(ops.iter().all(|o| !o.starts_with("append")));
    // the server session that did open is still closed
    assert_eq!(ops, vec!["close".to_string()]);
}

#[tokio::test]
async fn test_missing_payload_aborts_before_benchmark() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = connector_with_output();
    let ops = connector.ops.clone();

    let mut driver = BenchmarkDriver::new(
        config(&tmp.path().join("absent.bin"), true),
        AlwaysReady,
        connector,
    );
    let err = driver.run().await.unwrap_err();

    assert_eq!(err.remoting.unwrap().kind, RemotingErrorKind::SourceNotFound);
    let ops = ops.lock().unwrap().clone();
    assert!(ops.iter().all(|o| !o.starts_with("run ")));
}
