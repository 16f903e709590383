//! Benchmark run orchestration.
//!
//! Brings up sessions to both hosts, pushes the payload to each, runs the
//! benchmark commands and collects measurements. The first host failure
//! aborts the run; sessions are closed on every exit path.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use nbench_remoting::{
    send_file, send_folder, Connector, FileCopyParams, FolderTransferSummary, PollPolicy,
    ReadinessCheck, RemoteCommand, RemoteFs, RemotingError, SessionRegistry, TransferOutcome,
};

use crate::config::BenchConfig;
use crate::error::BenchResult;
use crate::results::{parse_measurements, BandwidthMeasurement, BandwidthSummary};

/// Payload push result for one host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PayloadOutcome {
    File { outcome: TransferOutcome },
    Folder { summary: FolderTransferSummary },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchReport {
    pub payload: Vec<(String, PayloadOutcome)>,
    pub measurements: Vec<BandwidthMeasurement>,
    pub summary: Option<BandwidthSummary>,
}

pub struct BenchmarkDriver<R, C: Connector<String>> {
    config: BenchConfig,
    readiness: R,
    connector: C,
    registry: SessionRegistry<String, C::Session>,
}

impl<R, C> BenchmarkDriver<R, C>
where
    R: ReadinessCheck<String>,
    C: Connector<String>,
    C::Session: RemoteFs + RemoteCommand,
{
    pub fn new(config: BenchConfig, readiness: R, connector: C) -> Self {
        Self {
            config,
            readiness,
            connector,
            registry: SessionRegistry::new(),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.config.poll.interval_sec),
            max_attempts: self.config.poll.max_attempts,
        }
    }

    /// Run the benchmark end to end.
    pub async fn run(&mut self) -> BenchResult<BenchReport> {
        let result = self.run_inner().await;
        let closed = self.registry.close_all().await;
        info!("Closed {} session(s)", closed);
        result
    }

    async fn run_inner(&mut self) -> BenchResult<BenchReport> {
        let keys = self.config.host_keys();
        info!("Waiting for sessions to {}", keys.join(", "));
        self.registry
            .wait_for_sessions(&keys, &self.readiness, &self.connector, self.poll_policy())
            .await?;

        let mut payload = Vec::with_capacity(keys.len());
        for key in &keys {
            let outcome = self.push_payload(key).await?;
            payload.push((key.clone(), outcome));
        }

        if let Some(cmd) = self.config.benchmark.server_command.clone() {
            let server = self.config.server.name.clone();
            info!("Starting benchmark server on {}", server);
            self.session(&server)?.run_script(&cmd).await?;
        }

        let client = self.config.client.name.clone();
        let cmd = self.config.benchmark.client_command.clone();
        info!("Running benchmark client on {}", client);
        let stdout = self.session(&client)?.run_script(&cmd).await?;

        let measurements = parse_measurements(&stdout);
        let summary = BandwidthSummary::from_measurements(&measurements);
        match &summary {
            Some(s) => info!(
                "{} run(s): avg {:.1} Mbit/s (min {:.1}, max {:.1})",
                s.runs, s.avg_throughput_mbps, s.min_throughput_mbps, s.max_throughput_mbps
            ),
            None => warn!("Benchmark output contained no measurement records"),
        }

        Ok(BenchReport {
            payload,
            measurements,
            summary,
        })
    }

    async fn push_payload(&mut self, key: &String) -> BenchResult<PayloadOutcome> {
        let payload = self.config.payload.clone();
        let session = self.session(key)?;

        if payload.local_path.is_dir() {
            let summary = send_folder(
                session,
                &payload.local_path,
                &payload.remote_path,
                payload.skip_if_exists,
                payload.chunk_size,
            )
            .await?;
            Ok(PayloadOutcome::Folder { summary })
        } else {
            let params = FileCopyParams::new(&payload.local_path, payload.remote_path.clone())
                .skip_if_exists(payload.skip_if_exists)
                .with_chunk_size(payload.chunk_size);
            let outcome = send_file(session, &params).await?;
            Ok(PayloadOutcome::File { outcome })
        }
    }

    fn session(&mut self, key: &String) -> Result<&mut C::Session, RemotingError> {
        self.registry
            .get_mut(key)
            .ok_or_else(|| RemotingError::connect(key, "no session registered"))
    }

    pub fn registry(&self) -> &SessionRegistry<String, C::Session> {
        &self.registry
    }
}
