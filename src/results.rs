//! Bandwidth measurement records.

use log::debug;
use serde::{Deserialize, Serialize};

/// One benchmark run as reported by the client-side command.
///
/// Read from the command's snake_case JSON lines, written camelCase in the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct BandwidthMeasurement {
    pub throughput_mbps: f64,
    pub duration_secs: f64,
    pub bytes_transferred: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retransmits: Option<u64>,
}

/// Aggregate over a set of measurements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthSummary {
    pub runs: usize,
    pub avg_throughput_mbps: f64,
    pub min_throughput_mbps: f64,
    pub max_throughput_mbps: f64,
    pub avg_duration_secs: f64,
    pub total_bytes: u64,
    /// Present only when at least one run reported retransmits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_retransmits: Option<u64>,
}

impl BandwidthSummary {
    pub fn from_measurements(runs: &[BandwidthMeasurement]) -> Option<Self> {
        if runs.is_empty() {
            return None;
        }
        let n = runs.len() as f64;
        let throughput = runs.iter().map(|m| m.throughput_mbps);

        let total_retransmits = runs
            .iter()
            .filter_map(|m| m.retransmits)
            .fold(None, |acc: Option<u64>, r| Some(acc.unwrap_or(0) + r));

        Some(Self {
            runs: runs.len(),
            avg_throughput_mbps: throughput.clone().sum::<f64>() / n,
            min_throughput_mbps: throughput.clone().fold(f64::INFINITY, f64::min),
            max_throughput_mbps: throughput.fold(f64::NEG_INFINITY, f64::max),
            avg_duration_secs: runs.iter().map(|m| m.duration_secs).sum::<f64>() / n,
            total_bytes: runs.iter().map(|m| m.bytes_transferred).sum(),
            total_retransmits,
        })
    }
}

/// Collect every stdout line that is a JSON measurement record.
pub fn parse_measurements(stdout: &str) -> Vec<BandwidthMeasurement> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .filter_map(|l| match serde_json::from_str::<BandwidthMeasurement>(l) {
            Ok(m) => Some(m),
            Err(e) => {
                debug!("Ignoring non-measurement line ({}): {}", e, l);
                None
            }
        })
        .collect()
}
