//! # netbench
//!
//! Two-VM network throughput benchmark. Sessions and payload transfer live
//! in `nbench-remoting`, VM readiness in `nbench-azure`; this crate wires
//! them together with configuration, logging and result records.

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod results;

pub use config::BenchConfig;
pub use driver::{BenchReport, BenchmarkDriver, PayloadOutcome};
pub use error::{BenchError, BenchErrorKind, BenchResult};
pub use results::{parse_measurements, BandwidthMeasurement, BandwidthSummary};
