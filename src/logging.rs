//! Log output for the `netbench` binary.
//!
//! Library crates log through the `log` facade; the subscriber installed here
//! also captures those records. `RUST_LOG` takes precedence over the
//! configured level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{BenchError, BenchErrorKind, BenchResult};

/// Filter used when `RUST_LOG` is unset.
fn default_filter(level: &str) -> String {
    format!(
        "netbench={lvl},nbench_remoting={lvl},nbench_azure={lvl},warn",
        lvl = level
    )
}

pub fn init_logging(config: &LoggingConfig) -> BenchResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(&config.level)))
        .map_err(|e| {
            BenchError::new(
                BenchErrorKind::Logging,
                format!("Invalid log level '{}': {}", config.level, e),
            )
        })?;

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    installed.map_err(|e| BenchError::new(BenchErrorKind::Logging, e.to_string()))
}
