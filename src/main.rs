use std::process::ExitCode;

use log::error;

use nbench_azure::{AzureClient, AzureReadiness};
use nbench_remoting::{AlwaysReady, ReadinessCheck, WinRmConnector};

use netbench::config::{BenchConfig, LoggingConfig};
use netbench::logging::init_logging;
use netbench::{BenchResult, BenchmarkDriver};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match BenchConfig::load() {
        Ok(c) => c,
        Err(e) => {
            match init_logging(&LoggingConfig::default()) {
                Ok(()) => error!("{}", e),
                Err(log_err) => eprintln!("{}\n{}", log_err, e),
            }
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        return ExitCode::from(2);
    }

    tracing::info!(
        server = %config.server.address,
        client = %config.client.address,
        payload = %config.payload.local_path.display(),
        "Starting netbench run"
    );

    let result = match config.azure.clone() {
        Some(azure) => {
            let client = AzureClient::new(azure.credentials, azure.client);
            let readiness = AzureReadiness::new(client, azure.resource_group);
            execute(config, readiness).await
        }
        None => execute(config, AlwaysReady).await,
    };

    match result {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Could not serialize report: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("Benchmark run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute<R>(config: BenchConfig, readiness: R) -> BenchResult<netbench::BenchReport>
where
    R: ReadinessCheck<String>,
{
    let connector = WinRmConnector::new(config.remoting.clone())
        .with_address(config.server.name.clone(), config.server.address.clone())
        .with_address(config.client.name.clone(), config.client.address.clone());

    let mut driver = BenchmarkDriver::new(config, readiness, connector);
    driver.run().await
}
