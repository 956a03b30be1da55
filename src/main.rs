use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use courier::config::AppConfig;
use courier::delivery::http::ReqwestPoster;
use courier::delivery::Deliverer;
use courier::execution::{RunMode, RunOutcome, Runner};
use courier::extraction::openai::ChatExtractor;
use courier::hub::client::HubClient;
use courier::shutdown::{run_until_shutdown, wait_for_shutdown};
use courier::workspace::WorkspaceManager;

#[derive(Parser)]
#[command(
    name = "courier",
    about = "Advance an agent execution through extraction, review and delivery"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Block while the execution waits for review instead of exiting
    #[arg(long)]
    wait: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = AppConfig::load(cli.config.as_deref())?;

    tracing::info!(
        agent_id = %config.execution.agent_id,
        execution_id = %config.execution.agent_execution_id,
        hub = %config.hub.endpoint,
        "Starting courier"
    );

    let hub = Arc::new(HubClient::new(&config.hub)?);
    let poster = Arc::new(ReqwestPoster::new(
        config.delivery.webhook_timeout(),
        config.delivery.signing_secret.clone(),
    )?);
    let deliverer = Arc::new(Deliverer::new(hub.clone(), poster));

    let mode = if cli.wait { RunMode::Wait } else { RunMode::OneShot };

    let runner = Runner::new(
        hub.clone(),
        hub,
        Arc::new(ChatExtractor::new(&config.extraction)?),
        deliverer,
        WorkspaceManager::new(&config.workspace),
    )
    .with_mode(mode)
    .with_concurrent_delivery(config.delivery.concurrent)
    .with_expected_agent(config.execution.agent_id)
    .with_expected_workspace(config.execution.workspace_id);

    let execution_id = config.execution.agent_execution_id;

    match run_until_shutdown(runner.run_once(execution_id), wait_for_shutdown()).await {
        Ok(Ok(outcome)) => {
            match outcome {
                RunOutcome::Canceled => tracing::info!("Execution was canceled - exiting"),
                RunOutcome::AwaitingReview => tracing::info!("Execution awaits review - exiting"),
                RunOutcome::Delivered { deliveries } => {
                    let failed = deliveries.iter().filter(|d| d.is_failed()).count();
                    tracing::info!(
                        deliveries = deliveries.len(),
                        failed,
                        "Execution has ended (DELIVERED_TO_DESTINATION) - exiting"
                    );
                }
            }
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!(execution_id = %execution_id, error = %e, "Run failed");
            Err(e.into())
        }
        Err(signal) => {
            tracing::warn!(
                execution_id = %execution_id,
                signal = ?signal,
                "Run interrupted; hub state left as last persisted"
            );
            Ok(())
        }
    }
}
