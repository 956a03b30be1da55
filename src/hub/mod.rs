pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AppError, Result};
use types::*;

/// Record store that owns execution state and agent configuration.
#[async_trait]
pub trait Hub: Send + Sync {
    /// Fetch an execution with its current state.
    async fn get_execution(&self, execution_id: Uuid) -> Result<AgentExecution>;

    /// Persist a new state; returns the execution as the hub stored it.
    async fn update_execution_state(
        &self,
        execution_id: Uuid,
        state: &ExecutionState,
    ) -> Result<AgentExecution>;

    /// Fetch an agent's data schema and destinations.
    async fn get_agent(&self, agent_id: Uuid) -> Result<Agent>;

    /// Block until the execution reaches one of `targets` (or a terminal status).
    async fn wait_for_status(
        &self,
        execution_id: Uuid,
        targets: &[ExecutionStatus],
    ) -> Result<AgentExecution>;
}

/// Remote workflow scheduler.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule_run(&self, command: &ScheduleRunCommand) -> Result<Schedule>;
}

/// Poll `get_execution` until the status is one of `targets`.
///
/// Terminal statuses also end the wait since nothing can follow them.
pub async fn poll_for_status<H>(
    hub: &H,
    execution_id: Uuid,
    targets: &[ExecutionStatus],
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<AgentExecution>
where
    H: Hub + ?Sized,
{
    let started = tokio::time::Instant::now();

    loop {
        let execution = hub.get_execution(execution_id).await?;
        let status = execution.state.status();

        if targets.contains(&status) || status.is_terminal() {
            tracing::debug!(
                execution_id = %execution_id,
                status = %status,
                "Execution reached awaited status"
            );
            return Ok(execution);
        }

        if let Some(timeout) = timeout {
            if started.elapsed() + interval > timeout {
                let wanted = targets
                    .iter()
                    .map(ExecutionStatus::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(AppError::HubTimeout(format!(
                    "execution {execution_id} still {status} after {}s (waiting for {wanted})",
                    timeout.as_secs()
                )));
            }
        }

        tokio::time::sleep(interval).await;
    }
}
