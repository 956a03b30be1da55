use std::sync::Arc;

use serde_json::{json, Value};

use crate::delivery::http::HttpPoster;
use crate::delivery::types::*;
use crate::error::AppError;
use crate::hub::types::ScheduleRunCommand;
use crate::hub::Scheduler;

/// Sends confirmed data to a single destination.
///
/// Every failure is folded into [`DeliveryResult::Failed`]; nothing escapes
/// this boundary as an error.
pub struct Deliverer {
    scheduler: Arc<dyn Scheduler>,
    http: Arc<dyn HttpPoster>,
}

impl Deliverer {
    pub fn new(scheduler: Arc<dyn Scheduler>, http: Arc<dyn HttpPoster>) -> Self {
        Self { scheduler, http }
    }

    pub async fn deliver(
        &self,
        destination: &Destination,
        data: &StructuredRecord,
        context: &DeliveryContext,
    ) -> DeliveryResult {
        match destination {
            Destination::Workflow(workflow) => self.schedule_workflow(workflow, data).await,
            Destination::Webhook(webhook) => self.send_webhook(webhook, data, context).await,
        }
    }

    async fn schedule_workflow(
        &self,
        destination: &WorkflowDestination,
        data: &StructuredRecord,
    ) -> DeliveryResult {
        tracing::info!(host = %destination.host, "Scheduling workflow run");

        let command = ScheduleRunCommand {
            host: destination.host.clone(),
            workflows: destination.workflows.clone(),
            tags: destination.runner_tags.clone(),
            data: data.clone(),
        };

        match self.scheduler.schedule_run(&command).await {
            Ok(schedule) => {
                tracing::info!(host = %destination.host, schedule_id = %schedule.id, "Scheduled workflow run");
                DeliveryResult::Workflow {
                    schedule_id: schedule.id,
                }
            }
            Err(e) => DeliveryResult::failed(DestinationType::Workflow, failure_message(e)),
        }
    }

    async fn send_webhook(
        &self,
        destination: &WebhookDestination,
        data: &StructuredRecord,
        context: &DeliveryContext,
    ) -> DeliveryResult {
        tracing::info!(url = %destination.url, "Sending webhook");

        let body = webhook_payload(data, context);

        match self
            .http
            .post_json(&destination.url, &destination.headers, &body)
            .await
        {
            Ok(response) => {
                tracing::info!(
                    url = %destination.url,
                    status = response.status_code,
                    "Sent webhook"
                );
                DeliveryResult::Webhook {
                    response: WebhookResponse {
                        status_code: response.status_code,
                        headers: response.headers,
                        body: response.body,
                    },
                }
            }
            Err(e) => DeliveryResult::failed(DestinationType::Webhook, failure_message(e)),
        }
    }
}

/// JSON body posted to webhook destinations.
pub fn webhook_payload(data: &StructuredRecord, context: &DeliveryContext) -> Value {
    json!({
        "data": data,
        "agent_id": context.agent_id.to_string(),
        "agent_execution_id": context.agent_execution_id.to_string(),
        "workspace_id": context.workspace_id.to_string(),
    })
}

fn failure_message(e: AppError) -> String {
    match e {
        AppError::Delivery(message) | AppError::Scheduler(message) => message,
        other => other.to_string(),
    }
}
