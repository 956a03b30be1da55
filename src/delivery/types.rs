use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema-shaped data, opaque to the pipeline beyond being passed through.
pub type StructuredRecord = serde_json::Value;

/// A configured target for confirmed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Destination {
    #[serde(rename = "ASKUI_WORKFLOW", alias = "WORKFLOW")]
    Workflow(WorkflowDestination),
    #[serde(rename = "WEBHOOK")]
    Webhook(WebhookDestination),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDestination {
    pub host: String,
    #[serde(default)]
    pub workflows: BTreeSet<String>,
    #[serde(default)]
    pub runner_tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDestination {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationType {
    #[serde(alias = "ASKUI_WORKFLOW")]
    Workflow,
    Webhook,
}

impl std::fmt::Display for DestinationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestinationType::Workflow => f.write_str("WORKFLOW"),
            DestinationType::Webhook => f.write_str("WEBHOOK"),
        }
    }
}

impl Destination {
    pub fn destination_type(&self) -> DestinationType {
        match self {
            Destination::Workflow(_) => DestinationType::Workflow,
            Destination::Webhook(_) => DestinationType::Webhook,
        }
    }

    /// Short human-readable target, used in log fields.
    pub fn target(&self) -> &str {
        match self {
            Destination::Workflow(w) => &w.host,
            Destination::Webhook(w) => &w.url,
        }
    }
}

/// Outcome of delivering to one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryResult {
    // Records written by older drivers use the destination tag and snake_case keys.
    #[serde(alias = "ASKUI_WORKFLOW")]
    Workflow {
        #[serde(rename = "scheduleId", alias = "schedule_id")]
        schedule_id: String,
    },
    Webhook {
        response: WebhookResponse,
    },
    Failed {
        #[serde(rename = "destinationType", alias = "destination_type")]
        destination_type: DestinationType,
        #[serde(rename = "errorMessage", alias = "error_message")]
        error_message: String,
    },
}

impl DeliveryResult {
    pub fn failed(destination_type: DestinationType, error_message: impl Into<String>) -> Self {
        DeliveryResult::Failed {
            destination_type,
            error_message: error_message.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DeliveryResult::Failed { .. })
    }
}

/// Snapshot of the response a webhook destination returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    #[serde(alias = "status_code")]
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Identifiers echoed into deliveries for traceability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryContext {
    pub agent_id: Uuid,
    pub agent_execution_id: Uuid,
    pub workspace_id: Uuid,
}
