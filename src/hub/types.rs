use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::delivery::types::{DeliveryResult, Destination, StructuredRecord};
use crate::error::{AppError, Result};

/// Status discriminator of an execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    PendingDataExtraction,
    PendingReview,
    Confirmed,
    Canceled,
    DeliveredToDestination,
}

impl ExecutionStatus {
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "PENDING_DATA_EXTRACTION" => Some(Self::PendingDataExtraction),
            "PENDING_REVIEW" => Some(Self::PendingReview),
            "CONFIRMED" => Some(Self::Confirmed),
            "CANCELED" => Some(Self::Canceled),
            "DELIVERED_TO_DESTINATION" => Some(Self::DeliveredToDestination),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingDataExtraction => "PENDING_DATA_EXTRACTION",
            Self::PendingReview => "PENDING_REVIEW",
            Self::Confirmed => "CONFIRMED",
            Self::Canceled => "CANCELED",
            Self::DeliveredToDestination => "DELIVERED_TO_DESTINATION",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeliveredToDestination)
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    ///
    /// Cancellation is reachable from any non-terminal status; otherwise a
    /// status may only advance along the pipeline.
    pub fn can_advance_to(&self, next: ExecutionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Canceled {
            return true;
        }
        next.pipeline_position() > self.pipeline_position()
    }

    fn pipeline_position(&self) -> u8 {
        match self {
            Self::PendingDataExtraction => 0,
            Self::PendingReview => 1,
            Self::Confirmed => 2,
            Self::DeliveredToDestination => 3,
            Self::Canceled => u8::MAX,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state of an agent execution as persisted by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    PendingDataExtraction,
    PendingReview {
        #[serde(rename = "dataExtracted")]
        data_extracted: StructuredRecord,
    },
    Confirmed {
        #[serde(rename = "dataConfirmed")]
        data_confirmed: StructuredRecord,
    },
    Canceled,
    DeliveredToDestination {
        deliveries: Vec<DeliveryResult>,
    },
}

impl ExecutionState {
    /// Resolve a raw state envelope by its `status` discriminator.
    ///
    /// An unknown status is reported as [`AppError::UnknownState`] rather than
    /// a generic deserialization failure.
    pub fn from_value(value: Value) -> Result<Self> {
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::UnknownState("state has no status field".to_string()))?;

        if ExecutionStatus::parse(status).is_none() {
            return Err(AppError::UnknownState(status.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }

    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::PendingDataExtraction => ExecutionStatus::PendingDataExtraction,
            Self::PendingReview { .. } => ExecutionStatus::PendingReview,
            Self::Confirmed { .. } => ExecutionStatus::Confirmed,
            Self::Canceled => ExecutionStatus::Canceled,
            Self::DeliveredToDestination { .. } => ExecutionStatus::DeliveredToDestination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExecution {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub workspace_id: Uuid,
    pub state: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAgentExecution {
    id: Uuid,
    agent_id: Uuid,
    workspace_id: Uuid,
    state: Value,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl AgentExecution {
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawAgentExecution = serde_json::from_value(value)?;
        Ok(Self {
            id: raw.id,
            agent_id: raw.agent_id,
            workspace_id: raw.workspace_id,
            state: ExecutionState::from_value(raw.state)?,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        })
    }
}

/// Agent configuration: what to extract and where to deliver it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: Uuid,
    pub workspace_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub data_schema: Value,
    #[serde(default)]
    pub data_destinations: Vec<Destination>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRunCommand {
    pub host: String,
    pub workflows: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub data: StructuredRecord,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Schedule {
    pub id: String,
}

/// A file stored on the hub.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteFile {
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
}
