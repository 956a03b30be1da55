use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::HubConfig;
use crate::error::{AppError, Result};
use crate::hub::types::*;
use crate::hub::{poll_for_status, Hub, Scheduler};
use crate::workspace::FileSource;

const API_PREFIX: &str = "/api/v1";

/// REST client for the hub record store, scheduler and file storage.
pub struct HubClient {
    client: Client,
    base_url: String,
    token: String,
    config: HubConfig,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    data: Vec<RemoteFile>,
}

impl HubClient {
    pub fn new(config: &HubConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build hub HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            config: config.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{API_PREFIX}{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    /// Turn a non-2xx response into a hub error carrying the body.
    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Hub(format!("{what} returned {status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl Hub for HubClient {
    async fn get_execution(&self, execution_id: Uuid) -> Result<AgentExecution> {
        let response = self
            .request(Method::GET, &format!("/agent-executions/{execution_id}"))
            .send()
            .await?;
        let body: Value = Self::check(response, "get agent execution").await?.json().await?;
        AgentExecution::from_value(body)
    }

    async fn update_execution_state(
        &self,
        execution_id: Uuid,
        state: &ExecutionState,
    ) -> Result<AgentExecution> {
        let response = self
            .request(Method::PATCH, &format!("/agent-executions/{execution_id}"))
            .json(&json!({ "state": state }))
            .send()
            .await?;
        let body: Value = Self::check(response, "update agent execution")
            .await?
            .json()
            .await?;
        AgentExecution::from_value(body)
    }

    async fn get_agent(&self, agent_id: Uuid) -> Result<Agent> {
        let response = self
            .request(Method::GET, &format!("/agents/{agent_id}"))
            .send()
            .await?;
        let agent = Self::check(response, "get agent").await?.json().await?;
        Ok(agent)
    }

    async fn wait_for_status(
        &self,
        execution_id: Uuid,
        targets: &[ExecutionStatus],
    ) -> Result<AgentExecution> {
        poll_for_status(
            self,
            execution_id,
            targets,
            self.config.poll_interval(),
            self.config.wait_timeout(),
        )
        .await
    }
}

#[async_trait]
impl Scheduler for HubClient {
    async fn schedule_run(&self, command: &ScheduleRunCommand) -> Result<Schedule> {
        let response = self
            .request(Method::POST, "/schedules")
            .json(command)
            .send()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to reach scheduler: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Scheduler(format!(
                "Schedule request returned {status}: {body}"
            )));
        }

        response
            .json::<Schedule>()
            .await
            .map_err(|e| AppError::Scheduler(format!("Invalid schedule response: {e}")))
    }
}

#[async_trait]
impl FileSource for HubClient {
    async fn list_files(&self, prefix: &str) -> Result<Vec<RemoteFile>> {
        let response = self
            .request(Method::GET, "/files")
            .query(&[("prefix", prefix)])
            .send()
            .await
            .map_err(|e| AppError::Download(format!("Failed to list files: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Download(format!(
                "List files returned {status}: {body}"
            )));
        }

        let listing: FileListResponse = response
            .json()
            .await
            .map_err(|e| AppError::Download(format!("Invalid file listing: {e}")))?;
        Ok(listing.data)
    }

    async fn download_file(&self, path: &str) -> Result<Vec<u8>> {
        let response = self
            .request(Method::GET, "/files/download")
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| AppError::Download(format!("Failed to download {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Download(format!(
                "Download of {path} returned {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Download(format!("Failed to read {path}: {e}")))?;
        Ok(bytes.to_vec())
    }
}
