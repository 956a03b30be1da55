pub mod manager;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::hub::types::RemoteFile;

pub use manager::{InputFile, InputWorkspace, WorkspaceManager};

/// Remote storage holding an execution's input files.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// List every file stored under `prefix`.
    async fn list_files(&self, prefix: &str) -> Result<Vec<RemoteFile>>;

    /// Fetch the raw contents of one file.
    async fn download_file(&self, path: &str) -> Result<Vec<u8>>;
}

/// Storage key prefix under which an execution's input files live.
pub fn input_files_prefix(workspace_id: Uuid, agent_execution_id: Uuid) -> String {
    format!("workspaces/{workspace_id}/agent-executions/{agent_execution_id}/input-files/")
}
