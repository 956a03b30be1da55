use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use crate::config::WorkspaceConfig;
use crate::error::{AppError, Result};
use crate::workspace::{input_files_prefix, FileSource};

/// Downloads execution input files into scoped temporary directories.
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

/// A temporary directory holding one execution's input files.
///
/// The directory is removed when this value is dropped.
pub struct InputWorkspace {
    dir: TempDir,
}

/// An input file loaded from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFile {
    /// Path relative to the workspace root, `/`-separated.
    pub name: String,
    pub media_type: &'static str,
    pub contents: Vec<u8>,
}

impl WorkspaceManager {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
        }
    }

    /// Download every input file of an execution into a fresh temporary directory.
    pub async fn download_input_files(
        &self,
        source: &dyn FileSource,
        workspace_id: Uuid,
        agent_execution_id: Uuid,
    ) -> Result<InputWorkspace> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| AppError::Download(format!("Failed to create workspace dir: {e}")))?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("courier-{agent_execution_id}-"))
            .tempdir_in(&self.base_dir)
            .map_err(|e| AppError::Download(format!("Failed to create temp dir: {e}")))?;
        let workspace = InputWorkspace { dir };

        let prefix = input_files_prefix(workspace_id, agent_execution_id);
        let remote_files: Vec<_> = source
            .list_files(&prefix)
            .await?
            .into_iter()
            // Folder placeholder keys carry no content.
            .filter(|file| !file.path.ends_with('/'))
            .collect();

        if remote_files.is_empty() {
            return Err(AppError::Download(format!("No input files found under {prefix}")));
        }

        tracing::info!(
            execution_id = %agent_execution_id,
            count = remote_files.len(),
            dir = %workspace.path().display(),
            "Downloading input files"
        );

        for file in &remote_files {
            let relative = file.path.strip_prefix(&prefix).unwrap_or(&file.path);
            let target = Self::verify_path(workspace.path(), relative)?;

            let contents = source.download_file(&file.path).await?;

            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::Download(format!("Failed to create directory: {e}"))
                })?;
            }
            tokio::fs::write(&target, &contents)
                .await
                .map_err(|e| AppError::Download(format!("Failed to write {relative}: {e}")))?;

            tracing::debug!(file = relative, bytes = contents.len(), "Downloaded input file");
        }

        Ok(workspace)
    }

    /// Resolve a remote relative path inside the workspace, rejecting traversal.
    fn verify_path(workspace_root: &Path, relative: &str) -> Result<PathBuf> {
        let requested = Path::new(relative);
        let mut resolved = workspace_root.to_path_buf();
        let mut depth = 0usize;

        for component in requested.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(AppError::Download(format!(
                        "Path traversal detected: {relative} is outside workspace"
                    )));
                }
            }
        }

        if depth == 0 {
            return Err(AppError::Download(format!("Invalid file path: {relative:?}")));
        }

        Ok(resolved)
    }
}

impl InputWorkspace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Load every file under the workspace, sorted by name.
    pub async fn load_files(&self) -> Result<Vec<InputFile>> {
        let root = self.dir.path();
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let name = path
                        .strip_prefix(root)
                        .map_err(|e| AppError::Internal(format!("Unexpected file path: {e}")))?
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    let contents = tokio::fs::read(&path).await?;
                    files.push(InputFile {
                        media_type: media_type_for(&name),
                        name,
                        contents,
                    });
                }
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Remove the directory now, surfacing any cleanup error.
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

fn media_type_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}
