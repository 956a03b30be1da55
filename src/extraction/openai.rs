use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ExtractionConfig;
use crate::delivery::types::StructuredRecord;
use crate::error::{AppError, Result};
use crate::extraction::{prompt, Extractor};
use crate::workspace::InputFile;

/// Extractor backed by an OpenAI-compatible chat completions endpoint.
///
/// When an `api_version` is configured the endpoint is treated as an Azure
/// deployment: the version goes into the query string and the key into the
/// `api-key` header.
pub struct ChatExtractor {
    client: Client,
    url: String,
    api_key: String,
    azure: bool,
    model: String,
    max_tokens: u32,
}

impl ChatExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let base = config.endpoint.trim_end_matches('/');
        let url = match &config.api_version {
            Some(version) => format!("{base}/chat/completions?api-version={version}"),
            None => format!("{base}/chat/completions"),
        };

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build extraction HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
            azure: config.api_version.is_some(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let builder = self.client.post(&self.url).json(request);
        let builder = if self.azure {
            builder.header("api-key", &self.api_key)
        } else {
            builder.bearer_auth(&self.api_key)
        };

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::Extraction(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Extraction(format!("API returned {status}: {body}")));
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| AppError::Extraction(format!("Invalid completion response: {e}")))
    }
}

#[async_trait]
impl Extractor for ChatExtractor {
    async fn extract(&self, files: &[InputFile], data_schema: &Value) -> Result<StructuredRecord> {
        let request = CompletionRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Value::String(prompt::system_prompt_for_extraction(data_schema)),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Value::Array(prompt::content_parts(files)),
                },
            ],
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "extracted_data",
                    "schema": data_schema,
                },
            }),
        };

        let response = self.complete(&request).await?;

        if let Some(usage) = &response.usage {
            tracing::info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                files = files.len(),
                "Extraction completed"
            );
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Extraction("Response contained no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            return Err(AppError::Extraction(
                "Response was truncated at max_tokens".to_string(),
            ));
        }

        let content = choice
            .message
            .content
            .ok_or_else(|| AppError::Extraction("Response message had no content".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| AppError::Extraction(format!("Response was not valid JSON: {e}")))
    }
}

// --- Request types ---

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
    response_format: Value,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Value,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
