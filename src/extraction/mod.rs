pub mod openai;
pub mod prompt;

use async_trait::async_trait;
use serde_json::Value;

use crate::delivery::types::StructuredRecord;
use crate::error::Result;
use crate::workspace::InputFile;

/// Remote service turning input files into a record matching `data_schema`.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, files: &[InputFile], data_schema: &Value) -> Result<StructuredRecord>;
}
