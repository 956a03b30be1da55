use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use crate::workspace::InputFile;

pub fn system_prompt_for_extraction(data_schema: &Value) -> String {
    let schema = serde_json::to_string_pretty(data_schema).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are a meticulous data extraction assistant.

You will be given one or more documents. Extract the data described by the JSON schema below and reply with a single JSON object that conforms to it.

## Schema
```json
{schema}
```

## Guidelines
- Only use information present in the documents. Never invent values.
- If a value cannot be found, use null when the schema allows it, otherwise leave the field out.
- Keep numbers as numbers and dates in ISO 8601 format.
- Reply with the JSON object only, without commentary."#
    )
}

/// Build the user message content parts for a set of input files.
///
/// Text files are inlined, images become data URLs and everything else is
/// attached as a base64 file part.
pub fn content_parts(files: &[InputFile]) -> Vec<Value> {
    let mut parts = vec![json!({
        "type": "text",
        "text": format!("Extract the data from the following {} document(s).", files.len()),
    })];

    for file in files {
        if is_text(file.media_type) {
            let text = String::from_utf8_lossy(&file.contents);
            parts.push(json!({
                "type": "text",
                "text": format!("### {}\n\n{text}", file.name),
            }));
        } else if file.media_type.starts_with("image/") {
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": data_url(file) },
            }));
        } else {
            parts.push(json!({
                "type": "file",
                "file": {
                    "filename": file.name,
                    "file_data": data_url(file),
                },
            }));
        }
    }

    parts
}

fn is_text(media_type: &str) -> bool {
    media_type.starts_with("text/") || media_type == "application/json" || media_type == "application/xml"
}

fn data_url(file: &InputFile) -> String {
    format!("data:{};base64,{}", file.media_type, STANDARD.encode(&file.contents))
}
