use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;

use crate::delivery::signature::{sign_payload, SIGNATURE_HEADER};
use crate::error::{AppError, Result};

/// Response returned by a webhook endpoint, whatever its status code.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Generic JSON POST capability.
///
/// `Err` means the request never produced a response (connection failure,
/// timeout, invalid request). Any HTTP status is an `Ok`.
#[async_trait]
pub trait HttpPoster: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<HttpResponse>;
}

pub struct ReqwestPoster {
    client: Client,
    signing_secret: Option<String>,
}

impl ReqwestPoster {
    pub fn new(timeout: Duration, signing_secret: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build webhook HTTP client: {e}")))?;

        Ok(Self {
            client,
            signing_secret,
        })
    }

    fn build_headers(&self, headers: &BTreeMap<String, String>, payload: &[u8]) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AppError::Delivery(format!("Invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AppError::Delivery(format!("Invalid value for header {name}: {e}")))?;
            map.insert(name, value);
        }

        if let Some(secret) = &self.signing_secret {
            let signature = sign_payload(secret, payload)?;
            let value = HeaderValue::from_str(&signature)
                .map_err(|e| AppError::Internal(format!("Invalid signature header: {e}")))?;
            map.insert(HeaderName::from_static(SIGNATURE_HEADER), value);
        }

        Ok(map)
    }
}

fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Delivery("timeout".to_string())
    } else if e.is_connect() {
        AppError::Delivery(format!("connection failed: {e}"))
    } else {
        AppError::Delivery(e.to_string())
    }
}

#[async_trait]
impl HttpPoster for ReqwestPoster {
    async fn post_json(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<HttpResponse> {
        let payload = serde_json::to_vec(body)?;
        let header_map = self.build_headers(headers, &payload)?;

        let response = self
            .client
            .post(url)
            .headers(header_map)
            .body(payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status_code = response.status().as_u16();

        let mut snapshot: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).to_string();
            snapshot
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let body = response.text().await.map_err(transport_error)?;

        Ok(HttpResponse {
            status_code,
            headers: snapshot,
            body,
        })
    }
}
