//! Language-model oracle over a Messages-style HTTP API

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::errors::OracleError;
use super::traits::Oracle;
use super::types::{OracleOutput, Role};
use crate::common::errors::{DcaError, Result};
use crate::config::types::OracleConfig;

const API_VERSION: &str = "2023-06-01";

/// Oracle backed by a hosted language model
#[derive(Debug, Clone)]
pub struct LlmOracle {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
}

impl LlmOracle {
    /// Create a client from configuration
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DcaError::Configuration("oracle.api_key is not set".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| DcaError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    fn system_prompt(role: Role) -> std::result::Result<String, OracleError> {
        let schema = serde_json::to_string_pretty(&role.output_schema())?;
        Ok(format!(
            "{}\n\nYou must output strictly valid JSON conforming to the schema below.\n\
             Do NOT output any markdown blocks or conversational text. JUST the JSON object.\n\n\
             JSON Schema:\n{}\n",
            role.instructions(),
            schema
        ))
    }

    fn extract_text_content(response_body: &Value) -> std::result::Result<&str, OracleError> {
        let content = response_body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| OracleError::SchemaViolation("Missing or invalid 'content' field".into()))?;

        content
            .iter()
            .find(|item| item["type"] == "text")
            .and_then(|item| item["text"].as_str())
            .ok_or_else(|| OracleError::SchemaViolation("Missing 'text' content".into()))
    }

    async fn backoff(attempt: u32) {
        sleep(Duration::from_millis(150 * u64::from(attempt))).await;
    }
}

/// Slice from the first `{` to the last `}` of a model reply
pub fn extract_json_object(text: &str) -> &str {
    let start = text.find('{').unwrap_or(0);
    let end = text.rfind('}').map(|i| i + 1).unwrap_or(text.len());
    if start >= end {
        return text;
    }
    &text[start..end]
}

#[async_trait]
impl Oracle for LlmOracle {
    #[instrument(skip(self, context), fields(model = %self.model))]
    async fn invoke(&self, role: Role, context: &Value) -> std::result::Result<OracleOutput, OracleError> {
        let payload = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": Self::system_prompt(role)?,
            "messages": [
                {
                    "role": "user",
                    "content": serde_json::to_string(context)?
                }
            ]
        });

        let mut attempt = 0u32;
        loop {
            let send_result = self
                .client
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .json(&payload)
                .send()
                .await;

            let response = match send_result {
                Ok(response) => response,
                Err(e) => {
                    if attempt < self.max_retries {
                        attempt += 1;
                        warn!("{} call failed ({}), retry {}", role, e, attempt);
                        Self::backoff(attempt).await;
                        continue;
                    }
                    if e.is_timeout() {
                        return Err(OracleError::Timeout);
                    }
                    return Err(OracleError::Api(e.to_string()));
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 && attempt < self.max_retries {
                    attempt += 1;
                    warn!("{} call rate limited, retry {}", role, attempt);
                    Self::backoff(attempt).await;
                    continue;
                }
                return Err(OracleError::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            let response_body: Value = response
                .json()
                .await
                .map_err(|e| OracleError::Api(e.to_string()))?;
            let text = Self::extract_text_content(&response_body)?;
            debug!("{} replied with {} chars", role, text.len());

            return OracleOutput::parse(role, extract_json_object(text));
        }
    }
}
