//! A generic HTTP-backed [`LlmClient`]. The wire format of any particular
//! provider is explicitly out of scope; this posts the transcript to a
//! configured completion endpoint and expects a `{"text": "..."}` reply,
//! which is enough to run the engine against a local or proxied model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

use super::LlmClient;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLlmClient {
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate(&self, transcript: &str) -> Result<String, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&CompletionRequest { prompt: transcript })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Provider(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(LlmError::Provider(format!(
                "completion endpoint returned {}",
                response.status()
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Provider(format!("malformed completion response: {e}")))?;
        Ok(parsed.text)
    }
}
