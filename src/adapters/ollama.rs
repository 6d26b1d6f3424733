//! Ollama client for the `/api/generate` endpoint.
//!
//! One blocking-style request per call: no streaming, no batching and no
//! retries. Callers decide what a failure means for them.

use crate::domain::ports::InferenceClient;
use crate::utils::error::{DebateError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// 生成參數，預設值沿用實驗一開始的設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub num_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_seconds: u64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            num_predict: 200,
            temperature: 0.7,
            top_p: 0.9,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: RequestOptions,
}

#[derive(Debug, Serialize)]
struct RequestOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    options: GenerationOptions,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_options(base_url, GenerationOptions::default())
    }

    pub fn with_options(base_url: &str, options: GenerationOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// 伺服器有回應 `/api/tags` 就視為可用
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Ollama health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn generate(&self, model: &str, prompt: &str, system: Option<&str>) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            options: RequestOptions {
                num_predict: self.options.num_predict,
                temperature: self.options.temperature,
                top_p: self.options.top_p,
            },
        };

        tracing::debug!("Sending prompt ({} chars) to {}", prompt.len(), model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DebateError::inference(model, format!("timed out after {}s", self.options.timeout_seconds))
                } else {
                    DebateError::inference(model, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DebateError::inference(
                model,
                format!("status {}: {}", status, body.trim()),
            ));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| DebateError::inference(model, format!("invalid response body: {}", e)))?;

        tracing::debug!("{} returned {} chars", model, body.response.len());
        Ok(body.response)
    }
}
