//! Cross-encoder rerank client.
//!
//! Talks to a rerank HTTP endpoint that scores `(query, document)`
//! pairs directly and returns `{index, relevance_score}` results.
//! Scores are in an implementation-defined scale (sometimes negative)
//! and must not be compared to cosine similarities.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use semvault_core::{RerankError, Reranker};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "ms-marco-TinyBERT-L-2-v2";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    relevance_score: f32,
}

/// HTTP cross-encoder reranker.
pub struct HttpReranker {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpReranker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn unpack(&self, response: RerankResponse, expected: usize) -> Result<Vec<f32>, RerankError> {
        if response.results.len() != expected {
            return Err(RerankError::InvalidResponse(format!(
                "expected {expected} scores, got {}",
                response.results.len()
            )));
        }

        let mut scores = vec![0.0f32; expected];
        for item in response.results {
            let slot = scores
                .get_mut(item.index)
                .ok_or_else(|| RerankError::InvalidResponse(format!(
                    "result index {} out of range",
                    item.index
                )))?;
            *slot = item.relevance_score;
        }
        Ok(scores)
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
        };

        let mut backoff = INITIAL_BACKOFF;

        for attempt in 0..MAX_RETRIES {
            debug!(docs = documents.len(), attempt, "sending rerank request");

            let mut builder = self.client.post(&self.base_url).json(&request);
            if let Some(ref key) = self.api_key {
                builder = builder.bearer_auth(key);
            }

            match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    let parsed: RerankResponse = response
                        .json()
                        .await
                        .map_err(|e| RerankError::InvalidResponse(e.to_string()))?;
                    return self.unpack(parsed, documents.len());
                }
                Ok(response) => {
                    let status = response.status();
                    warn!(status = status.as_u16(), attempt, "rerank upstream error");
                    if !status.is_server_error() && status.as_u16() != 429 {
                        return Err(RerankError::Upstream(format!("status {status}")));
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt, "rerank transport error");
                }
            }

            if attempt + 1 < MAX_RETRIES {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(RerankError::Upstream("retries exhausted".to_string()))
    }
}
