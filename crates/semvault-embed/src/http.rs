//! Remote embedding client over an OpenAI-compatible HTTP API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use semvault_core::{EmbedError, Embedder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::credentials::CredentialProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSION: usize = 1536;
const DEFAULT_BATCH_SIZE: usize = 100;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Batched embedding client with bounded retries and credential
/// rotation on quota signals.
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpEmbedder {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            batch_size: DEFAULT_BATCH_SIZE,
            credentials,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// One HTTP round trip for a single batch, retried with
    /// exponential backoff. A quota response rotates the credential
    /// and retries; ring exhaustion ends the call.
    async fn send_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        // Upstream tokenizers behave better without raw newlines.
        let input: Vec<String> = texts.iter().map(|t| t.replace('\n', " ")).collect();
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input,
        };

        let mut api_key = self
            .credentials
            .current()
            .ok_or(EmbedError::QuotaExhausted)?;
        let mut backoff = INITIAL_BACKOFF;

        for attempt in 0..MAX_RETRIES {
            debug!(
                batch = texts.len(),
                attempt,
                url = %self.base_url,
                "sending embedding request"
            );

            let response = self
                .client
                .post(&self.base_url)
                .bearer_auth(&api_key)
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, attempt, "embedding transport error");
                    if attempt + 1 == MAX_RETRIES {
                        return Err(EmbedError::Upstream(e.to_string()));
                    }
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    continue;
                }
            };

            let status = response.status();

            if status.is_success() {
                let parsed: EmbeddingResponse = response
                    .json()
                    .await
                    .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
                return self.unpack(parsed, texts.len());
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                // Quota signal: rotate before burning a retry.
                match self.credentials.rotate() {
                    Some(next) => {
                        warn!("embedding quota hit, rotated credential");
                        api_key = next;
                        continue;
                    }
                    None => {
                        warn!("embedding quota hit, credential ring exhausted");
                        return Err(EmbedError::QuotaExhausted);
                    }
                }
            }

            if status.is_server_error() {
                warn!(status = status.as_u16(), attempt, "embedding server error");
                if attempt + 1 == MAX_RETRIES {
                    return Err(EmbedError::Upstream(format!("server error {status}")));
                }
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                continue;
            }

            // Remaining 4xx: the request itself is wrong, never retried.
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbedError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        Err(EmbedError::Upstream("retries exhausted".to_string()))
    }

    fn unpack(
        &self,
        response: EmbeddingResponse,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if response.data.len() != expected {
            return Err(EmbedError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                response.data.len()
            )));
        }

        // Sort by index so the output order matches the input order.
        let mut data: Vec<(usize, Vec<f32>)> = response
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        data.sort_by_key(|(index, _)| *index);

        Ok(data.into_iter().map(|(_, embedding)| embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all.extend(self.send_batch(batch).await?);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticKey;

    fn test_embedder() -> HttpEmbedder {
        HttpEmbedder::new(Arc::new(StaticKey::new("sk-test")))
    }

    #[test]
    fn test_defaults() {
        let embedder = test_embedder();
        assert_eq!(embedder.model_name(), "text-embedding-3-small");
        assert_eq!(embedder.dimension(), 1536);
        assert_eq!(embedder.batch_size(), 100);
    }

    #[test]
    fn test_builder_overrides() {
        let embedder = test_embedder()
            .with_base_url("http://localhost:8080/embeddings")
            .with_model("custom-model", 768)
            .with_batch_size(16);
        assert_eq!(embedder.base_url, "http://localhost:8080/embeddings");
        assert_eq!(embedder.model_name(), "custom-model");
        assert_eq!(embedder.dimension(), 768);
        assert_eq!(embedder.batch_size(), 16);
    }

    #[test]
    fn test_batch_size_floor() {
        let embedder = test_embedder().with_batch_size(0);
        assert_eq!(embedder.batch_size(), 1);
    }

    #[test]
    fn test_unpack_sorts_by_index() {
        let embedder = test_embedder();
        let response = EmbeddingResponse {
            data: vec![
                EmbeddingData {
                    embedding: vec![2.0],
                    index: 1,
                },
                EmbeddingData {
                    embedding: vec![1.0],
                    index: 0,
                },
            ],
        };
        let vectors = embedder.unpack(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_unpack_length_mismatch() {
        let embedder = test_embedder();
        let response = EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: vec![1.0],
                index: 0,
            }],
        };
        assert!(matches!(
            embedder.unpack(response, 2),
            Err(EmbedError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_no_request() {
        let embedder = test_embedder().with_base_url("http://127.0.0.1:1/unreachable");
        let vectors = embedder.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
