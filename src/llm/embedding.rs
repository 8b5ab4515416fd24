//! Embedding adapter (OpenAI-compatible `/embeddings`) with memoization.

use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use serde::Deserialize;
use serde_json::json;

use super::error::AdapterError;
use crate::constants::validate_embedding_dim;
use crate::hashing::fingerprint;

/// The embedding call contract.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError>;

    /// Embeds a batch, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AdapterError>;

    /// The dimension this adapter produces.
    fn dim(&self) -> usize;
}

/// Size of the in-adapter memoization cache.
const MEMO_CAPACITY: u64 = 50_000;

/// HTTP implementation with a memoization layer.
///
/// Repeated embeds of identical text (QA matching, repeated queries) skip the
/// network round trip entirely.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    dim: usize,
    timeout: Duration,
    memo: Cache<String, Vec<f32>>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    const SERVICE: &'static str = "embedding";

    /// Creates the adapter.
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dim: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            dim,
            timeout,
            memo: Cache::builder().max_capacity(MEMO_CAPACITY).build(),
        }
    }

    async fn call(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AdapterError> {
        let mut req = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .json(&json!({ "model": self.model, "input": inputs }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(Self::SERVICE, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Upstream {
                service: Self::SERVICE,
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let parsed: EmbeddingResponse =
            response.json().await.map_err(|e| AdapterError::Unparseable {
                service: Self::SERVICE,
                detail: e.to_string(),
            })?;

        if parsed.data.len() != inputs.len() {
            return Err(AdapterError::Unparseable {
                service: Self::SERVICE,
                detail: format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    parsed.data.len()
                ),
            });
        }

        let mut rows = parsed.data;
        rows.sort_by_key(|d| d.index);

        for row in &rows {
            validate_embedding_dim(self.dim, &row.embedding)?;
        }

        Ok(rows.into_iter().map(|d| d.embedding).collect())
    }

    fn memo_key(&self, text: &str) -> String {
        fingerprint(&[&self.model, text])
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
        let key = self.memo_key(text);
        if let Some(cached) = self.memo.get(&key) {
            return Ok(cached);
        }

        let mut vectors = self.call(std::slice::from_ref(&text.to_string())).await?;
        let vector = vectors.pop().ok_or_else(|| AdapterError::Unparseable {
            service: Self::SERVICE,
            detail: "empty embedding batch".to_string(),
        })?;

        self.memo.insert(key, vector.clone());
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AdapterError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Serve memoized rows, fetch only the rest.
        let mut result: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing: Vec<(usize, String)> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            match self.memo.get(&self.memo_key(text)) {
                Some(cached) => result.push(Some(cached)),
                None => {
                    result.push(None);
                    missing.push((i, text.clone()));
                }
            }
        }

        if !missing.is_empty() {
            let inputs: Vec<String> = missing.iter().map(|(_, t)| t.clone()).collect();
            let fetched = self.call(&inputs).await?;
            for ((i, text), vector) in missing.into_iter().zip(fetched) {
                self.memo.insert(self.memo_key(&text), vector.clone());
                result[i] = Some(vector);
            }
        }

        Ok(result
            .into_iter()
            .map(|v| v.expect("every slot filled above"))
            .collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
