//! Reranker adapter (`/rerank`, bge/jina-style wire shape).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::error::AdapterError;

/// The rerank call contract: relevance scores aligned with the input order.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Scores `documents` against `query`. Output length equals input length.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, AdapterError>;
}

/// HTTP implementation.
#[derive(Debug, Clone)]
pub struct HttpReranker {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl HttpReranker {
    const SERVICE: &'static str = "rerank";

    /// Creates the adapter.
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
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
            timeout,
        }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, AdapterError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut req = self.client.post(format!("{}/rerank", self.api_base)).json(&json!({
            "model": self.model,
            "query": query,
            "documents": documents,
        }));
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

        let parsed: RerankResponse =
            response.json().await.map_err(|e| AdapterError::Unparseable {
                service: Self::SERVICE,
                detail: e.to_string(),
            })?;

        let mut scores = vec![0.0f32; documents.len()];
        for result in parsed.results {
            if result.index >= scores.len() {
                return Err(AdapterError::Unparseable {
                    service: Self::SERVICE,
                    detail: format!("result index {} out of range", result.index),
                });
            }
            scores[result.index] = result.relevance_score;
        }
        Ok(scores)
    }
}
