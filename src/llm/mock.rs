//! Deterministic mock adapters for tests and offline runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use parking_lot::RwLock;

use super::chat::{ChatModel, FragmentStream};
use super::embedding::Embedder;
use super::error::AdapterError;
use super::rerank::Reranker;
use crate::hashing::hash_to_u64;

/// Tokens too common to carry meaning in the bag-of-words mock embedding.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "is", "of", "or", "the", "to", "what", "which", "who", "how", "was",
    "were", "in", "on", "for", "do", "does",
];

/// Deterministic embedder: a normalized bag-of-words vector.
///
/// Each non-stopword token hashes to a handful of vector slots, so texts that
/// share content words land close in cosine space — close enough for
/// similarity assertions to be stable across runs and machines.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dim: usize,
    calls: Arc<AtomicUsize>,
    fail: Arc<RwLock<bool>>,
}

impl MockEmbedder {
    /// Creates a mock embedder with the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            calls: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(RwLock::new(false)),
        }
    }

    /// Number of embed calls served.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes subsequent calls fail with an upstream error.
    pub fn set_failing(&self, failing: bool) {
        *self.fail.write() = failing;
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];

        let normalized = text.to_lowercase();
        let tokens = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .filter(|t| !STOPWORDS.contains(t));

        let mut any = false;
        for token in tokens {
            any = true;
            let seed = hash_to_u64(token.as_bytes());
            // Three slots per token, weights derived from the hash.
            for i in 0..3u64 {
                let slot = (seed.rotate_left((i * 17) as u32) as usize) % self.dim;
                let weight = 0.5 + ((seed >> (i * 8)) & 0xff) as f32 / 255.0;
                vector[slot] += weight;
            }
        }

        if !any {
            // Whitespace/stopword-only input still embeds to something stable.
            let slot = (hash_to_u64(normalized.as_bytes()) as usize) % self.dim;
            vector[slot] = 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn check_failure(&self) -> Result<(), AdapterError> {
        if *self.fail.read() {
            return Err(AdapterError::Upstream {
                service: "embedding",
                status: 500,
                body: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
        self.check_failure()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AdapterError> {
        self.check_failure()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Mock LLM: echoes a canned or prompt-derived answer, with a call counter.
#[derive(Debug, Clone)]
pub struct MockChatModel {
    response: Arc<RwLock<Option<String>>>,
    calls: Arc<AtomicUsize>,
    fail: Arc<RwLock<bool>>,
}

impl MockChatModel {
    /// Creates a mock that derives answers from the prompt.
    pub fn new() -> Self {
        Self {
            response: Arc::new(RwLock::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(RwLock::new(false)),
        }
    }

    /// Creates a mock that always answers `response`.
    pub fn with_response(response: impl Into<String>) -> Self {
        let mock = Self::new();
        *mock.response.write() = Some(response.into());
        mock
    }

    /// Number of completion calls served (streaming included).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes subsequent calls fail with an upstream error.
    pub fn set_failing(&self, failing: bool) {
        *self.fail.write() = failing;
    }

    fn answer(&self, prompt: &str) -> Result<String, AdapterError> {
        if *self.fail.read() {
            return Err(AdapterError::Upstream {
                service: "llm",
                status: 500,
                body: "mock failure".to_string(),
            });
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.response.read().clone() {
            Some(canned) => canned,
            // Echo the retrieved context so tests can assert that the prompt
            // actually carried it.
            None => format!("Based on the provided context: {}", last_line(prompt)),
        })
    }
}

impl Default for MockChatModel {
    fn default() -> Self {
        Self::new()
    }
}

fn last_line(prompt: &str) -> &str {
    prompt.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("")
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(
        &self,
        _system: &str,
        prompt: &str,
        _max_tokens: usize,
    ) -> Result<String, AdapterError> {
        self.answer(prompt)
    }

    async fn complete_stream(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<FragmentStream, AdapterError> {
        let answer = self.complete(system, prompt, max_tokens).await?;
        let fragments: Vec<Result<String, AdapterError>> = answer
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}

/// Mock reranker: token-overlap scores, so the ordering is explainable.
#[derive(Debug, Clone, Default)]
pub struct MockReranker {
    calls: Arc<AtomicUsize>,
}

impl MockReranker {
    /// Creates the mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rerank calls served.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reranker for MockReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Tiny artificial latency keeps timing-sensitive tests honest.
        tokio::time::sleep(Duration::from_millis(1)).await;

        let query_lower = query.to_lowercase();
        let query_tokens: Vec<&str> = query_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(documents
            .iter()
            .map(|doc| {
                let doc = doc.to_lowercase();
                let matched = query_tokens.iter().filter(|t| doc.contains(**t)).count();
                if query_tokens.is_empty() {
                    0.0
                } else {
                    matched as f32 / query_tokens.len() as f32
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(64);
        let a = embedder.embed("What is AI?").await.unwrap();
        let b = embedder.embed("What is AI?").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_mock_embedder_similarity_tracks_content_words() {
        let embedder = MockEmbedder::new(64);
        let full = embedder.embed("What is AI?").await.unwrap();
        let short = embedder.embed("AI?").await.unwrap();
        let unrelated = embedder.embed("recipe for sourdough bread").await.unwrap();

        assert!(cosine(&full, &short) > 0.9, "stopwords must not matter");
        assert!(cosine(&full, &unrelated) < 0.3);
    }

    #[tokio::test]
    async fn test_mock_chat_counts_calls() {
        let llm = MockChatModel::with_response("canned");
        assert_eq!(llm.call_count(), 0);
        llm.complete("sys", "prompt", 100).await.unwrap();
        llm.complete("sys", "prompt", 100).await.unwrap();
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_reranker_prefers_overlap() {
        let reranker = MockReranker::new();
        let scores = reranker
            .rerank(
                "rust memory safety",
                &[
                    "rust guarantees memory safety".to_string(),
                    "cooking with cast iron".to_string(),
                ],
            )
            .await
            .unwrap();
        assert!(scores[0] > scores[1]);
    }
}
