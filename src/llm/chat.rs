//! LLM chat adapter (OpenAI-compatible `/chat/completions`).

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::error::AdapterError;

/// A lazy sequence of answer fragments ending when the stream completes.
pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<String, AdapterError>> + Send + 'static>>;

/// The LLM call contract.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produces a complete answer.
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<String, AdapterError>;

    /// Produces the answer as a fragment stream.
    async fn complete_stream(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<FragmentStream, AdapterError>;
}

/// HTTP implementation against an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct HttpChatModel {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl HttpChatModel {
    const SERVICE: &'static str = "llm";

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

    fn request(&self, body: serde_json::Value) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    fn body(&self, system: &str, prompt: &str, max_tokens: usize, stream: bool) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": max_tokens,
            "stream": stream,
        })
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, AdapterError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AdapterError::Upstream {
            service: Self::SERVICE,
            status: status.as_u16(),
            body: truncate(&body, 512),
        })
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<String, AdapterError> {
        let response = self
            .request(self.body(system, prompt, max_tokens, false))
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(Self::SERVICE, self.timeout, e))?;
        let response = Self::check_status(response).await?;

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            AdapterError::Unparseable {
                service: Self::SERVICE,
                detail: e.to_string(),
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AdapterError::Unparseable {
                service: Self::SERVICE,
                detail: "response carried no choices".to_string(),
            })
    }

    async fn complete_stream(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<FragmentStream, AdapterError> {
        let response = self
            .request(self.body(system, prompt, max_tokens, true))
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(Self::SERVICE, self.timeout, e))?;
        let response = Self::check_status(response).await?;

        debug!("LLM stream established");

        let timeout = self.timeout;
        let byte_stream = response.bytes_stream().boxed();

        // Incremental SSE parse: buffer bytes, cut on blank lines, pull the
        // delta content out of each `data:` payload. Dropping the stream
        // closes the outbound body, which is the cancellation path.
        let fragments = futures_util::stream::unfold(
            (byte_stream, String::new(), false),
            move |(mut bytes, mut buffer, done)| async move {
                if done {
                    return None;
                }
                loop {
                    if let Some(boundary) = buffer.find("\n\n") {
                        let event = buffer[..boundary].to_string();
                        buffer.drain(..boundary + 2);

                        let Some(data) = event
                            .lines()
                            .find_map(|l| l.strip_prefix("data:"))
                            .map(str::trim)
                        else {
                            continue;
                        };

                        if data == "[DONE]" {
                            return None;
                        }

                        match serde_json::from_str::<StreamChunk>(data) {
                            Ok(chunk) => {
                                let text: String = chunk
                                    .choices
                                    .into_iter()
                                    .filter_map(|c| c.delta.content)
                                    .collect();
                                if text.is_empty() {
                                    continue;
                                }
                                return Some((Ok(text), (bytes, buffer, false)));
                            }
                            Err(e) => {
                                return Some((
                                    Err(AdapterError::Unparseable {
                                        service: Self::SERVICE,
                                        detail: e.to_string(),
                                    }),
                                    (bytes, buffer, true),
                                ));
                            }
                        }
                    }

                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buffer.push_str(&String::from_utf8_lossy(&chunk));
                        }
                        Some(Err(e)) => {
                            return Some((
                                Err(AdapterError::from_reqwest(Self::SERVICE, timeout, e)),
                                (bytes, buffer, true),
                            ));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(Box::pin(fragments))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
