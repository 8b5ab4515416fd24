//! Adapter seams for the external LLM, embedding, and rerank services.
//!
//! Only the call contracts matter here: the services are OpenAI-compatible
//! HTTP endpoints owned by someone else. Each adapter is a trait with a
//! `reqwest`-backed implementation and a deterministic mock for tests.

pub mod chat;
pub mod embedding;
pub mod error;
pub mod rerank;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use chat::{ChatModel, FragmentStream, HttpChatModel};
pub use embedding::{Embedder, HttpEmbedder};
pub use error::AdapterError;
pub use rerank::{HttpReranker, Reranker};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockChatModel, MockEmbedder, MockReranker};
