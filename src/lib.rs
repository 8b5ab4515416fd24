//! # Ragserve
//!
//! Retrieval-augmented question answering with per-tenant knowledge bases.
//!
//! Ragserve sits behind an authenticating gateway and serves many end users
//! from one process:
//!
//! ```text
//! Request → identity + rate gate → intent/safety → retrieval (vector + graph) → LLM → SSE
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ragserve::config::Config;
//!
//! # fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Listening on {}", config.socket_addr());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `mock` | Deterministic adapter mocks for tests/examples |
//!
//! ## Modules
//!
//! - [`cache`] - Five-way cache coordinator
//! - [`config`] - Environment-backed configuration
//! - [`gateway`] - Axum HTTP surface
//! - [`identity`] - Identity derivation + rate gate
//! - [`ingest`] - Document pipeline
//! - [`intent`] - Intent classification + safety gate
//! - [`kb`] - Multi-tenant knowledge bases
//! - [`llm`] - LLM/embedding/rerank adapters
//! - [`orchestrator`] - The query pipeline
//! - [`qa`] - Category-partitioned fixed-QA store
//! - [`retrieval`] - Six-mode retrieval engine
//! - [`sync`] - Keyed locks and double-checked init
//! - [`telemetry`] - Metrics, health, log tailing

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod app;
pub mod cache;
pub mod config;
pub mod constants;
pub mod gateway;
pub mod graph;
pub mod hashing;
pub mod identity;
pub mod ingest;
pub mod intent;
pub mod kb;
pub mod llm;
pub mod orchestrator;
pub mod qa;
pub mod retrieval;
pub mod sync;
pub mod telemetry;
pub mod vector;

pub use app::{Adapters, build_state};
pub use cache::{CacheCoordinator, CacheKind, CacheStats};
pub use config::{Config, ConfigError};
pub use constants::{DimConfig, DimValidationError, validate_embedding_dim};
pub use gateway::{ApiError, ApiResponse, AppState, create_router};
pub use hashing::{fingerprint, hash_api_key, hash_to_u64};
pub use identity::{Decision, IdentityResolver, RateGate, UserIdentity};
pub use ingest::{DocStatus, IngestPipeline};
pub use intent::{IntentEngine, IntentKind, SafetyLevel};
pub use kb::{KbConfig, KbInfo, KbManager};
pub use llm::{AdapterError, ChatModel, Embedder, Reranker};
#[cfg(any(test, feature = "mock"))]
pub use llm::{MockChatModel, MockEmbedder, MockReranker};
pub use orchestrator::{ExecOutcome, Orchestrator, QueryRequest};
pub use qa::{QaPair, QaStore};
pub use retrieval::{PerformanceMode, QueryMode, RetrievalEngine};
pub use sync::{InitLock, KeyedLocks, LockError};
pub use telemetry::Metrics;
