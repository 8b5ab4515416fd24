//! Query orchestration pipeline.
//!
//! Glues admission, intent analysis, the safety gate, query enhancement, and
//! retrieval into one execution path. Admission consumed its token in the
//! middleware; the orchestrator only reads the identity for tracing, so a
//! request is never double-billed.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info};

use crate::identity::UserIdentity;
use crate::intent::{AnalysisResult, IntentEngine};
use crate::llm::FragmentStream;
use crate::retrieval::{
    QueryAnswer, QueryParams, RetrievalEngine, RetrievalError, RetrievalResult, StreamMeta,
};

/// A query request as the HTTP surface delivers it.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    /// The question.
    pub query: String,
    /// Retrieval mode name.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Result fanout.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Stream the answer as SSE.
    #[serde(default)]
    pub stream: bool,
    /// Knowledge-base override.
    #[serde(default)]
    pub knowledge_base: Option<String>,
    /// Answer language override.
    #[serde(default)]
    pub language: Option<String>,
    /// Latency/quality trade-off name.
    #[serde(default)]
    pub performance_mode: Option<String>,
    /// Run intent analysis before retrieval.
    #[serde(default)]
    pub enable_intent_analysis: bool,
    /// Replace the query with its enhanced form when one is produced.
    #[serde(default)]
    pub enable_query_enhancement: bool,
    /// Gate retrieval on the safety verdict.
    #[serde(default)]
    pub safety_check: bool,
}

fn default_mode() -> String {
    "hybrid".to_string()
}

fn default_top_k() -> usize {
    10
}

/// What one execution produced.
pub enum ExecOutcome {
    /// A complete answer.
    Answer {
        /// The answer.
        answer: QueryAnswer,
        /// Analysis result when analysis ran.
        analysis: Option<AnalysisResult>,
        /// Wall-clock seconds spent.
        response_time: f64,
    },
    /// The safety gate stopped the pipeline; retrieval never ran.
    Rejected {
        /// The analysis carrying tips and alternatives.
        analysis: AnalysisResult,
    },
    /// A streaming answer.
    Stream {
        /// Stream metadata (first SSE event).
        meta: StreamMeta,
        /// Analysis result when analysis ran.
        analysis: Option<AnalysisResult>,
        /// The fragment stream.
        stream: FragmentStream,
        /// Start instant, for the terminal event's response time.
        started: Instant,
    },
}

/// The orchestrator.
pub struct Orchestrator {
    intent: Arc<IntentEngine>,
    retrieval: Arc<RetrievalEngine>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish()
    }
}

impl Orchestrator {
    /// Creates the orchestrator.
    pub fn new(intent: Arc<IntentEngine>, retrieval: Arc<RetrievalEngine>) -> Self {
        Self { intent, retrieval }
    }

    /// The intent engine, for the intent HTTP surface.
    pub fn intent(&self) -> &Arc<IntentEngine> {
        &self.intent
    }

    /// The retrieval engine, for the graph/system HTTP surface.
    pub fn retrieval(&self) -> &Arc<RetrievalEngine> {
        &self.retrieval
    }

    /// Runs the full pipeline for one admitted request.
    pub async fn execute(
        &self,
        request: QueryRequest,
        identity: &UserIdentity,
    ) -> RetrievalResult<ExecOutcome> {
        let started = Instant::now();
        if request.query.trim().is_empty() {
            return Err(RetrievalError::BadInput("query must not be empty".into()));
        }

        debug!(
            user = %identity.user_id,
            mode = %request.mode,
            stream = request.stream,
            "executing query"
        );

        let analysis = if request.enable_intent_analysis || request.safety_check {
            Some(self.intent.analyze(&request.query, None).await)
        } else {
            None
        };

        if request.safety_check {
            if let Some(analysis) = &analysis {
                if analysis.should_reject {
                    info!(
                        user = %identity.user_id,
                        safety = analysis.safety_level.as_str(),
                        "query rejected by safety gate"
                    );
                    return Ok(ExecOutcome::Rejected {
                        analysis: analysis.clone(),
                    });
                }
            }
        }

        let query = match (&analysis, request.enable_query_enhancement) {
            (Some(analysis), true) => analysis
                .enhanced_query
                .clone()
                .unwrap_or_else(|| request.query.clone()),
            _ => request.query.clone(),
        };

        let params = QueryParams::validate(
            &request.mode,
            request.top_k,
            request.knowledge_base.clone(),
            request.language.clone(),
            request.performance_mode.as_deref(),
        )?;

        if request.stream {
            let (meta, stream) = self.retrieval.query_stream(&query, &params).await?;
            Ok(ExecOutcome::Stream {
                meta,
                analysis,
                stream,
                started,
            })
        } else {
            let answer = self.retrieval.query(&query, &params).await?;
            Ok(ExecOutcome::Answer {
                answer,
                analysis,
                response_time: started.elapsed().as_secs_f64(),
            })
        }
    }

    /// Analysis only — never touches the retrieval engine.
    pub async fn analyze(&self, query: &str) -> RetrievalResult<AnalysisResult> {
        if query.trim().is_empty() {
            return Err(RetrievalError::BadInput("query must not be empty".into()));
        }
        Ok(self.intent.analyze(query, None).await)
    }

    /// The `/query/safe` pipeline: analysis, gate, then retrieval.
    pub async fn execute_safe(
        &self,
        mut request: QueryRequest,
        identity: &UserIdentity,
    ) -> RetrievalResult<ExecOutcome> {
        request.enable_intent_analysis = true;
        request.safety_check = true;
        self.execute(request, identity).await
    }
}
