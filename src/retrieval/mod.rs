//! Multi-mode retrieval engine.
//!
//! Six pipelines over the same per-KB stores: plain vector search, graph
//! expansion, community traversal, merged hybrid, plan-interleaved mix, and
//! a debugging bypass. Retrieval resolves the knowledge base once per query
//! and runs to completion against it even if the current-KB pointer moves.

pub mod context;
pub mod error;


pub use context::{AssembledContext, ContextBudget, SourceRef};
pub use error::{RetrievalError, RetrievalResult};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CacheCoordinator, CacheKind};
use crate::constants::{TOP_K_MAX, TOP_K_MIN};
use crate::hashing::fingerprint;
use crate::kb::{KbManager, KnowledgeBase};
use crate::llm::{ChatModel, Embedder, FragmentStream, Reranker};
use context::{ScoredChunk, ScoredEntity, ScoredRelation};

/// The six query modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryMode {
    /// Plain top-k vector search.
    Naive,
    /// Vector hits expanded by 1-hop graph neighbors.
    Local,
    /// Community traversal over the graph, no vector index.
    Global,
    /// Local + global merged and re-ranked.
    Hybrid,
    /// Hybrid retrieval interleaved with generation planning.
    Mix,
    /// Returns the raw input; no stores, no LLM.
    Bypass,
}

impl QueryMode {
    /// All modes in presentation order.
    pub const ALL: [QueryMode; 6] = [
        QueryMode::Naive,
        QueryMode::Local,
        QueryMode::Global,
        QueryMode::Hybrid,
        QueryMode::Mix,
        QueryMode::Bypass,
    ];

    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Naive => "naive",
            QueryMode::Local => "local",
            QueryMode::Global => "global",
            QueryMode::Hybrid => "hybrid",
            QueryMode::Mix => "mix",
            QueryMode::Bypass => "bypass",
        }
    }

    /// Parses the string form. Unknown modes are the caller's error.
    pub fn parse(s: &str) -> Option<QueryMode> {
        match s {
            "naive" => Some(QueryMode::Naive),
            "local" => Some(QueryMode::Local),
            "global" => Some(QueryMode::Global),
            "hybrid" => Some(QueryMode::Hybrid),
            "mix" => Some(QueryMode::Mix),
            "bypass" => Some(QueryMode::Bypass),
            _ => None,
        }
    }

    /// Whether this mode touches the vector index.
    pub fn uses_vector(&self) -> bool {
        matches!(
            self,
            QueryMode::Naive | QueryMode::Local | QueryMode::Hybrid | QueryMode::Mix
        )
    }

    /// Whether this mode touches the graph.
    pub fn uses_graph(&self) -> bool {
        matches!(
            self,
            QueryMode::Local | QueryMode::Global | QueryMode::Hybrid | QueryMode::Mix
        )
    }
}

/// Latency/quality trade-off knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerformanceMode {
    /// Small fanout, no rerank, tight budget.
    Fast,
    /// The default trade-off.
    #[default]
    Balanced,
    /// Wide fanout, deep rerank, large budget.
    Quality,
}

impl PerformanceMode {
    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceMode::Fast => "fast",
            PerformanceMode::Balanced => "balanced",
            PerformanceMode::Quality => "quality",
        }
    }

    /// Parses the string form.
    pub fn parse(s: &str) -> Option<PerformanceMode> {
        match s {
            "fast" => Some(PerformanceMode::Fast),
            "balanced" => Some(PerformanceMode::Balanced),
            "quality" => Some(PerformanceMode::Quality),
            _ => None,
        }
    }

    fn tuning(&self) -> Tuning {
        match self {
            PerformanceMode::Fast => Tuning {
                chunk_fanout: 1,
                rerank_depth: 0,
                max_total_tokens: 2_000,
                max_entity_tokens: 200,
                max_relation_tokens: 200,
                max_answer_tokens: 512,
            },
            PerformanceMode::Balanced => Tuning {
                chunk_fanout: 2,
                rerank_depth: 20,
                max_total_tokens: 4_000,
                max_entity_tokens: 400,
                max_relation_tokens: 400,
                max_answer_tokens: 1_024,
            },
            PerformanceMode::Quality => Tuning {
                chunk_fanout: 3,
                rerank_depth: 50,
                max_total_tokens: 8_000,
                max_entity_tokens: 800,
                max_relation_tokens: 800,
                max_answer_tokens: 2_048,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Tuning {
    chunk_fanout: usize,
    rerank_depth: usize,
    max_total_tokens: usize,
    max_entity_tokens: usize,
    max_relation_tokens: usize,
    max_answer_tokens: usize,
}

/// Validated query parameters.
#[derive(Debug, Clone)]
pub struct QueryParams {
    /// Retrieval mode.
    pub mode: QueryMode,
    /// Result fanout, within [1, 100].
    pub top_k: usize,
    /// Knowledge-base override; `None` means the current KB.
    pub kb: Option<String>,
    /// Answer language hint.
    pub language: Option<String>,
    /// Latency/quality trade-off.
    pub performance_mode: PerformanceMode,
}

impl QueryParams {
    /// Validates raw string inputs into parameters.
    pub fn validate(
        mode: &str,
        top_k: usize,
        kb: Option<String>,
        language: Option<String>,
        performance_mode: Option<&str>,
    ) -> RetrievalResult<Self> {
        let mode = QueryMode::parse(mode)
            .ok_or_else(|| RetrievalError::BadInput(format!("unknown query mode '{mode}'")))?;
        if !(TOP_K_MIN..=TOP_K_MAX).contains(&top_k) {
            return Err(RetrievalError::BadInput(format!(
                "top_k must be within [{TOP_K_MIN}, {TOP_K_MAX}], got {top_k}"
            )));
        }
        let performance_mode = match performance_mode {
            Some(raw) => PerformanceMode::parse(raw).ok_or_else(|| {
                RetrievalError::BadInput(format!("unknown performance mode '{raw}'"))
            })?,
            None => PerformanceMode::default(),
        };
        Ok(Self {
            mode,
            top_k,
            kb,
            language,
            performance_mode,
        })
    }
}

/// A completed (non-streaming) answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    /// The answer text.
    pub answer: String,
    /// Mode that produced it.
    pub mode: String,
    /// Knowledge base consulted.
    pub kb: String,
    /// Language hint that was applied.
    pub language: String,
    /// Chunks that fed the prompt.
    pub sources: Vec<SourceRef>,
    /// Whether the answer came from the query cache.
    pub cached: bool,
}

/// Metadata describing a streaming answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMeta {
    /// Mode in effect.
    pub mode: String,
    /// Knowledge base consulted.
    pub kb: String,
    /// Language hint.
    pub language: String,
    /// Always `true` on this path.
    pub streaming: bool,
}

/// The retrieval engine.
pub struct RetrievalEngine {
    kb_manager: Arc<KbManager>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    reranker: Option<Arc<dyn Reranker>>,
    cache: Arc<CacheCoordinator>,
    rerank_enabled: bool,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("rerank_enabled", &self.rerank_enabled)
            .finish()
    }
}

const SYSTEM_PROMPT: &str = "You answer questions from the provided context. \
Ground every claim in the passages and relations given; say so plainly when \
the context does not contain the answer.";

const PLAN_PREAMBLE: &str = "First outline the sub-questions the context must \
answer, then answer them in order, then give the final synthesis.";

impl RetrievalEngine {
    /// Creates the engine.
    pub fn new(
        kb_manager: Arc<KbManager>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        reranker: Option<Arc<dyn Reranker>>,
        cache: Arc<CacheCoordinator>,
        rerank_enabled: bool,
    ) -> Self {
        Self {
            kb_manager,
            embedder,
            llm,
            reranker,
            cache,
            rerank_enabled,
        }
    }

    /// Static mode listing for the HTTP surface.
    pub fn modes() -> Vec<serde_json::Value> {
        QueryMode::ALL
            .iter()
            .map(|mode| {
                serde_json::json!({
                    "name": mode.as_str(),
                    "uses_vector": mode.uses_vector(),
                    "uses_graph": mode.uses_graph(),
                })
            })
            .collect()
    }

    /// Runs a non-streaming query.
    pub async fn query(&self, q: &str, params: &QueryParams) -> RetrievalResult<QueryAnswer> {
        if q.trim().is_empty() {
            return Err(RetrievalError::BadInput("query must not be empty".into()));
        }

        let kb = self.kb_manager.get(params.kb.as_deref())?;
        let kb_name = kb.name();
        let language = params.language.clone().unwrap_or_else(|| {
            kb.info().map(|i| i.language).unwrap_or_else(|_| "en".into())
        });

        if params.mode == QueryMode::Bypass {
            return Ok(QueryAnswer {
                answer: q.to_string(),
                mode: params.mode.as_str().to_string(),
                kb: kb_name,
                language,
                sources: Vec::new(),
                cached: false,
            });
        }

        // Whole-result cache first.
        let query_key = fingerprint(&[
            "query",
            q,
            params.mode.as_str(),
            &kb_name,
            &params.top_k.to_string(),
            params.performance_mode.as_str(),
            &language,
        ]);
        if let Some(cached) = self.cache.get(CacheKind::Queries, &query_key) {
            if let Ok(mut answer) = serde_json::from_value::<QueryAnswer>((*cached).clone()) {
                answer.cached = true;
                debug!(mode = params.mode.as_str(), "query served from cache");
                return Ok(answer);
            }
        }

        let prepared = self.prepare(q, &kb, params, &language).await?;
        let answer_text = self
            .complete_with_cache(&prepared.system, &prepared.prompt, prepared.max_answer_tokens)
            .await?;

        let answer = QueryAnswer {
            answer: answer_text,
            mode: params.mode.as_str().to_string(),
            kb: kb_name,
            language,
            sources: prepared.sources,
            cached: false,
        };

        if let Ok(value) = serde_json::to_value(&answer) {
            self.cache.set(CacheKind::Queries, &query_key, value, None);
        }
        Ok(answer)
    }

    /// Runs a streaming query: metadata now, fragments as they come.
    pub async fn query_stream(
        &self,
        q: &str,
        params: &QueryParams,
    ) -> RetrievalResult<(StreamMeta, FragmentStream)> {
        if q.trim().is_empty() {
            return Err(RetrievalError::BadInput("query must not be empty".into()));
        }

        let kb = self.kb_manager.get(params.kb.as_deref())?;
        let kb_name = kb.name();
        let language = params.language.clone().unwrap_or_else(|| {
            kb.info().map(|i| i.language).unwrap_or_else(|_| "en".into())
        });

        let meta = StreamMeta {
            mode: params.mode.as_str().to_string(),
            kb: kb_name,
            language: language.clone(),
            streaming: true,
        };

        if params.mode == QueryMode::Bypass {
            let raw = q.to_string();
            let stream: FragmentStream =
                Box::pin(futures_util::stream::once(async move { Ok(raw) }));
            return Ok((meta, stream));
        }

        let prepared = self.prepare(q, &kb, params, &language).await?;
        let stream = self
            .llm
            .complete_stream(&prepared.system, &prepared.prompt, prepared.max_answer_tokens)
            .await?;
        Ok((meta, stream))
    }

    // -- pipeline internals --

    async fn prepare(
        &self,
        q: &str,
        kb: &Arc<KnowledgeBase>,
        params: &QueryParams,
        language: &str,
    ) -> RetrievalResult<PreparedQuery> {
        let tuning = params.performance_mode.tuning();

        let chunks = if params.mode.uses_vector() {
            self.vector_chunks(q, kb, params, &tuning).await?
        } else {
            Vec::new()
        };

        let (entities, relations) = if params.mode.uses_graph() {
            self.graph_context(kb, params, &chunks)?
        } else {
            (Vec::new(), Vec::new())
        };

        let assembled = context::assemble(
            chunks,
            entities,
            relations,
            ContextBudget {
                max_total_tokens: tuning.max_total_tokens,
                max_entity_tokens: tuning.max_entity_tokens,
                max_relation_tokens: tuning.max_relation_tokens,
            },
        );

        let mut prompt = String::new();
        if params.mode == QueryMode::Mix {
            prompt.push_str(PLAN_PREAMBLE);
            prompt.push_str("\n\n");
        }
        if !assembled.body.is_empty() {
            prompt.push_str("# Context\n");
            prompt.push_str(&assembled.body);
            prompt.push('\n');
        }
        prompt.push_str(&format!("Answer in {language}.\n\n# Question\n{q}"));

        Ok(PreparedQuery {
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            sources: assembled.sources,
            max_answer_tokens: tuning.max_answer_tokens,
        })
    }

    /// Vector search with embedding cache, fanout, and optional rerank.
    async fn vector_chunks(
        &self,
        q: &str,
        kb: &Arc<KnowledgeBase>,
        params: &QueryParams,
        tuning: &Tuning,
    ) -> RetrievalResult<Vec<ScoredChunk>> {
        let embedding = self.embed_with_cache(q).await?;

        let fanout = params.top_k * tuning.chunk_fanout;
        let hits = kb.with_vector(|index| index.top_k(&embedding, fanout))??;

        let mut chunks = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(text) = self.chunk_text(kb, &hit.chunk.id)? else {
                continue;
            };
            chunks.push(ScoredChunk {
                id: hit.chunk.id,
                text,
                score: hit.score,
            });
        }

        if self.rerank_enabled && tuning.rerank_depth > 0 {
            if let Some(reranker) = &self.reranker {
                chunks = Self::rerank_chunks(reranker.as_ref(), q, chunks, tuning.rerank_depth)
                    .await?;
            }
        }

        chunks.truncate(params.top_k);
        Ok(chunks)
    }

    /// Re-scores the head of the candidate list; ties break by the original
    /// vector score.
    async fn rerank_chunks(
        reranker: &dyn Reranker,
        q: &str,
        mut chunks: Vec<ScoredChunk>,
        depth: usize,
    ) -> RetrievalResult<Vec<ScoredChunk>> {
        let head = chunks.len().min(depth);
        if head == 0 {
            return Ok(chunks);
        }

        let documents: Vec<String> = chunks[..head].iter().map(|c| c.text.clone()).collect();
        let scores = reranker.rerank(q, &documents).await?;

        let mut rescored: Vec<(ScoredChunk, f32)> = chunks
            .drain(..head)
            .zip(scores)
            .map(|(chunk, rerank_score)| (chunk, rerank_score))
            .collect();
        rescored.sort_by(|(a, a_rs), (b, b_rs)| {
            b_rs.partial_cmp(a_rs)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        let mut result: Vec<ScoredChunk> = rescored
            .into_iter()
            .map(|(mut chunk, rerank_score)| {
                chunk.score = rerank_score;
                chunk
            })
            .collect();
        result.extend(chunks);
        Ok(result)
    }

    /// Graph context per mode: entity neighborhoods for local, community
    /// heads for global, both for hybrid/mix.
    fn graph_context(
        &self,
        kb: &Arc<KnowledgeBase>,
        params: &QueryParams,
        chunks: &[ScoredChunk],
    ) -> RetrievalResult<(Vec<ScoredEntity>, Vec<ScoredRelation>)> {
        let mut seed_labels: Vec<String> = Vec::new();

        if matches!(params.mode, QueryMode::Local | QueryMode::Hybrid | QueryMode::Mix) {
            for chunk in chunks {
                for entity in crate::ingest::extract_entities(&chunk.text) {
                    if !seed_labels.contains(&entity) {
                        seed_labels.push(entity);
                    }
                }
            }
        }

        if matches!(params.mode, QueryMode::Global | QueryMode::Hybrid | QueryMode::Mix) {
            let heads = kb.with_graph(|graph| {
                graph
                    .labels_by_degree()
                    .into_iter()
                    .take(params.top_k)
                    .map(|(label, _)| label)
                    .collect::<Vec<_>>()
            })?;
            for label in heads {
                if !seed_labels.contains(&label) {
                    seed_labels.push(label);
                }
            }
        }

        let mut entities: Vec<ScoredEntity> = Vec::new();
        let mut relations: Vec<ScoredRelation> = Vec::new();
        let mut seen_nodes: HashSet<String> = HashSet::new();
        let mut seen_edges: HashSet<(String, String)> = HashSet::new();

        for label in seed_labels {
            let Some(subgraph) = kb.with_graph(|graph| graph.neighborhood(&label, 1))? else {
                continue;
            };
            for node in subgraph.nodes {
                if seen_nodes.insert(node.label.clone()) {
                    entities.push(ScoredEntity {
                        score: node.chunk_ids.len() as f32,
                        label: node.label,
                        kind: node.kind,
                    });
                }
            }
            for (source, target, edge) in subgraph.edges {
                let key = if source <= target {
                    (source.clone(), target.clone())
                } else {
                    (target.clone(), source.clone())
                };
                if seen_edges.insert(key) {
                    relations.push(ScoredRelation {
                        source,
                        target,
                        relation: edge.relation,
                        score: edge.weight,
                    });
                }
            }
        }

        Ok((entities, relations))
    }

    /// Chunk text via the documents cache.
    fn chunk_text(
        &self,
        kb: &Arc<KnowledgeBase>,
        chunk_id: &str,
    ) -> RetrievalResult<Option<String>> {
        let key = fingerprint(&["chunk", &kb.name(), chunk_id]);
        if let Some(cached) = self.cache.get(CacheKind::Documents, &key) {
            if let Some(text) = cached.as_str() {
                return Ok(Some(text.to_string()));
            }
        }

        let text = kb.with_chunks(|store| store.get(chunk_id).map(|c| c.text.clone()))?;
        if let Some(text) = &text {
            self.cache.set(
                CacheKind::Documents,
                &key,
                serde_json::Value::String(text.clone()),
                None,
            );
        }
        Ok(text)
    }

    /// Query embedding via the vector cache.
    async fn embed_with_cache(&self, q: &str) -> RetrievalResult<Vec<f32>> {
        let key = fingerprint(&["embed", q]);
        if let Some(cached) = self.cache.get(CacheKind::Vector, &key) {
            if let Ok(vector) = serde_json::from_value::<Vec<f32>>((*cached).clone()) {
                if vector.len() == self.embedder.dim() {
                    return Ok(vector);
                }
            }
        }

        let vector = self.embedder.embed(q).await?;
        if let Ok(value) = serde_json::to_value(&vector) {
            self.cache.set(CacheKind::Vector, &key, value, None);
        }
        Ok(vector)
    }

    /// LLM completion behind the llm_response cache.
    async fn complete_with_cache(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: usize,
    ) -> RetrievalResult<String> {
        let key = fingerprint(&["llm", system, prompt, &max_tokens.to_string()]);
        if let Some(cached) = self.cache.get(CacheKind::LlmResponse, &key) {
            if let Some(answer) = cached.as_str() {
                debug!("LLM response served from cache");
                return Ok(answer.to_string());
            }
        }

        let answer = self.llm.complete(system, prompt, max_tokens).await?;
        self.cache.set(
            CacheKind::LlmResponse,
            &key,
            serde_json::Value::String(answer.clone()),
            None,
        );
        Ok(answer)
    }

    /// Cached subgraph extraction for the knowledge-graph HTTP surface.
    pub fn subgraph(
        &self,
        kb_name: Option<&str>,
        label: &str,
        depth: usize,
    ) -> RetrievalResult<Option<crate::graph::Subgraph>> {
        let kb = self.kb_manager.get(kb_name)?;
        let depth = depth.clamp(1, 5);

        let key = fingerprint(&["subgraph", &kb.name(), label, &depth.to_string()]);
        if let Some(cached) = self.cache.get(CacheKind::KnowledgeGraph, &key) {
            if let Ok(subgraph) =
                serde_json::from_value::<Option<crate::graph::Subgraph>>((*cached).clone())
            {
                return Ok(subgraph);
            }
        }

        let subgraph = kb.with_graph(|graph| graph.neighborhood(label, depth))?;
        if let Ok(value) = serde_json::to_value(&subgraph) {
            self.cache.set(CacheKind::KnowledgeGraph, &key, value, None);
        }
        Ok(subgraph)
    }

    /// The KB manager, for collaborators that need KB handles.
    pub fn kb_manager(&self) -> &Arc<KbManager> {
        &self.kb_manager
    }

    /// Upstream-call budget hint used by the health surface.
    pub fn upstream_budget() -> Duration {
        Duration::from_secs(crate::constants::DEFAULT_UPSTREAM_TIMEOUT_SECS)
    }
}

#[derive(Debug)]
struct PreparedQuery {
    system: String,
    prompt: String,
    sources: Vec<SourceRef>,
    max_answer_tokens: usize,
}
