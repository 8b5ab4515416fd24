//! Token-budgeted context assembly.
//!
//! Selected chunks and graph neighborhoods are serialized into one prompt
//! body. The total budget splits into entity, relation, and chunk shares;
//! when a share overflows, the lowest-scoring items drop first.

use serde::{Deserialize, Serialize};

/// Rough token estimate: four characters per token, never zero for
/// non-empty text.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() { 0 } else { text.len().div_ceil(4) }
}

/// A scored chunk heading into the prompt.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Chunk id.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Relevance score (vector or rerank).
    pub score: f32,
}

/// A scored entity line.
#[derive(Debug, Clone)]
pub struct ScoredEntity {
    /// Entity label.
    pub label: String,
    /// Entity kind.
    pub kind: String,
    /// Degree-based score.
    pub score: f32,
}

/// A scored relation line.
#[derive(Debug, Clone)]
pub struct ScoredRelation {
    /// Source label.
    pub source: String,
    /// Target label.
    pub target: String,
    /// Relation description.
    pub relation: String,
    /// Edge weight.
    pub score: f32,
}

/// Source reference returned with an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Chunk id.
    pub chunk_id: String,
    /// Relevance score.
    pub score: f32,
}

/// Budget split for one assembly.
#[derive(Debug, Clone, Copy)]
pub struct ContextBudget {
    /// Whole-prompt token budget.
    pub max_total_tokens: usize,
    /// Share reserved for entity lines.
    pub max_entity_tokens: usize,
    /// Share reserved for relation lines.
    pub max_relation_tokens: usize,
}

impl ContextBudget {
    /// Chunk share: whatever entities and relations leave over.
    pub fn chunk_tokens(&self) -> usize {
        self.max_total_tokens
            .saturating_sub(self.max_entity_tokens)
            .saturating_sub(self.max_relation_tokens)
    }
}

/// The assembled context plus the sources that made it in.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Prompt body.
    pub body: String,
    /// Chunks that survived the budget.
    pub sources: Vec<SourceRef>,
}

/// Assembles the prompt body under `budget`.
pub fn assemble(
    mut chunks: Vec<ScoredChunk>,
    mut entities: Vec<ScoredEntity>,
    mut relations: Vec<ScoredRelation>,
    budget: ContextBudget,
) -> AssembledContext {
    // Highest score first; the tail drops when the budget runs out.
    chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    entities.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    relations.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut body = String::new();
    let mut sources = Vec::new();

    if !entities.is_empty() {
        let mut used = 0usize;
        let mut section = String::from("## Entities\n");
        for entity in &entities {
            let line = format!("- {} ({})\n", entity.label, entity.kind);
            let cost = estimate_tokens(&line);
            if used + cost > budget.max_entity_tokens {
                break;
            }
            used += cost;
            section.push_str(&line);
        }
        if used > 0 {
            body.push_str(&section);
            body.push('\n');
        }
    }

    if !relations.is_empty() {
        let mut used = 0usize;
        let mut section = String::from("## Relations\n");
        for relation in &relations {
            let line = format!(
                "- {} — {} — {}\n",
                relation.source, relation.relation, relation.target
            );
            let cost = estimate_tokens(&line);
            if used + cost > budget.max_relation_tokens {
                break;
            }
            used += cost;
            section.push_str(&line);
        }
        if used > 0 {
            body.push_str(&section);
            body.push('\n');
        }
    }

    if !chunks.is_empty() {
        let chunk_budget = budget.chunk_tokens();
        let mut used = 0usize;
        let mut section = String::from("## Passages\n");
        for chunk in &chunks {
            let block = format!("[{}]\n{}\n\n", chunk.id, chunk.text);
            let cost = estimate_tokens(&block);
            if used + cost > chunk_budget {
                continue; // a shorter lower-ranked chunk may still fit
            }
            used += cost;
            section.push_str(&block);
            sources.push(SourceRef {
                chunk_id: chunk.id.clone(),
                score: chunk.score,
            });
        }
        if used > 0 {
            body.push_str(&section);
        }
    }

    AssembledContext { body, sources }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, score: f32, len: usize) -> ScoredChunk {
        ScoredChunk {
            id: id.to_string(),
            text: "x".repeat(len),
            score,
        }
    }

    #[test]
    fn test_lowest_scoring_chunks_drop_first() {
        let budget = ContextBudget {
            max_total_tokens: 100,
            max_entity_tokens: 0,
            max_relation_tokens: 0,
        };
        let assembled = assemble(
            vec![
                chunk("low", 0.1, 200),
                chunk("high", 0.9, 200),
                chunk("mid", 0.5, 200),
            ],
            Vec::new(),
            Vec::new(),
            budget,
        );

        let ids: Vec<&str> = assembled.sources.iter().map(|s| s.chunk_id.as_str()).collect();
        assert!(ids.contains(&"high"));
        assert!(!ids.contains(&"low"));
    }

    #[test]
    fn test_entity_and_relation_shares_respected() {
        let budget = ContextBudget {
            max_total_tokens: 1000,
            max_entity_tokens: 10,
            max_relation_tokens: 10,
        };
        let entities: Vec<ScoredEntity> = (0..50)
            .map(|i| ScoredEntity {
                label: format!("Entity Number {i}"),
                kind: "entity".into(),
                score: 1.0 - i as f32 * 0.01,
            })
            .collect();
        let relations: Vec<ScoredRelation> = (0..50)
            .map(|i| ScoredRelation {
                source: format!("A{i}"),
                target: format!("B{i}"),
                relation: "related to".into(),
                score: 1.0 - i as f32 * 0.01,
            })
            .collect();

        let assembled = assemble(Vec::new(), entities, relations, budget);
        assert!(estimate_tokens(&assembled.body) < 60);
        // The strongest entity made it in.
        assert!(assembled.body.contains("Entity Number 0"));
    }

    #[test]
    fn test_empty_inputs_empty_body() {
        let assembled = assemble(
            Vec::new(),
            Vec::new(),
            Vec::new(),
            ContextBudget {
                max_total_tokens: 100,
                max_entity_tokens: 10,
                max_relation_tokens: 10,
            },
        );
        assert!(assembled.body.is_empty());
        assert!(assembled.sources.is_empty());
    }
}
