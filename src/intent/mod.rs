//! Intent classification and safety gating.
//!
//! Rule-based classification is always available and authoritative on any LLM
//! failure; the LLM path, when enabled, refines the rule result. The whole
//! configuration (vocabulary, custom intents, templates) lives in one
//! copy-on-write bundle so runtime updates land atomically on the next call.

pub mod dfa;
pub mod error;
pub mod templates;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::IntentError;
pub use types::{AnalysisResult, IntentKind, IntentStatus, SafetyCheckResult, SafetyLevel};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::ChatModel;
use dfa::{SensitiveScanner, SensitiveWord};

/// Confidence reported when the rule path answers.
pub const RULE_CONFIDENCE: f32 = 0.6;
/// Confidence reported when the LLM path answers.
pub const LLM_CONFIDENCE: f32 = 0.9;

/// An operator-registered custom intent type.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomIntent {
    /// Intent type name.
    pub name: String,
    /// Keywords whose presence selects this intent.
    pub keywords: Vec<String>,
}

/// The copy-on-write configuration bundle.
struct EngineState {
    scanner: SensitiveScanner,
    vocabulary: Vec<SensitiveWord>,
    custom_intents: Vec<CustomIntent>,
    template_overrides: HashMap<String, String>,
    enable_llm: bool,
    enable_enhancement: bool,
}

impl EngineState {
    fn rebuild(
        vocabulary: Vec<SensitiveWord>,
        custom_intents: Vec<CustomIntent>,
        template_overrides: HashMap<String, String>,
        enable_llm: bool,
        enable_enhancement: bool,
    ) -> Result<Self, IntentError> {
        Ok(Self {
            scanner: SensitiveScanner::build(vocabulary.clone())?,
            vocabulary,
            custom_intents,
            template_overrides,
            enable_llm,
            enable_enhancement,
        })
    }
}

#[derive(Deserialize)]
struct LlmVerdict {
    intent_type: String,
    safety_level: String,
}

/// The intent engine.
pub struct IntentEngine {
    state: ArcSwap<EngineState>,
    llm: Option<Arc<dyn ChatModel>>,
}

impl std::fmt::Debug for IntentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentEngine")
            .field("vocabulary", &self.state.load().vocabulary.len())
            .field("llm", &self.llm.is_some())
            .finish()
    }
}

impl IntentEngine {
    /// Builds the engine.
    ///
    /// When `vocabulary_path` is given the file is loaded; otherwise the
    /// built-in fallback list is compiled.
    pub fn new(
        vocabulary_path: Option<&Path>,
        llm: Option<Arc<dyn ChatModel>>,
        enable_llm: bool,
    ) -> Result<Self, IntentError> {
        let vocabulary = match vocabulary_path {
            Some(path) => {
                let entries = dfa::load_vocabulary(path)?;
                debug!(
                    entries = entries.len(),
                    path = %path.display(),
                    "sensitive vocabulary loaded"
                );
                entries
            }
            None => dfa::builtin_vocabulary(),
        };

        let state = EngineState::rebuild(
            vocabulary,
            Vec::new(),
            HashMap::new(),
            enable_llm && llm.is_some(),
            true,
        )?;

        Ok(Self {
            state: ArcSwap::from_pointee(state),
            llm,
        })
    }

    // -- analysis --

    /// Full analysis: classification, safety, enhancement.
    ///
    /// Never fails: LLM errors fall back to the rule result, which is always
    /// computed first.
    pub async fn analyze(&self, query: &str, context: Option<&str>) -> AnalysisResult {
        let state = self.state.load();
        let scan_input = match context {
            Some(context) => format!("{context}\n{query}"),
            None => query.to_string(),
        };

        let safety = self.classify_safety(&state, &scan_input);
        let mut intent = self.classify_intent(&state, query, &safety);
        let mut safety_level = safety.safety_level;
        let mut confidence = RULE_CONFIDENCE;

        if state.enable_llm && !safety_level.should_reject() {
            if let Some(llm) = &self.llm {
                match self.llm_classify(llm.as_ref(), query).await {
                    Some((llm_intent, llm_safety)) => {
                        // The rules keep veto power: the LLM may only tighten
                        // safety, never loosen a rejection.
                        intent = llm_intent;
                        safety_level = safety_level.max(llm_safety);
                        confidence = LLM_CONFIDENCE;
                    }
                    None => {
                        debug!("LLM classification unavailable, rule result stands");
                    }
                }
            }
        }

        let should_reject = safety_level.should_reject();
        if should_reject {
            intent = IntentKind::IllegalContent;
        }

        let enhanced_query = if state.enable_enhancement && !should_reject {
            self.enhance(&state, &intent, query)
        } else {
            None
        };

        let (safety_tips, safe_alternatives) = if should_reject {
            (
                templates::safety_tips_for(&safety.risk_factors),
                templates::safe_alternatives_for(&safety.risk_factors),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        AnalysisResult {
            suggestions: templates::suggestions_for(&intent),
            intent_type: intent,
            safety_level,
            should_reject,
            confidence,
            enhanced_query,
            risk_factors: safety.risk_factors,
            safety_tips,
            safe_alternatives,
        }
    }

    /// Standalone rule-based safety check.
    pub fn safety_check(&self, content: &str) -> SafetyCheckResult {
        let state = self.state.load();
        let safety = self.classify_safety(&state, content);
        let should_reject = safety.safety_level.should_reject();

        SafetyCheckResult {
            is_safe: !should_reject,
            safety_level: safety.safety_level,
            safety_tips: if should_reject {
                templates::safety_tips_for(&safety.risk_factors)
            } else {
                Vec::new()
            },
            safe_alternatives: if should_reject {
                templates::safe_alternatives_for(&safety.risk_factors)
            } else {
                Vec::new()
            },
            risk_factors: safety.risk_factors,
        }
    }

    /// Engine status snapshot.
    pub fn status(&self) -> IntentStatus {
        let state = self.state.load();
        IntentStatus {
            llm_enabled: state.enable_llm,
            enhancement_enabled: state.enable_enhancement,
            vocabulary_size: state.scanner.len(),
            custom_intents: state.custom_intents.iter().map(|c| c.name.clone()).collect(),
            rule_confidence: RULE_CONFIDENCE,
            llm_confidence: LLM_CONFIDENCE,
        }
    }

    // -- hot configuration --

    /// Registers a custom intent type. Takes effect on the next call.
    pub fn register_intent(&self, custom: CustomIntent) -> Result<(), IntentError> {
        if custom.name.trim().is_empty() {
            return Err(IntentError::InvalidConfig("intent name must not be empty".into()));
        }
        if custom.keywords.is_empty() {
            return Err(IntentError::InvalidConfig(format!(
                "intent '{}' needs at least one keyword",
                custom.name
            )));
        }
        self.swap_state(|state| {
            let mut custom_intents: Vec<CustomIntent> = state
                .custom_intents
                .iter()
                .filter(|c| c.name != custom.name)
                .cloned()
                .collect();
            custom_intents.push(custom.clone());
            EngineState::rebuild(
                state.vocabulary.clone(),
                custom_intents,
                state.template_overrides.clone(),
                state.enable_llm,
                state.enable_enhancement,
            )
        })
    }

    /// Adds sensitive vocabulary entries. Takes effect on the next call.
    pub fn register_safety_rules(&self, rules: Vec<SensitiveWord>) -> Result<(), IntentError> {
        if rules.iter().any(|r| r.word.trim().is_empty()) {
            return Err(IntentError::InvalidConfig("rule words must not be empty".into()));
        }
        self.swap_state(|state| {
            let mut vocabulary = state.vocabulary.clone();
            for rule in &rules {
                vocabulary.retain(|v| v.word != rule.word);
                vocabulary.push(rule.clone());
            }
            EngineState::rebuild(
                vocabulary,
                state.custom_intents.clone(),
                state.template_overrides.clone(),
                state.enable_llm,
                state.enable_enhancement,
            )
        })
    }

    /// Overrides the enhancement template for an intent type.
    pub fn set_template(&self, intent: &str, template: String) -> Result<(), IntentError> {
        if !template.contains("{query}") {
            return Err(IntentError::InvalidConfig(
                "template must contain a {query} slot".into(),
            ));
        }
        let intent = intent.to_string();
        self.swap_state(|state| {
            let mut overrides = state.template_overrides.clone();
            overrides.insert(intent.clone(), template.clone());
            EngineState::rebuild(
                state.vocabulary.clone(),
                state.custom_intents.clone(),
                overrides,
                state.enable_llm,
                state.enable_enhancement,
            )
        })
    }

    /// Toggles query enhancement.
    pub fn set_enhancement(&self, enabled: bool) -> Result<(), IntentError> {
        self.swap_state(|state| {
            EngineState::rebuild(
                state.vocabulary.clone(),
                state.custom_intents.clone(),
                state.template_overrides.clone(),
                state.enable_llm,
                enabled,
            )
        })
    }

    fn swap_state(
        &self,
        build: impl Fn(&EngineState) -> Result<EngineState, IntentError>,
    ) -> Result<(), IntentError> {
        let current = self.state.load();
        let next = build(&current)?;
        self.state.store(Arc::new(next));
        Ok(())
    }

    // -- classification internals --

    fn classify_safety(&self, state: &EngineState, content: &str) -> SafetyVerdict {
        let matches = state.scanner.scan(content);
        let (educational, instructive) = dfa::orientation(content);

        let mut risk_factors: Vec<String> = Vec::new();
        for m in &matches {
            if !risk_factors.contains(&m.category) {
                risk_factors.push(m.category.clone());
            }
        }

        let illegal_hit = matches.iter().any(|m| m.illegal);
        let any_hit = !matches.is_empty();

        // An illegal-category hit escalates to Illegal unless an educational
        // pattern cancels it; an instructive pattern cancels the cancellation.
        let safety_level = if illegal_hit {
            if educational && !instructive {
                SafetyLevel::Suspicious
            } else {
                SafetyLevel::Illegal
            }
        } else if any_hit {
            if educational && !instructive {
                SafetyLevel::Safe
            } else {
                SafetyLevel::Suspicious
            }
        } else {
            SafetyLevel::Safe
        };

        SafetyVerdict {
            safety_level,
            risk_factors,
        }
    }

    fn classify_intent(
        &self,
        state: &EngineState,
        query: &str,
        safety: &SafetyVerdict,
    ) -> IntentKind {
        if safety.safety_level == SafetyLevel::Illegal {
            return IntentKind::IllegalContent;
        }

        let normalized = dfa::normalize(query);

        for custom in &state.custom_intents {
            if custom
                .keywords
                .iter()
                .any(|k| normalized.contains(&k.to_lowercase()))
            {
                return IntentKind::Custom(custom.name.clone());
            }
        }

        if normalized.split_whitespace().count() < 2 && !normalized.ends_with('?') {
            return IntentKind::Other;
        }

        const PROCEDURAL: &[&str] = &["how to", "how do", "how can", "steps to", "guide to"];
        const ANALYTICAL: &[&str] = &["why", "compare", "analyze", "difference between", "versus", "pros and cons"];
        const CREATIVE: &[&str] = &["write a", "compose", "imagine", "story about", "poem"];
        const FACTUAL: &[&str] = &["what is", "what are", "who is", "when did", "when was", "where is", "how many", "how much"];

        if PROCEDURAL.iter().any(|p| normalized.contains(p)) {
            IntentKind::ProceduralQuestion
        } else if CREATIVE.iter().any(|p| normalized.starts_with(p) || normalized.contains(p)) {
            IntentKind::CreativeRequest
        } else if ANALYTICAL.iter().any(|p| normalized.contains(p)) {
            IntentKind::AnalyticalQuestion
        } else if FACTUAL.iter().any(|p| normalized.contains(p)) {
            IntentKind::FactualQuestion
        } else {
            IntentKind::KnowledgeQuery
        }
    }

    fn enhance(&self, state: &EngineState, intent: &IntentKind, query: &str) -> Option<String> {
        if let Some(template) = state.template_overrides.get(intent.as_str()) {
            return Some(templates::apply(template, query));
        }
        templates::enhancement_template(intent).map(|t| templates::apply(t, query))
    }

    async fn llm_classify(
        &self,
        llm: &dyn ChatModel,
        query: &str,
    ) -> Option<(IntentKind, SafetyLevel)> {
        let prompt = templates::apply(templates::ANALYSIS_USER_PROMPT, query);
        let reply = match llm
            .complete(templates::ANALYSIS_SYSTEM_PROMPT, &prompt, 128)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "intent LLM call failed, using rule result");
                return None;
            }
        };

        // The reply may wrap the JSON in prose; take the first object.
        let json = extract_json_object(&reply)?;
        let verdict: LlmVerdict = match serde_json::from_str(json) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "intent LLM reply unparseable, using rule result");
                return None;
            }
        };

        let safety = SafetyLevel::parse(&verdict.safety_level)?;
        Some((IntentKind::parse(&verdict.intent_type), safety))
    }
}

struct SafetyVerdict {
    safety_level: SafetyLevel,
    risk_factors: Vec<String>,
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
