//! Intent and safety classification types.
//!
//! The engine works on tagged variants internally; each has a bidirectional
//! string mapping for the HTTP surface.

use serde::{Deserialize, Serialize};

/// Classified purpose of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentKind {
    /// General knowledge lookup.
    KnowledgeQuery,
    /// A concrete factual question.
    FactualQuestion,
    /// A question requiring analysis or comparison.
    AnalyticalQuestion,
    /// A how-to / procedural question.
    ProceduralQuestion,
    /// A request to produce creative content.
    CreativeRequest,
    /// Content flagged as illegal.
    IllegalContent,
    /// Anything else.
    Other,
    /// An operator-registered intent type.
    Custom(String),
}

impl IntentKind {
    /// Stable string form for HTTP I/O.
    pub fn as_str(&self) -> &str {
        match self {
            IntentKind::KnowledgeQuery => "knowledge_query",
            IntentKind::FactualQuestion => "factual_question",
            IntentKind::AnalyticalQuestion => "analytical_question",
            IntentKind::ProceduralQuestion => "procedural_question",
            IntentKind::CreativeRequest => "creative_request",
            IntentKind::IllegalContent => "illegal_content",
            IntentKind::Other => "other",
            IntentKind::Custom(name) => name,
        }
    }

    /// Parses the string form, treating unknown names as custom intents.
    pub fn parse(s: &str) -> IntentKind {
        match s {
            "knowledge_query" => IntentKind::KnowledgeQuery,
            "factual_question" => IntentKind::FactualQuestion,
            "analytical_question" => IntentKind::AnalyticalQuestion,
            "procedural_question" => IntentKind::ProceduralQuestion,
            "creative_request" => IntentKind::CreativeRequest,
            "illegal_content" => IntentKind::IllegalContent,
            "other" => IntentKind::Other,
            custom => IntentKind::Custom(custom.to_string()),
        }
    }
}

impl Serialize for IntentKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IntentKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(IntentKind::parse(&s))
    }
}

/// Classified risk of a query's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SafetyLevel {
    /// No risk signals.
    Safe,
    /// Risk signals present but plausibly benign.
    Suspicious,
    /// Clearly harmful framing.
    Unsafe,
    /// Illegal-category content.
    Illegal,
}

impl SafetyLevel {
    /// Stable string form for HTTP I/O.
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::Suspicious => "suspicious",
            SafetyLevel::Unsafe => "unsafe",
            SafetyLevel::Illegal => "illegal",
        }
    }

    /// Parses the string form.
    pub fn parse(s: &str) -> Option<SafetyLevel> {
        match s {
            "safe" => Some(SafetyLevel::Safe),
            "suspicious" => Some(SafetyLevel::Suspicious),
            "unsafe" => Some(SafetyLevel::Unsafe),
            "illegal" => Some(SafetyLevel::Illegal),
            _ => None,
        }
    }

    /// Whether the orchestrator must reject the query outright.
    pub fn should_reject(&self) -> bool {
        matches!(self, SafetyLevel::Unsafe | SafetyLevel::Illegal)
    }
}

impl Serialize for SafetyLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SafetyLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SafetyLevel::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown safety level '{s}'")))
    }
}

/// Outcome of a full intent analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    /// Classified intent.
    pub intent_type: IntentKind,
    /// Classified safety level.
    pub safety_level: SafetyLevel,
    /// Whether the orchestrator should reject.
    pub should_reject: bool,
    /// Classifier confidence; the rule path reports a lower fixed value than
    /// the LLM path, which is how callers see which path answered.
    pub confidence: f32,
    /// Enhanced form of the query, when enhancement ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced_query: Option<String>,
    /// Follow-up suggestions for the caller.
    pub suggestions: Vec<String>,
    /// Matched risk factors (sensitive categories).
    pub risk_factors: Vec<String>,
    /// Safety guidance, populated on rejection.
    pub safety_tips: Vec<String>,
    /// Safe reformulations, populated on rejection.
    pub safe_alternatives: Vec<String>,
}

/// Outcome of a standalone safety check.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyCheckResult {
    /// `true` when the content carries no rejection-level risk.
    pub is_safe: bool,
    /// Classified safety level.
    pub safety_level: SafetyLevel,
    /// Matched risk factors.
    pub risk_factors: Vec<String>,
    /// Safety guidance, populated on rejection.
    pub safety_tips: Vec<String>,
    /// Safe reformulations, populated on rejection.
    pub safe_alternatives: Vec<String>,
}

/// Engine status for the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct IntentStatus {
    /// Whether the LLM path is enabled.
    pub llm_enabled: bool,
    /// Whether query enhancement is enabled.
    pub enhancement_enabled: bool,
    /// Number of sensitive vocabulary entries loaded.
    pub vocabulary_size: usize,
    /// Registered custom intent type names.
    pub custom_intents: Vec<String>,
    /// Confidence reported by the rule path.
    pub rule_confidence: f32,
    /// Confidence reported by the LLM path.
    pub llm_confidence: f32,
}
