//! Prompt and enhancement templates.
//!
//! Templates live in code, not configuration; operators override them at
//! runtime through the hot-config surface when needed. `{query}` is the only
//! substitution slot.

use super::types::IntentKind;

/// System prompt for the LLM classification path.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "You classify user queries for a retrieval service. \
Respond with a single JSON object: {\"intent_type\": \"...\", \"safety_level\": \"...\"}. \
intent_type is one of knowledge_query, factual_question, analytical_question, \
procedural_question, creative_request, illegal_content, other. \
safety_level is one of safe, suspicious, unsafe, illegal. \
Queries seeking to prevent, recognize, or report harm are educational, not illegal.";

/// User prompt template for the LLM classification path.
pub const ANALYSIS_USER_PROMPT: &str = "Classify this query:\n{query}";

/// Default enhancement template for an intent kind, if any.
pub fn enhancement_template(intent: &IntentKind) -> Option<&'static str> {
    match intent {
        IntentKind::KnowledgeQuery => Some(
            "Provide a comprehensive, well-sourced answer to: {query}",
        ),
        IntentKind::FactualQuestion => Some(
            "Answer precisely, citing the retrieved context where possible: {query}",
        ),
        IntentKind::AnalyticalQuestion => Some(
            "Analyze step by step, comparing relevant factors from the context: {query}",
        ),
        IntentKind::ProceduralQuestion => Some(
            "Explain the procedure as clear, ordered steps: {query}",
        ),
        IntentKind::CreativeRequest => Some(
            "Respond creatively while staying grounded in the retrieved context: {query}",
        ),
        // Illegal content is rejected before enhancement; everything else
        // passes through unchanged.
        IntentKind::IllegalContent | IntentKind::Other | IntentKind::Custom(_) => None,
    }
}

/// Applies a template to a query.
pub fn apply(template: &str, query: &str) -> String {
    template.replace("{query}", query)
}

/// Follow-up suggestions per intent kind.
pub fn suggestions_for(intent: &IntentKind) -> Vec<String> {
    let items: &[&str] = match intent {
        IntentKind::KnowledgeQuery => &[
            "Narrow the question to a specific aspect for a more focused answer",
            "Name the knowledge base to search if you know it",
        ],
        IntentKind::FactualQuestion => &[
            "Add a time frame or place if the fact is time-sensitive",
        ],
        IntentKind::AnalyticalQuestion => &[
            "List the criteria you care about to steer the comparison",
        ],
        IntentKind::ProceduralQuestion => &[
            "Mention your starting point so steps can be tailored",
        ],
        IntentKind::CreativeRequest => &[
            "Describe tone and length expectations",
        ],
        IntentKind::IllegalContent => &[],
        IntentKind::Other | IntentKind::Custom(_) => &[
            "Rephrase as a direct question for better retrieval",
        ],
    };
    items.iter().map(|s| s.to_string()).collect()
}

/// Safety guidance shown with a rejection, keyed by risk category.
pub fn safety_tips_for(categories: &[String]) -> Vec<String> {
    let mut tips = vec![
        "This service only answers questions with lawful, protective intent".to_string(),
    ];
    for category in categories {
        let tip = match category.as_str() {
            "weapons" => "Questions about weapons are answered only in a safety or policy context",
            "drugs" => "Substance questions are answered only in a health or harm-reduction context",
            "fraud" => "Fraud topics are answered from the prevention and detection side",
            "intrusion" => "Security topics are answered defensively; offensive tooling is out of scope",
            _ => continue,
        };
        tips.push(tip.to_string());
    }
    tips
}

/// Safe reformulations offered with a rejection.
pub fn safe_alternatives_for(categories: &[String]) -> Vec<String> {
    let mut alternatives = Vec::new();
    for category in categories {
        let items: &[&str] = match category.as_str() {
            "weapons" => &[
                "How are explosive threats detected and reported?",
                "What should I do if I find a suspicious device?",
            ],
            "drugs" => &[
                "What are the health risks of synthetic drugs?",
                "Where can someone find substance-abuse support?",
            ],
            "fraud" => &[
                "How do I recognize and prevent common fraud schemes?",
                "How do I report suspected fraud?",
            ],
            "intrusion" => &[
                "How do organizations defend against ransomware?",
                "What are the basics of securing a home network?",
            ],
            _ => &["How can I learn about this topic from a safety perspective?"],
        };
        for item in items {
            if !alternatives.iter().any(|a| a == item) {
                alternatives.push(item.to_string());
            }
        }
    }
    if alternatives.is_empty() {
        alternatives.push("How can I learn about this topic from a safety perspective?".to_string());
    }
    alternatives
}
