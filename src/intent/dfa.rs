//! Sensitive-word scanning.
//!
//! The vocabulary compiles once into an Aho-Corasick automaton (a DFA over
//! all patterns simultaneously). Inputs are normalized first — lowercased,
//! with common digit/symbol substitutions mapped back to letters — so
//! `h0w to m4ke a b0mb` scans the same as the plain spelling.

use std::fs;
use std::path::Path;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use super::error::IntentError;

/// One vocabulary entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveWord {
    /// The phrase to match (normalized form).
    pub word: String,
    /// Category label, e.g. `weapons`, `fraud`.
    pub category: String,
    /// Whether a match escalates to the illegal level.
    pub illegal: bool,
}

/// A category matched in some content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveMatch {
    /// Matched phrase.
    pub word: String,
    /// Its category.
    pub category: String,
    /// Whether the category is illegal-level.
    pub illegal: bool,
}

/// Compiled scanner over the sensitive vocabulary.
#[derive(Debug)]
pub struct SensitiveScanner {
    automaton: AhoCorasick,
    entries: Vec<SensitiveWord>,
}

impl SensitiveScanner {
    /// Compiles a scanner from vocabulary entries.
    pub fn build(entries: Vec<SensitiveWord>) -> Result<Self, IntentError> {
        let patterns: Vec<String> = entries.iter().map(|e| normalize(&e.word)).collect();
        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .ascii_case_insensitive(true)
            .build(&patterns)
            .map_err(|e| IntentError::Vocabulary(e.to_string()))?;
        Ok(Self { automaton, entries })
    }

    /// Number of compiled entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scans `content`, returning matched entries (deduplicated by word).
    pub fn scan(&self, content: &str) -> Vec<SensitiveMatch> {
        let normalized = normalize(content);
        let mut matches: Vec<SensitiveMatch> = Vec::new();

        for found in self.automaton.find_overlapping_iter(&normalized) {
            let entry = &self.entries[found.pattern().as_usize()];
            if matches.iter().any(|m| m.word == entry.word) {
                continue;
            }
            matches.push(SensitiveMatch {
                word: entry.word.clone(),
                category: entry.category.clone(),
                illegal: entry.illegal,
            });
        }
        matches
    }
}

/// Normalizes text for scanning: lowercase plus leet-style de-substitution.
pub fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            '0' => 'o',
            '1' => 'i',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '7' => 't',
            '@' => 'a',
            '$' => 's',
            lower => lower,
        })
        .collect()
}

/// Loads vocabulary entries from a file.
///
/// Line format: `word,category[,illegal|suspicious]`. Lines with no comma are
/// plain words in the `sensitive` category at illegal level. `#` comments and
/// blank lines are skipped.
pub fn load_vocabulary(path: &Path) -> Result<Vec<SensitiveWord>, IntentError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| IntentError::Vocabulary(format!("cannot read {}: {e}", path.display())))?;

    let mut entries = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split(',').map(str::trim);
        let word = match parts.next() {
            Some(word) if !word.is_empty() => word.to_string(),
            _ => continue,
        };
        let category = parts
            .next()
            .filter(|c| !c.is_empty())
            .unwrap_or("sensitive")
            .to_string();
        let illegal = match parts.next() {
            Some("suspicious") => false,
            _ => true,
        };
        entries.push(SensitiveWord {
            word,
            category,
            illegal,
        });
    }
    Ok(entries)
}

/// The built-in fallback vocabulary, used when no file is configured.
///
/// Small on purpose: real deployments point
/// `intent_sensitive_vocabulary_path` at the full curated list.
pub fn builtin_vocabulary() -> Vec<SensitiveWord> {
    let illegal: &[(&str, &str)] = &[
        ("bomb", "weapons"),
        ("explosive device", "weapons"),
        ("improvised explosive", "weapons"),
        ("detonator", "weapons"),
        ("ghost gun", "weapons"),
        ("nerve agent", "weapons"),
        ("methamphetamine", "drugs"),
        ("synthesize fentanyl", "drugs"),
        ("cook meth", "drugs"),
        ("credit card skimmer", "fraud"),
        ("phishing kit", "fraud"),
        ("launder money", "fraud"),
        ("counterfeit currency", "fraud"),
        ("steal identity", "fraud"),
        ("ransomware", "intrusion"),
        ("keylogger", "intrusion"),
        ("botnet", "intrusion"),
        ("zero-day exploit", "intrusion"),
        ("human trafficking", "exploitation"),
    ];
    let suspicious: &[(&str, &str)] = &[
        ("fraud", "fraud"),
        ("scam", "fraud"),
        ("hack", "intrusion"),
        ("poison", "harm"),
        ("weapon", "weapons"),
        ("surveillance", "privacy"),
    ];

    illegal
        .iter()
        .map(|(word, category)| SensitiveWord {
            word: word.to_string(),
            category: category.to_string(),
            illegal: true,
        })
        .chain(suspicious.iter().map(|(word, category)| SensitiveWord {
            word: word.to_string(),
            category: category.to_string(),
            illegal: false,
        }))
        .collect()
}

/// Patterns indicating a protective / educational orientation.
pub const EDUCATIONAL_PATTERNS: &[&str] = &[
    "how to prevent",
    "how to recognize",
    "how to identify",
    "how to avoid",
    "how to protect",
    "how to detect",
    "how to report",
    "warning signs of",
    "dangers of",
    "awareness of",
    "protect against",
    "defend against",
    "recognize and prevent",
];

/// Patterns indicating an instructive orientation toward the act itself.
pub const INSTRUCTIVE_PATTERNS: &[&str] = &[
    "how to make",
    "how to build",
    "how to create",
    "how to carry out",
    "how to commit",
    "how do i make",
    "how do i build",
    "step by step",
    "step-by-step",
    "instructions for",
    "recipe for",
    "tutorial for making",
];

/// Scans for orientation patterns in normalized content.
pub fn orientation(content: &str) -> (bool, bool) {
    let normalized = normalize(content);
    let educational = EDUCATIONAL_PATTERNS.iter().any(|p| normalized.contains(p));
    let instructive = INSTRUCTIVE_PATTERNS.iter().any(|p| normalized.contains(p));
    (educational, instructive)
}
