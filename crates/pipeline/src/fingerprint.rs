//! Message normalization and multi-level fingerprinting for logs without
//! stack traces.
//!
//! Variable tokens (ids, timestamps, paths, numbers) are rewritten to
//! placeholders so templated messages collide, then hashed at four
//! granularities: exact, template, semantic, and category.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::short_hash;

/// Substitution table, applied in order. Order matters: timestamps must be
/// rewritten before bare number runs, paths before version numbers.
static NORMALIZATION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(
                r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b",
            )
            .expect("uuid pattern"),
            "<UUID>",
        ),
        (
            Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("ip pattern"),
            "<IP>",
        ),
        (
            Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
                .expect("email pattern"),
            "<EMAIL>",
        ),
        (
            Regex::new(r"https?://\S+").expect("url pattern"),
            "<URL>",
        ),
        (
            Regex::new(r"(?:/[\w.-]+)+|(?:[A-Z]:\\[\w\\.-]+)").expect("path pattern"),
            "<PATH>",
        ),
        (
            Regex::new(
                r"\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?",
            )
            .expect("timestamp pattern"),
            "<TIMESTAMP>",
        ),
        (
            Regex::new(r"\b\d{4,}\b").expect("number pattern"),
            "<NUMBER>",
        ),
        (
            Regex::new(r"\b\d+\.\d+\b").expect("decimal pattern"),
            "<DECIMAL>",
        ),
        (
            Regex::new(r"\b0x[0-9a-fA-F]+\b").expect("addr pattern"),
            "<ADDR>",
        ),
        (
            Regex::new(r"(?i)\bid[=:]\s*\d+\b").expect("id pattern"),
            "id=<ID>",
        ),
        (
            Regex::new(r"(?i)\buser_id[=:]\s*\d+\b").expect("user_id pattern"),
            "user_id=<ID>",
        ),
        (
            Regex::new(r"(?i)\border_id[=:]\s*\d+\b").expect("order_id pattern"),
            "order_id=<ID>",
        ),
        (
            Regex::new(r"\{[^}]{20,}\}").expect("json pattern"),
            "<JSON>",
        ),
        (
            Regex::new(r"\[[^\]]{20,}\]").expect("array pattern"),
            "<ARRAY>",
        ),
        (
            Regex::new(r#""[^"]{30,}""#).expect("dquote string pattern"),
            "<STRING>",
        ),
        (
            Regex::new(r"'[^']{30,}'").expect("squote string pattern"),
            "<STRING>",
        ),
        (
            Regex::new(r"(?i)\b\d+\s*(?:ms|sec|min|hour|day)s?\b").expect("duration pattern"),
            "<DURATION>",
        ),
        (
            Regex::new(r"\b\d+(?:\.\d+)?%").expect("percent pattern"),
            "<PERCENT>",
        ),
        (
            Regex::new(r"\bv?\d+\.\d+(?:\.\d+)?(?:\.\d+)?\b").expect("version pattern"),
            "<VERSION>",
        ),
    ]
});

/// Error-category classifier; first match wins.
static CATEGORY_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)connection\s+(?:refused|timeout|reset|failed|closed)")
                .expect("connection pattern"),
            "CONNECTION_ERROR",
        ),
        (
            Regex::new(r"(?i)timeout|timed\s+out").expect("timeout pattern"),
            "TIMEOUT_ERROR",
        ),
        (
            Regex::new(
                r"(?i)auth(?:entication|orization)?\s+(?:failed|denied|error)|(?:failed|denied)\s+auth(?:entication|orization)?",
            )
            .expect("auth pattern"),
            "AUTH_ERROR",
        ),
        (
            Regex::new(r"(?i)database|sql|query|table|column").expect("database pattern"),
            "DATABASE_ERROR",
        ),
        (
            Regex::new(r"(?i)network|socket|host|dns").expect("network pattern"),
            "NETWORK_ERROR",
        ),
        (
            Regex::new(r"(?i)file\s+not\s+found|no\s+such\s+file|permission\s+denied")
                .expect("filesystem pattern"),
            "FILESYSTEM_ERROR",
        ),
        (
            Regex::new(r"(?i)out\s+of\s+memory|memory\s+error|heap").expect("memory pattern"),
            "MEMORY_ERROR",
        ),
        (
            Regex::new(r"(?i)null\s+pointer|none\s+type|undefined").expect("null pattern"),
            "NULL_ERROR",
        ),
        (
            Regex::new(r"(?i)invalid|validation|malformed|bad\s+request")
                .expect("validation pattern"),
            "VALIDATION_ERROR",
        ),
        (
            Regex::new(r"(?i)rate\s+limit|too\s+many\s+requests|quota")
                .expect("rate limit pattern"),
            "RATE_LIMIT_ERROR",
        ),
    ]
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("ws pattern"));
static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z]{3,}\b").expect("word pattern"));

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "be", "been", "being", "have", "has", "had", "do",
    "does", "did", "will", "would", "should", "could", "may", "might", "can", "this", "that",
    "these", "those", "it", "its", "i", "you", "he", "she", "we", "they",
];

/// The four fingerprint granularities for a stack-trace-less record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiFingerprints {
    /// Hash of the raw message.
    pub exact: String,
    /// Hash of the normalized message.
    pub template: String,
    /// Hash of type + category + logger + truncated normalized message.
    pub semantic: String,
    /// Hash of type + category.
    pub category: String,
}

/// Boolean entity markers extracted for clustering diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityFlags {
    pub has_uuid: bool,
    pub has_ip: bool,
    pub has_url: bool,
    pub has_path: bool,
    pub has_timestamp: bool,
    pub has_number: bool,
    pub has_json: bool,
    pub message_length: usize,
    pub word_count: usize,
}

/// Why two messages were judged to belong together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchReason {
    ExactMatch,
    TemplateMatch,
    NgramSimilarity,
    KeyTermOverlap,
    NoMatch,
}

impl MatchReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::TemplateMatch => "template_match",
            Self::NgramSimilarity => "ngram_similarity",
            Self::KeyTermOverlap => "key_term_overlap",
            Self::NoMatch => "no_match",
        }
    }
}

/// Normalizes messages and derives fingerprints. Stateless; the compiled
/// pattern tables are shared process-wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fingerprinter;

impl Fingerprinter {
    pub fn new() -> Self {
        Self
    }

    /// Rewrite variable tokens to placeholders, collapse whitespace,
    /// lower-case. Idempotent: normalizing a normalized message is a
    /// no-op.
    pub fn normalize_message(&self, message: &str) -> String {
        if message.is_empty() {
            return String::new();
        }
        let mut normalized = message.to_string();
        for (pattern, placeholder) in NORMALIZATION_PATTERNS.iter() {
            normalized = pattern.replace_all(&normalized, *placeholder).into_owned();
        }
        let normalized = WHITESPACE.replace_all(&normalized, " ");
        normalized.trim().to_ascii_lowercase()
    }

    /// First matching category, or `None` when unclassified.
    pub fn extract_error_category(&self, message: &str) -> Option<&'static str> {
        CATEGORY_PATTERNS
            .iter()
            .find(|(pattern, _)| pattern.is_match(message))
            .map(|(_, category)| *category)
    }

    pub fn template_fingerprint(&self, message: &str) -> String {
        short_hash(&self.normalize_message(message))
    }

    pub fn semantic_fingerprint(
        &self,
        message: &str,
        exception_type: &str,
        logger_name: &str,
        error_category: Option<&str>,
    ) -> String {
        let normalized = self.normalize_message(message);
        let truncated: String = normalized.chars().take(100).collect();
        let category = error_category
            .or_else(|| self.extract_error_category(message))
            .unwrap_or("GENERIC");
        short_hash(&format!("{exception_type}|{category}|{logger_name}|{truncated}"))
    }

    /// All four fingerprint levels for one message.
    pub fn multi_level_fingerprints(
        &self,
        message: &str,
        exception_type: &str,
        logger_name: &str,
    ) -> MultiFingerprints {
        let category = self.extract_error_category(message);
        MultiFingerprints {
            exact: short_hash(message),
            template: self.template_fingerprint(message),
            semantic: self.semantic_fingerprint(message, exception_type, logger_name, category),
            category: short_hash(&format!(
                "{exception_type}|{}",
                category.unwrap_or("GENERIC")
            )),
        }
    }

    /// Most frequent non-stop-word terms of the normalized message.
    pub fn extract_key_terms(&self, message: &str, top_n: usize) -> Vec<String> {
        let normalized = self.normalize_message(message);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for m in WORD.find_iter(&normalized) {
            let word = m.as_str();
            if !STOP_WORDS.contains(&word) {
                *counts.entry(word).or_default() += 1;
            }
        }
        let mut terms: Vec<(&str, usize)> = counts.into_iter().collect();
        // Count descending, then alphabetical for a stable order.
        terms.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        terms.into_iter().take(top_n).map(|(w, _)| w.to_string()).collect()
    }

    /// Word n-grams of the normalized message, for fuzzy matching.
    pub fn ngram_signature(&self, message: &str, n: usize) -> Vec<String> {
        let normalized = self.normalize_message(message);
        let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
        if words.len() < n {
            return Vec::new();
        }
        words.windows(n).map(|w| w.join(" ")).collect()
    }

    /// Jaccard similarity of two n-gram sets.
    pub fn ngram_similarity(&self, a: &[String], b: &[String]) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let set_a: std::collections::HashSet<&String> = a.iter().collect();
        let set_b: std::collections::HashSet<&String> = b.iter().collect();
        let intersection = set_a.intersection(&set_b).count();
        let union = set_a.union(&set_b).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }

    pub fn extract_entity_flags(&self, message: &str) -> EntityFlags {
        EntityFlags {
            has_uuid: NORMALIZATION_PATTERNS[0].0.is_match(message),
            has_ip: NORMALIZATION_PATTERNS[1].0.is_match(message),
            has_url: message.contains("http://") || message.contains("https://"),
            has_path: NORMALIZATION_PATTERNS[4].0.is_match(message),
            has_timestamp: NORMALIZATION_PATTERNS[5].0.is_match(message),
            has_number: message.chars().any(|c| c.is_ascii_digit()),
            has_json: message.contains('{') && message.contains('}'),
            message_length: message.len(),
            word_count: message.split_whitespace().count(),
        }
    }

    /// Ordered similarity cascade: exact equality → normalized equality →
    /// 3-gram Jaccard → key-term Jaccard. First satisfied rule wins.
    pub fn should_cluster_together(
        &self,
        msg1: &str,
        msg2: &str,
        threshold: f64,
    ) -> (bool, f64, MatchReason) {
        if msg1 == msg2 {
            return (true, 1.0, MatchReason::ExactMatch);
        }

        if self.normalize_message(msg1) == self.normalize_message(msg2) {
            return (true, 0.95, MatchReason::TemplateMatch);
        }

        let similarity =
            self.ngram_similarity(&self.ngram_signature(msg1, 3), &self.ngram_signature(msg2, 3));
        if similarity >= threshold {
            return (true, similarity, MatchReason::NgramSimilarity);
        }

        let terms1: std::collections::HashSet<String> =
            self.extract_key_terms(msg1, 5).into_iter().collect();
        let terms2: std::collections::HashSet<String> =
            self.extract_key_terms(msg2, 5).into_iter().collect();
        if !terms1.is_empty() && !terms2.is_empty() {
            let overlap = terms1.intersection(&terms2).count() as f64
                / terms1.union(&terms2).count() as f64;
            if overlap >= threshold {
                return (true, overlap, MatchReason::KeyTermOverlap);
            }
        }

        (false, 0.0, MatchReason::NoMatch)
    }
}
