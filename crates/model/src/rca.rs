//! Root-cause-analysis artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A code reference the analyzer cited as evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportingEvidence {
    pub file_path: String,
    #[serde(default)]
    pub code_snippet: String,
    #[serde(default)]
    pub relevance: String,
}

/// A request/state value the analyzer believes contributed to the failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvolvedParameter {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub issue: String,
}

/// A persisted RCA. Immutable after creation, except for the aggregated
/// `validation_score` fed by user feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaResult {
    pub rca_id: String,
    pub cluster_id: String,
    pub root_cause_file: String,
    pub root_cause_symbol: String,
    pub root_cause_line_start: u32,
    pub root_cause_line_end: u32,
    /// In `[0, 1]`.
    pub confidence_score: f64,
    pub explanation: String,
    pub involved_parameters: Vec<InvolvedParameter>,
    pub fix_suggestions: Vec<String>,
    pub tests_to_add: Vec<String>,
    pub supporting_evidence: Vec<SupportingEvidence>,
    pub llm_model: String,
    pub llm_tokens_used: u64,
    /// Running mean of user feedback scores; `None` until first feedback.
    pub validation_score: Option<f64>,
    pub feedback_count: u64,
    pub created_at: DateTime<Utc>,
}

impl RcaResult {
    /// Fold one feedback score in `[0, 1]` into the running mean.
    pub fn apply_feedback(&mut self, score: f64) {
        let total = self.validation_score.unwrap_or(0.0) * self.feedback_count as f64 + score;
        self.feedback_count += 1;
        self.validation_score = Some(total / self.feedback_count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rca() -> RcaResult {
        RcaResult {
            rca_id: "rca_1".into(),
            cluster_id: "cluster_1".into(),
            root_cause_file: "Bar.java".into(),
            root_cause_symbol: "baz".into(),
            root_cause_line_start: 40,
            root_cause_line_end: 48,
            confidence_score: 0.8,
            explanation: "null order id".into(),
            involved_parameters: vec![],
            fix_suggestions: vec!["guard the lookup".into()],
            tests_to_add: vec![],
            supporting_evidence: vec![],
            llm_model: "gpt-4-turbo-preview".into(),
            llm_tokens_used: 1200,
            validation_score: None,
            feedback_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_feedback_running_mean() {
        let mut rca = rca();
        rca.apply_feedback(1.0);
        assert_eq!(rca.validation_score, Some(1.0));
        rca.apply_feedback(0.0);
        assert_eq!(rca.validation_score, Some(0.5));
        assert_eq!(rca.feedback_count, 2);
    }
}
