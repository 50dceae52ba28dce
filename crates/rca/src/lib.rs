//! Root-cause analysis: retrieve code context for a cluster, ask the LLM,
//! parse its JSON strictly, persist the artifact.

pub mod analyzer;
pub mod llm;
pub mod prompt;

pub use analyzer::RcaAnalyzer;
pub use llm::{LlmClient, LlmError, LlmResponse, OpenAiClient};
