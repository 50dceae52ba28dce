//! Indexed code blocks and per-repository indexing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structural unit kinds the extractors emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolType {
    Function,
    Class,
    Method,
}

/// Per-service code indexing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    NotIndexed,
    Indexing,
    Completed,
    Failed,
}

/// How an indexing run selected its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingMode {
    Full,
    Incremental,
    /// Nothing to do: the repository is already indexed at the current commit.
    Skip,
}

impl IndexingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Skip => "skip",
        }
    }
}

/// A structural block extracted from source, indexed with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    pub block_id: String,
    pub service_id: String,
    pub repository: String,
    pub version: String,
    pub commit_sha: String,
    pub file_path: String,
    /// Qualified name, e.g. `com.acme.Cart.total` or `handlers.user.create`.
    pub symbol_name: String,
    pub symbol_type: SymbolType,
    pub line_start: u32,
    pub line_end: u32,
    pub code_snippet: String,
    pub docstring: String,
    pub function_signature: String,
    /// Id of the vector-store point carrying this block's embedding.
    pub embedding_id: String,
    pub created_at: DateTime<Utc>,
}

/// One row per `(service, repository)`: where indexing last left off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingMetadata {
    pub service_id: String,
    pub repository: String,
    pub commit_sha: String,
    pub indexed_at: DateTime<Utc>,
    pub files_indexed: u64,
    pub code_blocks_created: u64,
    pub indexing_mode: IndexingMode,
}
