//! Storage adapters.
//!
//! The core never speaks SQL or a vector DSL inline: everything goes
//! through the [`MetaStore`] and [`VectorStore`] traits. The in-memory
//! implementations are the reference backends (and what the test suites
//! run against); [`QdrantHttp`] speaks the Qdrant REST dialect for
//! deployments with a real vector store.

pub mod embed;
pub mod memory;
pub mod meta;
pub mod vector;

pub use embed::{Embedder, HashEmbedder};
pub use memory::MemoryStore;
pub use meta::{ClusterFilter, ClusterUpsert, MetaStore, TaskStats};
pub use vector::{
    MemoryVectorStore, QdrantHttp, ScoredPoint, VectorPoint, VectorStore, CODE_COLLECTION,
    LOG_COLLECTION,
};
