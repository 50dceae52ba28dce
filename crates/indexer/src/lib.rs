//! Code indexing engine.
//!
//! Two back-ends (local tree walk, remote Git API) feed one flow: resolve
//! commit identity, decide full / incremental / skip, extract structural
//! blocks per file, embed them, and persist blocks + metadata under
//! per-tenant isolation. Per-file failures are counted and skipped;
//! only metadata or store persistence failures abort a run.

pub mod backend;
pub mod error;
pub mod exclude;
pub mod extract;

pub use backend::{ApiBackend, LocalBackend, RepoBackend};
pub use error::IndexError;
pub use extract::{extract_units, CodeUnit, Language};

use std::sync::Arc;

use chrono::Utc;
use model::{
    CodeBlock, Error, IndexingMetadata, IndexingMode, IndexingStatus, Result, Service,
};
use serde_json::json;
use store::{Embedder, MetaStore, VectorPoint, VectorStore, CODE_COLLECTION};
use tracing::{error, info, warn};

/// Outcome of one indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IndexStats {
    pub files_indexed: u64,
    pub blocks_created: u64,
    pub errors: u64,
    pub mode: IndexingMode,
}

/// Build the right backend for a service's configuration.
///
/// Local mode reads from `git_repo_path` (which must exist and be a
/// directory); API mode parses `repository_url` and talks to the
/// configured provider. Both invariants were validated when the service
/// was stored, but construction re-checks them because indexing may run
/// long after configuration changed.
pub fn backend_for_service(service: &Service) -> Result<Box<dyn RepoBackend>> {
    if service.use_api_mode {
        let provider = service
            .git_provider
            .ok_or_else(|| Error::Validation("API mode requires git_provider".into()))?;
        let url = service
            .repository_url
            .as_deref()
            .ok_or_else(|| Error::Validation("API mode requires repository_url".into()))?;
        let token = service
            .access_token
            .as_deref()
            .ok_or_else(|| Error::Validation("API mode requires access_token".into()))?;
        let coordinates = scm::parse_repository_url(url).map_err(model::Error::from)?;
        let api = scm::create_client(provider, coordinates.clone(), token)
            .map_err(model::Error::from)?;
        Ok(Box::new(ApiBackend::new(api, &coordinates, &service.git_branch)))
    } else {
        let path = service
            .git_repo_path
            .as_deref()
            .ok_or_else(|| Error::Validation("local mode requires git_repo_path".into()))?;
        let backend =
            LocalBackend::new(path, &service.git_branch).map_err(model::Error::from)?;
        Ok(Box::new(backend))
    }
}

/// Drives indexing runs for one service.
pub struct CodeIndexer {
    backend: Box<dyn RepoBackend>,
    store: Arc<dyn MetaStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    service_id: String,
}

impl CodeIndexer {
    pub fn new(
        backend: Box<dyn RepoBackend>,
        store: Arc<dyn MetaStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        service_id: &str,
    ) -> Self {
        Self {
            backend,
            store,
            vectors,
            embedder,
            service_id: service_id.to_string(),
        }
    }

    /// Run indexing: full, incremental, or skip, per the commit identity.
    pub async fn index_repository(
        &self,
        languages: &[Language],
        force_full: bool,
    ) -> Result<IndexStats> {
        let repository = self.backend.repository().to_string();
        let commit = self.backend.current_commit().await?;
        let last_indexed = self
            .store
            .get_indexing_metadata(&self.service_id, &repository)
            .await?
            .map(|m| m.commit_sha);

        if !force_full && last_indexed.as_deref() == Some(commit.as_str()) {
            info!(service_id = %self.service_id, commit = %short(&commit), "already indexed, skipping");
            return Ok(IndexStats {
                files_indexed: 0,
                blocks_created: 0,
                errors: 0,
                mode: IndexingMode::Skip,
            });
        }

        self.store
            .update_indexing_state(&self.service_id, IndexingStatus::Indexing, None)
            .await?;

        let run = self
            .run(languages, force_full, &repository, &commit, last_indexed)
            .await;

        match &run {
            Ok(stats) => {
                self.store
                    .update_indexing_state(
                        &self.service_id,
                        IndexingStatus::Completed,
                        Some(commit.clone()),
                    )
                    .await?;
                info!(service_id = %self.service_id, ?stats, "indexing complete");
            }
            Err(e) => {
                error!(service_id = %self.service_id, error = %e, "indexing failed");
                self.store
                    .update_indexing_state(&self.service_id, IndexingStatus::Failed, None)
                    .await?;
            }
        }
        run
    }

    async fn run(
        &self,
        languages: &[Language],
        force_full: bool,
        repository: &str,
        commit: &str,
        last_indexed: Option<String>,
    ) -> Result<IndexStats> {
        let mut mode = IndexingMode::Full;
        let files: Vec<String> = if force_full || last_indexed.is_none() {
            info!(service_id = %self.service_id, "starting full index");
            self.clear_service_blocks().await?;
            self.backend.list_candidate_files(languages).await.map_err(model::Error::from)?
        } else {
            let last = last_indexed.unwrap_or_default();
            match self
                .backend
                .changed_files_between(&last, commit, languages)
                .await
                .map_err(model::Error::from)?
            {
                None => {
                    // Backend cannot diff: replay everything.
                    info!(service_id = %self.service_id, "diff unavailable, running full index");
                    self.clear_service_blocks().await?;
                    self.backend
                        .list_candidate_files(languages)
                        .await
                        .map_err(model::Error::from)?
                }
                Some(changed) if changed.is_empty() => {
                    info!(service_id = %self.service_id, "no changed files, metadata only");
                    self.persist_metadata(repository, commit, 0, 0, IndexingMode::Incremental)
                        .await?;
                    return Ok(IndexStats {
                        files_indexed: 0,
                        blocks_created: 0,
                        errors: 0,
                        mode: IndexingMode::Incremental,
                    });
                }
                Some(changed) => {
                    info!(
                        service_id = %self.service_id,
                        files = changed.len(),
                        from = %short(&last),
                        to = %short(commit),
                        "starting incremental index"
                    );
                    mode = IndexingMode::Incremental;
                    changed
                }
            }
        };

        let mut stats = IndexStats {
            files_indexed: files.len() as u64,
            blocks_created: 0,
            errors: 0,
            mode,
        };

        for file in &files {
            match self.index_file(file, repository, commit, mode).await {
                Ok(count) => stats.blocks_created += count,
                Err(e) => {
                    warn!(file, error = %e, "file indexing failed");
                    stats.errors += 1;
                }
            }
        }

        self.persist_metadata(repository, commit, stats.files_indexed, stats.blocks_created, mode)
            .await?;
        Ok(stats)
    }

    /// Extract, embed, and store one file's blocks. In incremental mode
    /// the previous generation of this file is replaced in the same store
    /// step, so searches never see a mix.
    async fn index_file(
        &self,
        file: &str,
        repository: &str,
        commit: &str,
        mode: IndexingMode,
    ) -> Result<u64> {
        let source = self.backend.read_file(file).await.map_err(model::Error::from)?;
        let units = extract_units(file, &source).map_err(model::Error::from)?;

        let now = Utc::now();
        let mut blocks = Vec::with_capacity(units.len());
        let mut points = Vec::with_capacity(units.len());
        for unit in units {
            let block_id = uuid::Uuid::new_v4().to_string();
            let embed_text =
                format!("{}\n{}\n{}", unit.symbol_name, unit.docstring, unit.code_snippet);
            points.push(VectorPoint {
                id: block_id.clone(),
                vector: self.embedder.embed(&embed_text),
                payload: json!({
                    "service_id": self.service_id,
                    "repository": repository,
                    "version": self.backend.version(),
                    "commit_sha": commit,
                    "file_path": file,
                    "symbol_name": unit.symbol_name,
                    "symbol_type": unit.symbol_type,
                    "line_start": unit.line_start,
                    "line_end": unit.line_end,
                }),
            });
            blocks.push(CodeBlock {
                embedding_id: block_id.clone(),
                block_id,
                service_id: self.service_id.clone(),
                repository: repository.to_string(),
                version: self.backend.version().to_string(),
                commit_sha: commit.to_string(),
                file_path: file.to_string(),
                symbol_name: unit.symbol_name,
                symbol_type: unit.symbol_type,
                line_start: unit.line_start,
                line_end: unit.line_end,
                code_snippet: unit.code_snippet,
                docstring: unit.docstring,
                function_signature: unit.signature,
                created_at: now,
            });
        }

        let count = blocks.len() as u64;
        let file_filter = vec![
            ("service_id".to_string(), json!(self.service_id)),
            ("file_path".to_string(), json!(file)),
        ];
        match mode {
            IndexingMode::Incremental => {
                self.store
                    .replace_file_code_blocks(&self.service_id, file, blocks)
                    .await?;
                self.vectors.replace(CODE_COLLECTION, &file_filter, points).await?;
            }
            _ => {
                self.store.insert_code_blocks(blocks).await?;
                self.vectors.upsert(CODE_COLLECTION, points).await?;
            }
        }
        Ok(count)
    }

    async fn clear_service_blocks(&self) -> Result<()> {
        let deleted = self.store.delete_service_code_blocks(&self.service_id).await?;
        self.vectors
            .delete_by_filter(
                CODE_COLLECTION,
                &vec![("service_id".to_string(), json!(self.service_id))],
            )
            .await?;
        info!(deleted, service_id = %self.service_id, "cleared previous blocks");
        Ok(())
    }

    async fn persist_metadata(
        &self,
        repository: &str,
        commit: &str,
        files: u64,
        blocks: u64,
        mode: IndexingMode,
    ) -> Result<()> {
        self.store
            .upsert_indexing_metadata(IndexingMetadata {
                service_id: self.service_id.clone(),
                repository: repository.to_string(),
                commit_sha: commit.to_string(),
                indexed_at: Utc::now(),
                files_indexed: files,
                code_blocks_created: blocks,
                indexing_mode: mode,
            })
            .await
    }
}

fn short(sha: &str) -> &str {
    &sha[..sha.len().min(8)]
}
