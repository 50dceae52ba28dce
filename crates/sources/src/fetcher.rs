//! Per-source fetch routine for the pull path.
//!
//! Loads a log source, queries its backend over the configured look-back
//! window, normalizes the documents, and records the connection outcome
//! on the source row.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use model::{ConnectionStatus, LogRecord, Result};
use pipeline::Normalizer;
use store::MetaStore;
use tracing::{info, warn};

use crate::search::SearchConnector;

#[derive(Clone)]
pub struct LogFetcher {
    store: Arc<dyn MetaStore>,
    normalizer: Normalizer,
}

impl LogFetcher {
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self { store, normalizer: Normalizer::new() }
    }

    /// Fetch and normalize one source's window.
    ///
    /// The window ends now and starts at the later of `lookback` and the
    /// source's own `last_fetch_at`, so an ahead-of-schedule manual run
    /// does not re-read the whole window. Connection status, fetch time,
    /// and last error are written back to the source row either way.
    pub async fn fetch_source(
        &self,
        log_source_id: &str,
        lookback: Duration,
    ) -> Result<Vec<LogRecord>> {
        let source = self.store.get_log_source(log_source_id).await?;
        let now = Utc::now();
        let since = effective_since(now, lookback, source.last_fetch_at);

        let connector = match SearchConnector::for_source(&source) {
            Ok(connector) => connector,
            Err(e) => {
                self.store
                    .update_source_fetch_state(
                        log_source_id,
                        ConnectionStatus::Error,
                        None,
                        Some(e.to_string()),
                    )
                    .await?;
                return Err(e.into());
            }
        };

        match connector.fetch_logs(since, now).await {
            Ok(documents) => {
                let records = self.normalizer.normalize_batch(&documents);
                info!(
                    log_source_id,
                    fetched = documents.len(),
                    normalized = records.len(),
                    "source fetch complete"
                );
                self.store
                    .update_source_fetch_state(
                        log_source_id,
                        ConnectionStatus::Connected,
                        Some(now),
                        None,
                    )
                    .await?;
                Ok(records)
            }
            Err(e) => {
                warn!(log_source_id, error = %e, "source fetch failed");
                self.store
                    .update_source_fetch_state(
                        log_source_id,
                        ConnectionStatus::Error,
                        None,
                        Some(e.to_string()),
                    )
                    .await?;
                Err(e.into())
            }
        }
    }
}

fn effective_since(
    now: DateTime<Utc>,
    lookback: Duration,
    last_fetch_at: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let window_start = now - lookback;
    match last_fetch_at {
        Some(last) if last > window_start => last,
        _ => window_start,
    }
}
