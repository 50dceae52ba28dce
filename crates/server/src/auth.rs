//! Ingestion authentication and routing.
//!
//! Push tokens are shared secrets. Each registered token routes to one
//! `(service_id, log_source_id)` destination; lookup compares the
//! presented token against every registered one in constant time, so
//! the match itself leaks no timing signal.

use std::collections::HashMap;
use std::sync::RwLock;

use model::{Error, Result};
use subtle::ConstantTimeEq;

/// Destination a token routes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestDestination {
    pub service_id: String,
    pub log_source_id: String,
}

#[derive(Default)]
pub struct TokenRegistry {
    routes: RwLock<HashMap<String, IngestDestination>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: &str, service_id: &str, log_source_id: &str) {
        if token.is_empty() {
            return;
        }
        self.routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                token.to_string(),
                IngestDestination {
                    service_id: service_id.to_string(),
                    log_source_id: log_source_id.to_string(),
                },
            );
    }

    /// Authenticate a bearer token and resolve its destination.
    pub fn authenticate(&self, presented: &str) -> Result<IngestDestination> {
        let routes = self.routes.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (token, destination) in routes.iter() {
            if token.as_bytes().ct_eq(presented.as_bytes()).into() {
                return Ok(destination.clone());
            }
        }
        Err(Error::Auth("invalid ingestion token".into()))
    }
}

/// Pull the bearer token out of an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::Auth("missing bearer token".into()))
}
