//! OpenSearch/Elasticsearch HTTP+JSON connector.
//!
//! Speaks the search-engine dialect both engines share: a bool query with
//! an `@timestamp` range plus optional term filters, scrolled result
//! paging at batch size 1000.

use chrono::{DateTime, SecondsFormat, Utc};
use model::{LogSource, SourceType};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const SCROLL_BATCH: usize = 1000;
const SCROLL_KEEPALIVE: &str = "2m";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("search backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search backend answered {status}: {body}")]
    Api { status: u16, body: String },

    #[error("source type {0:?} has no built-in connector")]
    Unsupported(SourceType),
}

impl From<SourceError> for model::Error {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unsupported(_) => model::Error::Validation(err.to_string()),
            other => model::Error::upstream("search_backend", other.to_string()),
        }
    }
}

/// Connector for one configured log source.
pub struct SearchConnector {
    client: reqwest::Client,
    base_url: String,
    index_pattern: String,
    query_filter: Option<Value>,
    username: Option<String>,
    password: Option<String>,
}

impl SearchConnector {
    /// Build a connector from a log-source row. Only the search-engine
    /// backends are supported in-tree; everything else is pluggable
    /// behind the normalizer contract and rejected here.
    pub fn for_source(source: &LogSource) -> Result<Self, SourceError> {
        match source.source_type {
            SourceType::Opensearch | SourceType::Elasticsearch => {}
            other => return Err(SourceError::Unsupported(other)),
        }

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!source.verify_certs)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: source.base_url(),
            index_pattern: source.index_pattern.clone(),
            query_filter: source.query_filter.clone(),
            username: source.username.clone(),
            password: source.password.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_deref());
        }
        builder
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, SourceError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let payload: Value = response.json().await?;
        if !status.is_success() {
            return Err(SourceError::Api { status: status.as_u16(), body: payload.to_string() });
        }
        Ok(payload)
    }

    /// Check that the backend answers at all.
    pub async fn test_connection(&self) -> Result<(), SourceError> {
        let response = self.request(reqwest::Method::GET, "/").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Fetch raw documents with `@timestamp` in `[since, until]`, scrolling
    /// through the full result set in arrival order.
    pub async fn fetch_logs(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Value>, SourceError> {
        let mut must = vec![json!({
            "range": {
                "@timestamp": {
                    "gte": since.to_rfc3339_opts(SecondsFormat::Millis, true),
                    "lte": until.to_rfc3339_opts(SecondsFormat::Millis, true)
                }
            }
        })];
        if let Some(filter) = &self.query_filter {
            must.push(filter.clone());
        }

        let body = json!({
            "size": SCROLL_BATCH,
            "sort": [{ "@timestamp": { "order": "asc" } }],
            "query": { "bool": { "must": must } }
        });

        let path = format!("/{}/_search?scroll={SCROLL_KEEPALIVE}", self.index_pattern);
        let mut page = self.post_json(&path, &body).await?;
        let mut documents = Vec::new();

        loop {
            let hits = page
                .pointer("/hits/hits")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if hits.is_empty() {
                break;
            }
            debug!(batch = hits.len(), "scroll page");
            documents.extend(
                hits.into_iter()
                    .filter_map(|hit| hit.get("_source").cloned()),
            );

            let Some(scroll_id) = page.get("_scroll_id").and_then(Value::as_str) else {
                break;
            };
            page = self
                .post_json(
                    "/_search/scroll",
                    &json!({ "scroll": SCROLL_KEEPALIVE, "scroll_id": scroll_id }),
                )
                .await?;
        }

        info!(total = documents.len(), index = %self.index_pattern, "fetched documents");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::ConnectionStatus;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(uri: &str) -> LogSource {
        let url = uri.strip_prefix("http://").unwrap();
        let (host, port) = url.split_once(':').unwrap();
        LogSource {
            log_source_id: "src_1".into(),
            service_id: "svc_1".into(),
            source_type: SourceType::Opensearch,
            host: host.into(),
            port: port.parse().unwrap(),
            username: None,
            password: None,
            use_ssl: false,
            verify_certs: true,
            index_pattern: "logs-*".into(),
            query_filter: Some(json!({ "term": { "service": "checkout" } })),
            is_active: true,
            fetch_enabled: true,
            fetch_interval_minutes: 5,
            connection_status: ConnectionStatus::Unknown,
            last_fetch_at: None,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_scroll_until_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logs-*/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "s1",
                "hits": { "hits": [
                    { "_source": { "message": "one" } },
                    { "_source": { "message": "two" } }
                ] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "s2",
                "hits": { "hits": [] }
            })))
            .mount(&server)
            .await;

        let connector = SearchConnector::for_source(&source(&server.uri())).unwrap();
        let docs = connector
            .fetch_logs(Utc::now() - chrono::Duration::minutes(30), Utc::now())
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["message"], "one");
    }

    #[tokio::test]
    async fn test_query_includes_range_and_filter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logs-*/_search"))
            .and(body_partial_json(json!({
                "size": 1000,
                "query": { "bool": { "must": [
                    {},
                    { "term": { "service": "checkout" } }
                ] } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": { "hits": [] }
            })))
            .mount(&server)
            .await;

        let connector = SearchConnector::for_source(&source(&server.uri())).unwrap();
        let docs = connector
            .fetch_logs(Utc::now() - chrono::Duration::minutes(5), Utc::now())
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_api_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({ "error": "shard failure" })),
            )
            .mount(&server)
            .await;

        let connector = SearchConnector::for_source(&source(&server.uri())).unwrap();
        let err = connector
            .fetch_logs(Utc::now() - chrono::Duration::minutes(5), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_unsupported_backend_rejected() {
        let mut src = source("http://localhost:9200");
        src.source_type = SourceType::Syslog;
        assert!(matches!(
            SearchConnector::for_source(&src),
            Err(SourceError::Unsupported(SourceType::Syslog))
        ));
    }
}
