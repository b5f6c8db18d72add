/// Memory search collaborator for prompt enrichment.
///
/// The inference layer treats memory as a black box: hand it the user's
/// text, get back snippets. The HTTP backend talks to a local search
/// service; callers treat every failure as "no snippets".
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on a single search round-trip. Injection is best-effort;
/// a slow memory service must not stall the inference call.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// One retrieved snippet.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryHit {
    pub snippet: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Abstract search capability.
#[async_trait]
pub trait MemorySearch: Send + Sync {
    /// Return up to `limit` snippets relevant to `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>>;
}

/// HTTP-backed search client.
pub struct HttpMemorySearch {
    client: Client,
    base_url: String,
}

impl HttpMemorySearch {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .context("Failed to build memory search HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<MemoryHit>,
}

#[async_trait]
impl MemorySearch for HttpMemorySearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>> {
        let body = SearchRequest { query, limit };
        let res: SearchResponse = self
            .client
            .post(format!("{}/search", self.base_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse memory search response")?;

        debug!(count = res.results.len(), "Memory search returned snippets");
        Ok(res.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_deserializes_with_optional_fields() {
        let hit: MemoryHit = serde_json::from_str(r#"{"snippet": "user likes tea"}"#).unwrap();
        assert_eq!(hit.snippet, "user likes tea");
        assert!(hit.score.is_none());
        assert!(hit.source.is_none());
    }

    #[test]
    fn response_tolerates_missing_results_key() {
        let res: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(res.results.is_empty());
    }
}
