//! The fuzzy full-text/trigram search engine that backs candidate retrieval. Out of scope to
//! implement here — this module only declares the contract and a thin HTTP client against it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::WizardError;
use super::models::FlyerOffer;

#[derive(Debug, Clone, Serialize)]
pub struct SearchFilters {
    pub valid_only: bool,
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub offer: FlyerOffer,
    pub name_similarity: f64,
    pub brand_similarity: f64,
    pub combined_similarity: f64,
}

/// Read-only collaborator; the retriever surfaces its errors rather than retrying, per the
/// concurrency model's "search collaborator: read-only; retries are not the orchestrator's
/// responsibility" rule.
#[async_trait]
pub trait FuzzySearchClient: Send + Sync {
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>, WizardError>;
}

#[derive(Debug, Clone)]
pub struct HttpFuzzySearchClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFuzzySearchClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[async_trait]
impl FuzzySearchClient for HttpFuzzySearchClient {
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>, WizardError> {
        #[derive(Serialize)]
        struct Request<'a> {
            query: &'a str,
            valid_only: bool,
            limit: usize,
        }

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&Request { query, valid_only: filters.valid_only, limit: filters.limit })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WizardError::internal(format!(
                "search collaborator returned status {}",
                response.status()
            )));
        }

        let hits: Vec<SearchHit> = response.json().await?;
        Ok(hits)
    }
}

/// In-memory test double returning a fixed, query-keyed hit set. Queries not present in the
/// map return no hits rather than an error.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct MockFuzzySearchClient {
        hits_by_query: Mutex<HashMap<String, Vec<SearchHit>>>,
    }

    impl MockFuzzySearchClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn set_hits(&self, query: impl Into<String>, hits: Vec<SearchHit>) {
            self.hits_by_query.lock().await.insert(query.into(), hits);
        }
    }

    #[async_trait]
    impl FuzzySearchClient for MockFuzzySearchClient {
        async fn search(&self, query: &str, _filters: &SearchFilters) -> Result<Vec<SearchHit>, WizardError> {
            Ok(self.hits_by_query.lock().await.get(query).cloned().unwrap_or_default())
        }
    }
}
