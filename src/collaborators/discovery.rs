//! HTTP dataset discovery client
//!
//! `POST /search` with `{query}` returns `{results: [{url, title,
//! summary}]}`.

use super::client::ServiceClient;
use super::types::{CollaboratorError, DatasetCandidate, DiscoveryService};
use crate::config::CollaboratorConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<DatasetCandidate>,
}

/// Discovery service backed by an HTTP search API
#[derive(Debug, Clone)]
pub struct HttpDiscovery {
    client: ServiceClient,
}

impl HttpDiscovery {
    pub fn from_config(name: impl Into<String>, config: &CollaboratorConfig) -> Self {
        Self {
            client: ServiceClient::from_config(name, config),
        }
    }
}

#[async_trait]
impl DiscoveryService for HttpDiscovery {
    async fn search(
        &self,
        query: &str,
        timeout: Duration,
    ) -> Result<Vec<DatasetCandidate>, CollaboratorError> {
        let response: SearchResponse = self
            .client
            .post_json("search", &SearchRequest { query }, timeout)
            .await?;

        Ok(response.results)
    }

    fn name(&self) -> &str {
        self.client.name()
    }
}
