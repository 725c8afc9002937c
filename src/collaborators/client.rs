//! Shared HTTP plumbing for collaborator clients

use super::types::CollaboratorError;
use crate::config::CollaboratorConfig;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

/// Thin JSON-over-HTTP client shared by the collaborator impls
#[derive(Debug, Clone)]
pub(super) struct ServiceClient {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ServiceClient {
    pub(super) fn from_config(name: impl Into<String>, config: &CollaboratorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .expect("failed to build HTTP client");

        Self {
            name: name.into(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            client,
        }
    }

    pub(super) fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// POST a JSON body and decode a JSON response, bounded by `timeout`
    pub(super) async fn post_json<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
        timeout: Duration,
    ) -> Result<Resp, CollaboratorError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let start = Instant::now();

        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let result = tokio::time::timeout(timeout, request.send()).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    response
                        .json::<Resp>()
                        .await
                        .map_err(|e| CollaboratorError::parse(format!("decoding response: {}", e)))
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(map_http_error(status, body, elapsed))
                }
            }
            Ok(Err(e)) => {
                if e.is_timeout() {
                    Err(CollaboratorError::timeout(elapsed))
                } else if e.is_connect() {
                    Err(CollaboratorError::network(format!(
                        "connection failed: {}",
                        e
                    )))
                } else {
                    Err(CollaboratorError::network(format!("request failed: {}", e)))
                }
            }
            Err(_) => Err(CollaboratorError::timeout(elapsed)),
        }
    }
}

/// Map a non-success HTTP status to a collaborator error
fn map_http_error(
    status: reqwest::StatusCode,
    body: String,
    elapsed: Duration,
) -> CollaboratorError {
    match status.as_u16() {
        408 | 504 => CollaboratorError::timeout(elapsed),
        400..=499 => CollaboratorError::InvalidRequest {
            message: format!("HTTP {}: {}", status, body),
        },
        _ => CollaboratorError::Http {
            status: status.as_u16(),
            body,
        },
    }
}
