//! HTTP content generator client
//!
//! Talks to a generation service exposing `POST /generate` with a
//! `{kind, context, model?}` body and a `{text}` response.

use super::client::ServiceClient;
use super::types::{CollaboratorError, ContentGenerator, GenerationKind};
use crate::config::CollaboratorConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    kind: GenerationKind,
    context: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Content generator backed by an HTTP service
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: ServiceClient,
    model: Option<String>,
}

impl HttpGenerator {
    pub fn from_config(name: impl Into<String>, config: &CollaboratorConfig) -> Self {
        Self {
            client: ServiceClient::from_config(name, config),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl ContentGenerator for HttpGenerator {
    async fn generate(
        &self,
        kind: GenerationKind,
        context: &str,
        timeout: Duration,
    ) -> Result<String, CollaboratorError> {
        let request = GenerateRequest {
            kind,
            context,
            model: self.model.as_deref(),
        };

        let response: GenerateResponse = self.client.post_json("generate", &request, timeout).await?;

        if response.text.trim().is_empty() {
            return Err(CollaboratorError::parse(format!(
                "generator returned empty text for kind '{}'",
                kind.as_str()
            )));
        }

        Ok(response.text)
    }

    fn name(&self) -> &str {
        self.client.name()
    }
}
