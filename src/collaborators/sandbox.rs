//! HTTP execution sandbox client
//!
//! The sandbox exposes `POST /execute` with a `{code}` body and
//! answers `{success, stdout, stderr}`. Transport failures are
//! reported as such so the retry controller can tell them apart from
//! code-level failures.

use super::client::ServiceClient;
use super::types::{CollaboratorError, ExecutionOutcome, ExecutionSandbox};
use crate::config::CollaboratorConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
}

/// Execution sandbox backed by an HTTP service
#[derive(Debug, Clone)]
pub struct HttpSandbox {
    client: ServiceClient,
}

impl HttpSandbox {
    pub fn from_config(name: impl Into<String>, config: &CollaboratorConfig) -> Self {
        Self {
            client: ServiceClient::from_config(name, config),
        }
    }
}

#[async_trait]
impl ExecutionSandbox for HttpSandbox {
    async fn execute(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, CollaboratorError> {
        self.client
            .post_json("execute", &ExecuteRequest { code }, timeout)
            .await
    }

    fn name(&self) -> &str {
        self.client.name()
    }
}
