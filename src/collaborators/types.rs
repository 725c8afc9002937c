//! Core types and traits for external collaborator services
//!
//! The engine never talks to the outside world directly: content
//! generation, code execution, and dataset discovery all go through
//! these traits so tests can swap in mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error types from collaborator calls
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// Call exceeded the caller-supplied timeout
    #[error("timeout after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Transport-level failure (connection refused, DNS, reset)
    #[error("network error: {message}")]
    Network { message: String },

    /// Service answered with a non-success HTTP status
    #[error("service error (HTTP {status}): {body}")]
    Http { status: u16, body: String },

    /// Response body could not be decoded
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Service refused the request as invalid
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl CollaboratorError {
    /// True when the failure happened before the service could act
    /// (the call may never have reached it)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Timeout { .. } | CollaboratorError::Network { .. }
        )
    }

    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

/// What the content generator is being asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationKind {
    /// Research methodology plan for the goal
    ResearchPlan,

    /// Column/feature summary of the dataset
    SchemaSummary,

    /// Exploratory-data-analysis / cleaning code
    EdaCode,

    /// Model training code
    TrainingCode,

    /// Revision of failing code given its error output
    CodeRepair,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::ResearchPlan => "research-plan",
            GenerationKind::SchemaSummary => "schema-summary",
            GenerationKind::EdaCode => "eda-code",
            GenerationKind::TrainingCode => "training-code",
            GenerationKind::CodeRepair => "code-repair",
        }
    }
}

/// Result of one sandbox execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Whether the sandbox judged the run successful
    pub success: bool,

    /// Captured standard output
    #[serde(default)]
    pub stdout: String,

    /// Captured standard error
    #[serde(default)]
    pub stderr: String,
}

/// Candidate dataset returned by the discovery service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetCandidate {
    pub url: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub summary: String,
}

/// Generates research plans and source code from a goal/context
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce text of the given kind for the given context
    async fn generate(
        &self,
        kind: GenerationKind,
        context: &str,
        timeout: Duration,
    ) -> Result<String, CollaboratorError>;

    fn name(&self) -> &str;
}

/// Runs generated code and reports captured output
#[async_trait]
pub trait ExecutionSandbox: Send + Sync {
    async fn execute(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, CollaboratorError>;

    fn name(&self) -> &str;
}

/// Finds candidate datasets for a query
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    async fn search(
        &self,
        query: &str,
        timeout: Duration,
    ) -> Result<Vec<DatasetCandidate>, CollaboratorError>;

    fn name(&self) -> &str;
}
