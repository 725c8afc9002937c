//! Workflow record - the canonical state of one workflow instance

use super::stage::{Decision, GateKind, Stage, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reference to a discovered (or user-supplied) dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// Where the dataset lives
    pub url: String,

    /// Human-readable title (empty for user-supplied URLs)
    #[serde(default)]
    pub title: String,

    /// Short description from the discovery service
    #[serde(default)]
    pub summary: String,

    /// True when the user supplied the URL at workflow start
    #[serde(default)]
    pub provided_by_user: bool,
}

impl DatasetInfo {
    /// Dataset reference for a URL the user supplied at start
    pub fn user_supplied(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            provided_by_user: true,
            ..Default::default()
        }
    }
}

/// Kinds of generated artifacts kept on the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    ResearchPlan,
    EdaCode,
    TrainingCode,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::ResearchPlan => "research-plan",
            ArtifactKind::EdaCode => "eda-code",
            ArtifactKind::TrainingCode => "training-code",
        }
    }
}

/// State of one workflow instance
///
/// Owned exclusively by the store; mutated only through
/// `WorkflowStore::mutate`, which bumps `version` on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Opaque identifier, assigned at creation
    pub id: String,

    /// Free-text objective, immutable after creation
    pub goal: String,

    /// Current pipeline stage
    pub stage: Stage,

    /// Discovered or user-supplied dataset
    pub dataset: Option<DatasetInfo>,

    /// Dataset URLs rejected at the dataset gate; excluded on re-research
    #[serde(default)]
    pub rejected_urls: Vec<String>,

    /// Column/feature summary captured after data engineering
    pub schema_snapshot: Option<String>,

    /// Generated text artifacts by kind
    #[serde(default)]
    pub artifacts: HashMap<ArtifactKind, String>,

    /// Self-heal retries consumed in the current execution visit
    pub execution_attempts: u32,

    /// Captured output of the last successful execution
    pub execution_logs: Option<String>,

    /// Human feedback from satisfaction-loop rejections, append-only
    #[serde(default)]
    pub feedback_history: Vec<String>,

    /// Most recent failure description
    pub last_error: Option<String>,

    /// Last gate decision applied; used for idempotent resume
    pub last_decision: Option<(GateKind, Decision)>,

    /// Monotonic counter, bumped on every mutation
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRecord {
    /// Create a fresh record at the initial stage
    pub fn new(goal: impl Into<String>, dataset_url: Option<String>) -> Self {
        let now = Utc::now();
        let dataset = dataset_url
            .filter(|u| !u.trim().is_empty())
            .map(DatasetInfo::user_supplied);

        Self {
            id: new_workflow_id(),
            goal: goal.into(),
            stage: Stage::Research,
            dataset,
            rejected_urls: Vec::new(),
            schema_snapshot: None,
            artifacts: HashMap::new(),
            execution_attempts: 0,
            execution_logs: None,
            feedback_history: Vec::new(),
            last_error: None,
            last_decision: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Externally visible status, derived from the stage
    pub fn status(&self) -> WorkflowStatus {
        self.stage.status()
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<&str> {
        self.artifacts.get(&kind).map(|s| s.as_str())
    }

    pub fn set_artifact(&mut self, kind: ArtifactKind, text: impl Into<String>) {
        self.artifacts.insert(kind, text.into());
    }

    /// Assemble the script submitted to the sandbox: EDA first, then
    /// training, matching the order the stages produced them
    pub fn combined_code(&self) -> Option<String> {
        let eda = self.artifact(ArtifactKind::EdaCode)?;
        let training = self.artifact(ArtifactKind::TrainingCode)?;

        Some(format!(
            "# --- exploratory data analysis ---\n{}\n\n# --- model training ---\n{}\n",
            eda, training
        ))
    }
}

/// Generate a workflow identifier (`wf-` plus 12 hex chars)
fn new_workflow_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("wf-{}", &uuid[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_initial_state() {
        let record = WorkflowRecord::new("predict diabetes risk", None);

        assert!(record.id.starts_with("wf-"));
        assert_eq!(record.stage, Stage::Research);
        assert_eq!(record.status(), WorkflowStatus::Running);
        assert_eq!(record.version, 0);
        assert_eq!(record.execution_attempts, 0);
        assert!(record.dataset.is_none());
        assert!(record.artifacts.is_empty());
        assert!(record.feedback_history.is_empty());
    }

    #[test]
    fn test_user_supplied_dataset() {
        let record = WorkflowRecord::new("goal", Some("https://example.com/data.csv".into()));
        let dataset = record.dataset.unwrap();

        assert!(dataset.provided_by_user);
        assert_eq!(dataset.url, "https://example.com/data.csv");
    }

    #[test]
    fn test_blank_dataset_url_ignored() {
        let record = WorkflowRecord::new("goal", Some("   ".into()));
        assert!(record.dataset.is_none());
    }

    #[test]
    fn test_unique_ids() {
        let a = WorkflowRecord::new("a", None);
        let b = WorkflowRecord::new("b", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_combined_code_requires_both_artifacts() {
        let mut record = WorkflowRecord::new("goal", None);
        assert!(record.combined_code().is_none());

        record.set_artifact(ArtifactKind::EdaCode, "print('eda')");
        assert!(record.combined_code().is_none());

        record.set_artifact(ArtifactKind::TrainingCode, "print('train')");
        let code = record.combined_code().unwrap();
        assert!(code.contains("print('eda')"));
        assert!(code.contains("print('train')"));
        // EDA comes first
        assert!(code.find("eda").unwrap() < code.find("train").unwrap());
    }

    #[test]
    fn test_artifact_overwrite() {
        let mut record = WorkflowRecord::new("goal", None);
        record.set_artifact(ArtifactKind::EdaCode, "v1");
        record.set_artifact(ArtifactKind::EdaCode, "v2");
        assert_eq!(record.artifact(ArtifactKind::EdaCode), Some("v2"));
    }
}
