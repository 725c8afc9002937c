//! Workflow engine: stage execution and gate decisions
//!
//! The engine is the only writer that moves a record between stages.
//! `advance` runs working stages until the record parks at a gate or a
//! terminal stage; `decide` applies a human decision at a gate and
//! resumes the pipeline in the background. Each workflow advances on
//! exactly one task at a time, so working stages never race each other;
//! gate decisions are serialized through the store's version check.

use super::heal::{HealError, HealLoop, HealSettings};
use super::record::{ArtifactKind, DatasetInfo, WorkflowRecord};
use super::stage::{Decision, GateKind, InvalidTransition, Stage, StageEvent, WorkflowStatus, next};
use super::store::{StoreError, WorkflowStore};
use crate::collaborators::{CollaboratorError, Collaborators, GenerationKind};
use crate::config::Defaults;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Engine tuning, normally derived from [`Defaults`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_heal_attempts: u32,
    pub heal_delay: Duration,
    pub collaborator_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_heal_attempts: 3,
            heal_delay: Duration::from_secs(5),
            collaborator_timeout: Duration::from_secs(180),
        }
    }
}

impl EngineSettings {
    pub fn from_defaults(defaults: &Defaults) -> Self {
        Self {
            max_heal_attempts: defaults.max_heal_attempts,
            heal_delay: Duration::from_secs(defaults.heal_delay_secs),
            collaborator_timeout: Duration::from_secs(defaults.collaborator_timeout),
        }
    }
}

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow '{id}' not found")]
    NotFound { id: String },

    #[error("version conflict on '{id}': expected {expected}, found {found}")]
    VersionConflict {
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("workflow '{id}' is not awaiting a {gate} decision (status: {status})")]
    InvalidGateState {
        id: String,
        gate: GateKind,
        status: WorkflowStatus,
    },

    #[error("{stage:?} stage failed: {source}")]
    Collaborator {
        stage: Stage,
        #[source]
        source: CollaboratorError,
    },

    #[error("execution retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("no usable dataset for goal '{goal}'")]
    NoDataset { goal: String },

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => EngineError::NotFound { id },
            StoreError::VersionConflict {
                id,
                expected,
                found,
            } => EngineError::VersionConflict {
                id,
                expected,
                found,
            },
        }
    }
}

impl From<HealError> for EngineError {
    fn from(err: HealError) -> Self {
        match err {
            HealError::RetriesExhausted {
                attempts,
                last_error,
            } => EngineError::RetriesExhausted {
                attempts,
                last_error,
            },
            HealError::Store(e) => e.into(),
        }
    }
}

impl EngineError {
    /// True for errors that fail the workflow itself rather than the
    /// caller's request
    fn fails_workflow(&self) -> bool {
        matches!(
            self,
            EngineError::Collaborator { .. }
                | EngineError::RetriesExhausted { .. }
                | EngineError::NoDataset { .. }
        )
    }
}

/// What a working stage produced, to be folded into the record
enum StageOutput {
    Research {
        dataset: Option<DatasetInfo>,
        plan: String,
    },
    DatasetValidated,
    DataEngineering {
        eda_code: String,
        schema: String,
    },
    MlEngineering {
        training_code: String,
    },
    Executed,
}

struct EngineInner {
    store: Arc<WorkflowStore>,
    collaborators: Collaborators,
    settings: EngineSettings,
}

/// The workflow engine; cheap to clone, shared across request handlers
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(
        store: Arc<WorkflowStore>,
        collaborators: Collaborators,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                collaborators,
                settings,
            }),
        }
    }

    pub fn store(&self) -> &WorkflowStore {
        &self.inner.store
    }

    /// Create a workflow and kick off its pipeline in the background
    pub fn start(&self, goal: impl Into<String>, dataset_url: Option<String>) -> WorkflowRecord {
        let record = self.inner.store.create(goal, dataset_url);
        tracing::info!(workflow = %record.id, goal = %record.goal, "workflow started");
        self.spawn_advance(record.id.clone());
        record
    }

    /// Run the pipeline on a background task; errors are logged, not
    /// returned (the workflow record carries the failure)
    pub fn spawn_advance(&self, id: String) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.advance(&id).await {
                match e {
                    // The record disappeared or another actor won a
                    // race; nothing left for this task to do
                    EngineError::NotFound { .. } | EngineError::VersionConflict { .. } => {
                        tracing::debug!(workflow = %id, error = %e, "background advance aborted");
                    }
                    _ => {
                        tracing::warn!(workflow = %id, error = %e, "workflow failed");
                    }
                }
            }
        });
    }

    /// Run working stages until the record parks at a gate or terminal
    ///
    /// Returns the parked snapshot. Stage failures move the record to
    /// `Failed` before the error is returned.
    pub async fn advance(&self, id: &str) -> Result<WorkflowRecord, EngineError> {
        loop {
            let snapshot = self.inner.store.get(id)?;
            if snapshot.stage.is_terminal() || snapshot.stage.gate().is_some() {
                return Ok(snapshot);
            }

            tracing::info!(workflow = id, stage = ?snapshot.stage, "running stage");

            match self.run_stage(&snapshot).await {
                Ok(output) => {
                    self.apply_output(&snapshot, output)?;
                }
                Err(e) if e.fails_workflow() => {
                    let failed_stage = next(snapshot.stage, StageEvent::Failed)?;
                    let message = e.to_string();
                    self.inner.store.mutate(id, None, |r| {
                        r.stage = failed_stage;
                        r.last_error = Some(message.clone());
                    })?;
                    tracing::warn!(workflow = id, stage = ?snapshot.stage, error = %e, "stage failed");
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply a human decision at a gate
    ///
    /// `expected_version` guards against deciding on a stale snapshot.
    /// Replaying the decision already applied at this gate is a no-op
    /// that returns the current record, so retried requests are safe.
    pub async fn decide(
        &self,
        id: &str,
        gate: GateKind,
        decision: Decision,
        feedback: Option<String>,
        expected_version: Option<u64>,
    ) -> Result<WorkflowRecord, EngineError> {
        let (record, applied) = self
            .apply_decision(id, gate, decision, feedback, expected_version)
            .await?;

        // A replayed no-op must not resume: the original decision's
        // pipeline task may still be running this stage
        if applied && !record.stage.is_terminal() && record.stage.gate().is_none() {
            self.spawn_advance(record.id.clone());
        }

        Ok(record)
    }

    /// Decision application without the background resume; `decide` is
    /// the public entry point
    ///
    /// The flag is false when the decision was a replayed no-op and no
    /// transition took place.
    async fn apply_decision(
        &self,
        id: &str,
        gate: GateKind,
        decision: Decision,
        feedback: Option<String>,
        expected_version: Option<u64>,
    ) -> Result<(WorkflowRecord, bool), EngineError> {
        let snapshot = self.inner.store.get(id)?;

        // Version check comes first: a stale caller learns it lost the
        // race even when the gate state happens to look right
        if let Some(expected) = expected_version {
            if snapshot.version != expected {
                return Err(EngineError::VersionConflict {
                    id: id.into(),
                    expected,
                    found: snapshot.version,
                });
            }
        }

        match snapshot.stage.gate() {
            Some(current) if current == gate => {}
            _ => {
                // Idempotent replay: the same decision was already
                // applied at this gate and the workflow moved on
                if snapshot.last_decision == Some((gate, decision)) {
                    tracing::debug!(workflow = id, gate = %gate, "replayed decision, no-op");
                    return Ok((snapshot, false));
                }
                return Err(EngineError::InvalidGateState {
                    id: id.into(),
                    gate,
                    status: snapshot.status(),
                });
            }
        }

        let event = gate
            .event_for(decision)
            .ok_or_else(|| EngineError::InvalidGateState {
                id: id.into(),
                gate,
                status: snapshot.status(),
            })?;
        let next_stage = next(snapshot.stage, event)?;

        let record = self
            .inner
            .store
            .mutate(id, Some(snapshot.version), |r| {
                r.stage = next_stage;
                r.last_decision = Some((gate, decision));

                match (gate, decision) {
                    (GateKind::Dataset, Decision::Reject) => {
                        // Remember the rejection so re-research skips it
                        if let Some(dataset) = r.dataset.take() {
                            r.rejected_urls.push(dataset.url);
                        }
                    }
                    (GateKind::Satisfaction, Decision::Retry) => {
                        let note = feedback
                            .clone()
                            .filter(|f| !f.trim().is_empty())
                            .unwrap_or_else(|| "results not satisfactory".into());
                        r.feedback_history.push(note);
                    }
                    _ => {}
                }
            })?;

        tracing::info!(
            workflow = id,
            gate = %gate,
            decision = ?decision,
            stage = ?record.stage,
            "decision applied"
        );
        Ok((record, true))
    }

    async fn run_stage(&self, record: &WorkflowRecord) -> Result<StageOutput, EngineError> {
        match record.stage {
            Stage::Research => self.run_research(record).await,
            Stage::DatasetValidation => self.run_dataset_validation(record),
            Stage::DataEngineering => self.run_data_engineering(record).await,
            Stage::MlEngineering => self.run_ml_engineering(record).await,
            Stage::Execution => self.run_execution(record).await,
            // Gates and terminals are filtered out by `advance`
            stage => Err(InvalidTransition {
                stage,
                event: StageEvent::Completed,
            }
            .into()),
        }
    }

    /// Fold a stage's output into the record and move to the next stage
    fn apply_output(
        &self,
        snapshot: &WorkflowRecord,
        output: StageOutput,
    ) -> Result<WorkflowRecord, EngineError> {
        let next_stage = next(snapshot.stage, StageEvent::Completed)?;

        // Execution mutates the record while running (attempt counts,
        // logs), so the pre-stage snapshot version is already stale
        let expected = match output {
            StageOutput::Executed => None,
            _ => Some(snapshot.version),
        };

        let record = self.inner.store.mutate(&snapshot.id, expected, |r| {
            match &output {
                StageOutput::Research { dataset, plan } => {
                    r.dataset = dataset.clone();
                    r.set_artifact(ArtifactKind::ResearchPlan, plan.clone());
                }
                StageOutput::DatasetValidated => {}
                StageOutput::DataEngineering { eda_code, schema } => {
                    r.set_artifact(ArtifactKind::EdaCode, eda_code.clone());
                    r.schema_snapshot = Some(schema.clone());
                }
                StageOutput::MlEngineering { training_code } => {
                    r.set_artifact(ArtifactKind::TrainingCode, training_code.clone());
                }
                StageOutput::Executed => {}
            }
            r.stage = next_stage;
        })?;

        Ok(record)
    }

    async fn run_research(&self, record: &WorkflowRecord) -> Result<StageOutput, EngineError> {
        let timeout = self.inner.settings.collaborator_timeout;

        // A user-supplied URL that has not been rejected short-circuits
        // discovery
        let dataset = match &record.dataset {
            Some(d) if !record.rejected_urls.contains(&d.url) => Some(d.clone()),
            _ => {
                let candidates = self
                    .inner
                    .collaborators
                    .discovery
                    .search(&record.goal, timeout)
                    .await
                    .map_err(|e| EngineError::Collaborator {
                        stage: Stage::Research,
                        source: e,
                    })?;

                candidates
                    .into_iter()
                    .find(|c| !record.rejected_urls.contains(&c.url))
                    .map(|c| DatasetInfo {
                        url: c.url,
                        title: c.title,
                        summary: c.summary,
                        provided_by_user: false,
                    })
            }
        };

        let context = research_context(record, dataset.as_ref());
        let plan = self
            .inner
            .collaborators
            .generator
            .generate(GenerationKind::ResearchPlan, &context, timeout)
            .await
            .map_err(|e| EngineError::Collaborator {
                stage: Stage::Research,
                source: e,
            })?;

        Ok(StageOutput::Research { dataset, plan })
    }

    /// Local sanity check on the dataset reference; no collaborator
    /// involved
    fn run_dataset_validation(&self, record: &WorkflowRecord) -> Result<StageOutput, EngineError> {
        match &record.dataset {
            Some(d) if !d.url.trim().is_empty() && !record.rejected_urls.contains(&d.url) => {
                Ok(StageOutput::DatasetValidated)
            }
            _ => Err(EngineError::NoDataset {
                goal: record.goal.clone(),
            }),
        }
    }

    async fn run_data_engineering(
        &self,
        record: &WorkflowRecord,
    ) -> Result<StageOutput, EngineError> {
        let timeout = self.inner.settings.collaborator_timeout;
        let context = engineering_context(record);

        let eda_code = self
            .inner
            .collaborators
            .generator
            .generate(GenerationKind::EdaCode, &context, timeout)
            .await
            .map_err(|e| EngineError::Collaborator {
                stage: Stage::DataEngineering,
                source: e,
            })?;

        let schema = self
            .inner
            .collaborators
            .generator
            .generate(GenerationKind::SchemaSummary, &context, timeout)
            .await
            .map_err(|e| EngineError::Collaborator {
                stage: Stage::DataEngineering,
                source: e,
            })?;

        Ok(StageOutput::DataEngineering { eda_code, schema })
    }

    async fn run_ml_engineering(&self, record: &WorkflowRecord) -> Result<StageOutput, EngineError> {
        let timeout = self.inner.settings.collaborator_timeout;
        let context = engineering_context(record);

        let training_code = self
            .inner
            .collaborators
            .generator
            .generate(GenerationKind::TrainingCode, &context, timeout)
            .await
            .map_err(|e| EngineError::Collaborator {
                stage: Stage::MlEngineering,
                source: e,
            })?;

        Ok(StageOutput::MlEngineering { training_code })
    }

    async fn run_execution(&self, record: &WorkflowRecord) -> Result<StageOutput, EngineError> {
        // Missing code here means a transition-table bug, not a
        // collaborator problem; still fails the workflow
        let code = record
            .combined_code()
            .ok_or_else(|| EngineError::Collaborator {
                stage: Stage::Execution,
                source: CollaboratorError::invalid_request("no generated code to execute"),
            })?;

        // Fresh entry into the stage resets the retry budget
        self.inner.store.mutate(&record.id, Some(record.version), |r| {
            r.execution_attempts = 0;
            r.last_error = None;
        })?;

        let heal = HealLoop::new(
            Arc::clone(&self.inner.collaborators.sandbox),
            Arc::clone(&self.inner.collaborators.generator),
            Arc::clone(&self.inner.store),
            HealSettings {
                max_attempts: self.inner.settings.max_heal_attempts,
                min_delay: self.inner.settings.heal_delay,
                call_timeout: self.inner.settings.collaborator_timeout,
            },
        );

        let report = heal.run(&record.id, &code).await?;
        tracing::info!(
            workflow = %record.id,
            attempts = report.attempts,
            log_bytes = report.logs.len(),
            "execution complete"
        );
        Ok(StageOutput::Executed)
    }
}

fn research_context(record: &WorkflowRecord, dataset: Option<&DatasetInfo>) -> String {
    let mut context = format!("Goal: {}\n", record.goal);
    if let Some(d) = dataset {
        context.push_str(&format!("Dataset: {} ({})\n", d.url, d.title));
    }
    if !record.rejected_urls.is_empty() {
        context.push_str(&format!(
            "Previously rejected datasets: {}\n",
            record.rejected_urls.join(", ")
        ));
    }
    context
}

fn engineering_context(record: &WorkflowRecord) -> String {
    let mut context = format!("Goal: {}\n", record.goal);
    if let Some(d) = &record.dataset {
        context.push_str(&format!("Dataset: {}\n", d.url));
    }
    if let Some(plan) = record.artifact(ArtifactKind::ResearchPlan) {
        context.push_str(&format!("Plan:\n{}\n", plan));
    }
    if let Some(schema) = &record.schema_snapshot {
        context.push_str(&format!("Schema:\n{}\n", schema));
    }
    if !record.feedback_history.is_empty() {
        context.push_str(&format!(
            "User feedback from earlier iterations:\n{}\n",
            record.feedback_history.join("\n")
        ));
    }
    context
}
