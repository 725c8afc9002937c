//! HTTP routes for workflow control
//!
//! The surface mirrors the engine's operations: start a workflow,
//! inspect it, answer its gates. All state lives behind the shared
//! [`Engine`]; handlers never touch records directly except through it.

use super::error::ApiError;
use crate::workflow::{
    ArtifactKind, DatasetInfo, Decision, Engine, EngineError, GateKind, Stage, WorkflowRecord,
    WorkflowStatus,
};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower_http::cors::CorsLayer;

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowPayload {
    pub goal: String,

    /// Optional dataset URL; skips discovery when present
    pub dataset_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionPayload {
    pub decision: Decision,

    /// Free-text note, recorded on satisfaction retries
    pub feedback: Option<String>,

    /// Optimistic concurrency guard; omit to decide unconditionally
    pub expected_version: Option<u64>,
}

/// Compact listing entry
#[derive(Debug, Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub goal: String,
    pub status: WorkflowStatus,
    pub stage: Stage,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowRecord> for WorkflowSummary {
    fn from(record: &WorkflowRecord) -> Self {
        Self {
            id: record.id.clone(),
            goal: record.goal.clone(),
            status: record.status(),
            stage: record.stage,
            version: record.version,
            updated_at: record.updated_at,
        }
    }
}

/// Full workflow view returned by detail endpoints
#[derive(Debug, Serialize)]
pub struct WorkflowDetail {
    pub id: String,
    pub goal: String,
    pub status: WorkflowStatus,
    pub stage: Stage,
    pub dataset: Option<DatasetInfo>,
    pub rejected_urls: Vec<String>,
    pub schema_snapshot: Option<String>,
    pub artifacts: HashMap<ArtifactKind, String>,
    pub execution_attempts: u32,
    pub execution_logs: Option<String>,
    pub feedback_history: Vec<String>,
    pub last_error: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WorkflowRecord> for WorkflowDetail {
    fn from(record: WorkflowRecord) -> Self {
        Self {
            status: record.status(),
            id: record.id,
            goal: record.goal,
            stage: record.stage,
            dataset: record.dataset,
            rejected_urls: record.rejected_urls,
            schema_snapshot: record.schema_snapshot,
            artifacts: record.artifacts,
            execution_attempts: record.execution_attempts,
            execution_logs: record.execution_logs,
            feedback_history: record.feedback_history,
            last_error: record.last_error,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/workflows", get(list_workflows).post(create_workflow))
        .route("/workflows/reset", post(reset_workflows))
        .route("/workflows/{id}", get(get_workflow))
        .route("/workflows/{id}/decisions/{gate}", post(post_decision))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_workflow(
    State(engine): State<Engine>,
    Json(payload): Json<CreateWorkflowPayload>,
) -> Result<(StatusCode, Json<WorkflowDetail>), ApiError> {
    if payload.goal.trim().is_empty() {
        return Err(ApiError::BadRequest("goal must not be empty".into()));
    }

    let record = engine.start(payload.goal, payload.dataset_url);
    Ok((StatusCode::CREATED, Json(record.into())))
}

async fn list_workflows(State(engine): State<Engine>) -> Json<Vec<WorkflowSummary>> {
    let mut records = engine.store().list();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(records.iter().map(WorkflowSummary::from).collect())
}

async fn get_workflow(
    State(engine): State<Engine>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowDetail>, ApiError> {
    let record = engine.store().get(&id).map_err(EngineError::from)?;
    Ok(Json(record.into()))
}

async fn post_decision(
    State(engine): State<Engine>,
    Path((id, gate)): Path<(String, String)>,
    Json(payload): Json<DecisionPayload>,
) -> Result<Json<WorkflowDetail>, ApiError> {
    let gate: GateKind = gate.parse().map_err(|_| ApiError::UnknownGate(gate))?;

    let record = engine
        .decide(
            &id,
            gate,
            payload.decision,
            payload.feedback,
            payload.expected_version,
        )
        .await?;

    Ok(Json(record.into()))
}

async fn reset_workflows(State(engine): State<Engine>) -> Json<serde_json::Value> {
    let cleared = engine.store().len();
    engine.store().reset_all();
    tracing::info!(cleared, "all workflows reset");
    Json(serde_json::json!({ "cleared": cleared }))
}
