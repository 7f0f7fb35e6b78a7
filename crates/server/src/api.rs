//! JSON API for the approval workflow.
//!
//! Endpoints:
//! - `POST /api/v1/documents`               — submit a draft with its approval chain
//! - `GET  /api/v1/documents/{id}`          — fetch a document with steps and referrers
//! - `POST /api/v1/documents/{id}/actions`  — approve or reject the active step
//! - `POST /api/v1/documents/{id}/cancel`   — author withdraws the document
//!
//! The acting user is taken from the `x-actor-id` header; authentication is
//! handled upstream of this service.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use signoff_core::domain::document::{ActorId, Document, DocumentId, DocumentType};
use signoff_core::domain::referrer::Referrer;
use signoff_core::domain::step::ApprovalStep;
use signoff_core::errors::WorkflowError;
use signoff_core::workflow::{DraftDocument, StepAction, WorkflowEngine};
use signoff_db::{DbPool, SqlWorkflowStore};
use tracing::info;

use crate::notify::TracingNotifier;

pub type Engine = WorkflowEngine<SqlWorkflowStore, TracingNotifier>;

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<Engine>,
}

pub fn router(db_pool: DbPool) -> Router {
    let engine = WorkflowEngine::new(SqlWorkflowStore::new(db_pool), TracingNotifier);
    Router::new()
        .route("/api/v1/documents", post(submit_document))
        .route("/api/v1/documents/{id}", get(get_document))
        .route("/api/v1/documents/{id}/actions", post(apply_action))
        .route("/api/v1/documents/{id}/cancel", post(cancel_document))
        .with_state(ApiState { engine: Arc::new(engine) })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub document_type: String,
    pub content: serde_json::Value,
    pub approver_ids: Vec<String>,
    #[serde(default)]
    pub referrer_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub id: String,
    pub document_type: String,
    pub author_id: String,
    pub content: serde_json::Value,
    pub status: String,
    pub current_step: Option<u32>,
    pub version: u32,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct StepView {
    pub id: String,
    pub approver_id: String,
    pub sequence: u32,
    pub status: String,
    pub comment: Option<String>,
    pub processed_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChainResponse {
    pub document: DocumentView,
    pub steps: Vec<StepView>,
    pub referrer_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiErrorBody { error: self.message })).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(error: WorkflowError) -> Self {
        let status = match &error {
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
            WorkflowError::AlreadyFinalized(_) | WorkflowError::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            WorkflowError::CommentRequired | WorkflowError::InvalidChain => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            WorkflowError::NoActiveStep { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            WorkflowError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, error.to_string())
    }
}

fn actor_id(headers: &HeaderMap) -> Result<ActorId, ApiError> {
    headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| ActorId(value.to_string()))
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "x-actor-id header is required"))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn submit_document(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<ChainResponse>), ApiError> {
    let author = actor_id(&headers)?;
    let document_type = DocumentType::parse(&request.document_type).ok_or_else(|| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("unknown document_type `{}`", request.document_type),
        )
    })?;

    let draft = DraftDocument {
        document_type,
        author_id: author,
        content_json: request.content.to_string(),
    };
    let approvers = request.approver_ids.into_iter().map(ActorId).collect();
    let referrers = request.referrer_ids.into_iter().map(ActorId).collect();

    let submission = state.engine.submit(draft, approvers, referrers).await?;

    info!(
        event_name = "api.document.submitted",
        document_id = %submission.document.id,
        correlation_id = %submission.document.id,
        "document submitted"
    );

    Ok((
        StatusCode::CREATED,
        Json(chain_response(submission.document, submission.steps, submission.referrers)),
    ))
}

async fn get_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ChainResponse>, ApiError> {
    let chain = state.engine.load_chain(&DocumentId(id)).await?;
    Ok(Json(chain_response(chain.document, chain.steps, chain.referrers)))
}

async fn apply_action(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ChainResponse>, ApiError> {
    let actor = actor_id(&headers)?;
    let action = StepAction::parse(&request.action).ok_or_else(|| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("unknown action `{}` (expected approve|reject)", request.action),
        )
    })?;

    let document_id = DocumentId(id);
    let outcome =
        state.engine.process_action(&document_id, &actor, action, request.comment).await?;

    info!(
        event_name = "api.document.action_applied",
        document_id = %document_id,
        correlation_id = %document_id,
        actor = %actor,
        action = action.as_str(),
        status = outcome.document.status.as_str(),
        "action applied"
    );

    let chain = state.engine.load_chain(&document_id).await?;
    Ok(Json(chain_response(chain.document, chain.steps, chain.referrers)))
}

async fn cancel_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ChainResponse>, ApiError> {
    let actor = actor_id(&headers)?;
    let document_id = DocumentId(id);

    state.engine.cancel(&document_id, &actor).await?;

    info!(
        event_name = "api.document.cancelled",
        document_id = %document_id,
        correlation_id = %document_id,
        actor = %actor,
        "document cancelled"
    );

    let chain = state.engine.load_chain(&document_id).await?;
    Ok(Json(chain_response(chain.document, chain.steps, chain.referrers)))
}

fn chain_response(
    document: Document,
    steps: Vec<ApprovalStep>,
    referrers: Vec<Referrer>,
) -> ChainResponse {
    ChainResponse {
        document: document_view(document),
        steps: steps.into_iter().map(step_view).collect(),
        referrer_ids: referrers.into_iter().map(|referrer| referrer.referrer_id.0).collect(),
    }
}

fn document_view(document: Document) -> DocumentView {
    let content =
        serde_json::from_str(&document.content_json).unwrap_or(serde_json::Value::Null);
    DocumentView {
        id: document.id.0,
        document_type: document.document_type.as_str().to_string(),
        author_id: document.author_id.0,
        content,
        status: document.status.as_str().to_string(),
        current_step: document.current_step,
        version: document.version,
        completed_at: document.completed_at.map(|dt| dt.to_rfc3339()),
        created_at: document.created_at.to_rfc3339(),
        updated_at: document.updated_at.to_rfc3339(),
    }
}

fn step_view(step: ApprovalStep) -> StepView {
    StepView {
        id: step.id.0,
        approver_id: step.approver_id.0,
        sequence: step.sequence,
        status: step.status.as_str().to_string(),
        comment: step.comment,
        processed_at: step.processed_at.map(|dt| dt.to_rfc3339()),
    }
}
