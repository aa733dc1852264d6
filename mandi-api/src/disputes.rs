use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use mandi_order::dispute::{
    ActorRole, Dispute, DisputeOutcome, DisputePriority, DisputeReason, DisputeStatus, Evidence,
    EvidenceKind, TimelineEntry,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DisputeResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub reason: DisputeReason,
    pub status: DisputeStatus,
    pub priority: DisputePriority,
    pub disputed_paise: i64,
    pub refund_paise: Option<i64>,
    pub evidence: Vec<Evidence>,
    pub timeline: Vec<TimelineEntry>,
    pub resolution_note: Option<String>,
    pub assigned_to: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<Dispute> for DisputeResponse {
    fn from(dispute: Dispute) -> Self {
        Self {
            id: dispute.id,
            order_id: dispute.order_id,
            reason: dispute.reason,
            status: dispute.status,
            priority: dispute.priority,
            disputed_paise: dispute.disputed_paise,
            refund_paise: dispute.refund_paise,
            evidence: dispute.evidence,
            timeline: dispute.timeline,
            resolution_note: dispute.resolution_note,
            assigned_to: dispute.assigned_to,
            opened_at: dispute.opened_at,
            resolved_at: dispute.resolved_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenDisputeRequest {
    pub reason: DisputeReason,
    pub priority: Option<DisputePriority>,
    pub opened_by: String,
    pub role: ActorRole,
    pub disputed_paise: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub assignee: String,
}

#[derive(Debug, Deserialize)]
pub struct EscalateRequest {
    pub actor: String,
    pub role: ActorRole,
}

#[derive(Debug, Deserialize)]
pub struct AddEvidenceRequest {
    pub kind: EvidenceKind,
    pub role: ActorRole,
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub outcome: DisputeOutcome,
    pub note: Option<String>,
    pub actor: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}/disputes", post(open_dispute).get(list_disputes))
        .route("/disputes/{id}", get(get_dispute))
        .route("/disputes/{id}/review", post(begin_review))
        .route("/disputes/{id}/escalate", post(escalate))
        .route("/disputes/{id}/evidence", post(add_evidence))
        .route("/disputes/{id}/resolve", post(resolve))
}

async fn open_dispute(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<OpenDisputeRequest>,
) -> Result<(StatusCode, Json<DisputeResponse>), ApiError> {
    let dispute = state
        .disputes
        .open(
            order_id,
            req.reason,
            req.priority.unwrap_or(DisputePriority::Medium),
            &req.opened_by,
            req.role,
            req.disputed_paise,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(dispute.into())))
}

async fn list_disputes(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<DisputeResponse>>, ApiError> {
    let disputes = state.disputes.history_for_order(order_id).await?;
    Ok(Json(disputes.into_iter().map(Into::into).collect()))
}

async fn get_dispute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DisputeResponse>, ApiError> {
    let dispute = state.disputes.get(id).await?;
    Ok(Json(dispute.into()))
}

async fn begin_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<DisputeResponse>, ApiError> {
    let dispute = state.disputes.begin_review(id, &req.assignee).await?;
    Ok(Json(dispute.into()))
}

async fn escalate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EscalateRequest>,
) -> Result<Json<DisputeResponse>, ApiError> {
    let dispute = state.disputes.escalate(id, &req.actor, req.role).await?;
    Ok(Json(dispute.into()))
}

async fn add_evidence(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddEvidenceRequest>,
) -> Result<Json<DisputeResponse>, ApiError> {
    let dispute = state
        .disputes
        .add_evidence(id, req.kind, req.role, req.reference)
        .await?;
    Ok(Json(dispute.into()))
}

async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<DisputeResponse>, ApiError> {
    let dispute = state
        .disputes
        .resolve(id, req.outcome, req.note, &req.actor)
        .await?;
    Ok(Json(dispute.into()))
}
