use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use mandi_order::settlement::{SettlementBatch, SettlementBatchStatus};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub order_ids: Vec<Uuid>,
    pub gross_paise: i64,
    pub platform_fee_paise: i64,
    pub tds_paise: i64,
    pub adjustments_paise: i64,
    pub net_paise: i64,
    pub status: SettlementBatchStatus,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<SettlementBatch> for BatchResponse {
    fn from(batch: SettlementBatch) -> Self {
        Self {
            id: batch.id,
            vendor_id: batch.vendor_id,
            period_start: batch.period_start,
            period_end: batch.period_end,
            order_ids: batch.order_ids,
            gross_paise: batch.gross_paise,
            platform_fee_paise: batch.platform_fee_paise,
            tds_paise: batch.tds_paise,
            adjustments_paise: batch.adjustments_paise,
            net_paise: batch.net_paise,
            status: batch.status,
            payment_reference: batch.payment_reference,
            created_at: batch.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BuildBatchRequest {
    pub vendor_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub adjustments_paise: Option<i64>,
}

/// `batch` is null when the period held nothing eligible; that is a normal
/// sweep outcome, not an error.
#[derive(Debug, Serialize)]
pub struct BuildBatchResponse {
    pub batch: Option<BatchResponse>,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct MarkPaidRequest {
    pub payment_reference: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/settlements", post(build_batch))
        .route("/settlements/{id}", get(get_batch))
        .route("/settlements/{id}/processing", post(mark_processing))
        .route("/settlements/{id}/paid", post(mark_paid))
        .route("/settlements/{id}/failed", post(mark_failed))
        .route("/vendors/{id}/settlements", get(list_for_vendor))
}

async fn build_batch(
    State(state): State<AppState>,
    Json(req): Json<BuildBatchRequest>,
) -> Result<Json<BuildBatchResponse>, ApiError> {
    let batch = state
        .settlements
        .build_batch(
            req.vendor_id,
            req.period_start,
            req.period_end,
            req.adjustments_paise.unwrap_or(0),
        )
        .await?;
    Ok(Json(BuildBatchResponse {
        batch: batch.map(Into::into),
    }))
}

async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchResponse>, ApiError> {
    let batch = state.settlements.get(id).await?;
    Ok(Json(batch.into()))
}

async fn mark_processing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchResponse>, ApiError> {
    let batch = state.settlements.mark_processing(id).await?;
    Ok(Json(batch.into()))
}

async fn mark_paid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<MarkPaidRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    let batch = state.settlements.mark_paid(id, req.payment_reference).await?;
    Ok(Json(batch.into()))
}

async fn mark_failed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchResponse>, ApiError> {
    let batch = state.settlements.mark_failed(id).await?;
    Ok(Json(batch.into()))
}

async fn list_for_vendor(
    State(state): State<AppState>,
    Path(vendor_id): Path<Uuid>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<BatchResponse>>, ApiError> {
    let batches = match (query.period_start, query.period_end) {
        (Some(start), Some(end)) => state.settlements.find_for_period(vendor_id, start, end).await?,
        _ => state.settlements.list_for_vendor(vendor_id).await?,
    };
    Ok(Json(batches.into_iter().map(Into::into).collect()))
}
