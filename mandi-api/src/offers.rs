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
use mandi_offer::{VendorOffer, VendorOfferStatus, VerificationMethod};

// ============================================================================
// Request/Response Types
// ============================================================================

/// The issued delivery OTP is deliberately absent: it reaches the buyer
/// through the notifier, never through the read API.
#[derive(Debug, Serialize)]
pub struct OfferResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub status: VendorOfferStatus,
    pub expires_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
    pub verification_method: Option<VerificationMethod>,
    pub delivery_evidence: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<VendorOffer> for OfferResponse {
    fn from(offer: VendorOffer) -> Self {
        Self {
            id: offer.id,
            order_id: offer.order_id,
            vendor_id: offer.vendor_id,
            status: offer.status,
            expires_at: offer.expires_at,
            rejection_reason: offer.rejection_reason,
            verification_method: offer.verification_method,
            delivery_evidence: offer.delivery_evidence,
            accepted_at: offer.accepted_at,
            ready_at: offer.ready_at,
            delivered_at: offer.delivered_at,
            completed_at: offer.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub vendor_ids: Vec<Uuid>,
    /// Defaults to the configured offer window when omitted.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RejectOfferRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryRequest {
    Otp { code: String },
    Photo { evidence_ref: String },
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}/offers", post(broadcast_offers).get(list_offers))
        .route("/offers/{id}", get(get_offer))
        .route("/offers/{id}/accept", post(accept_offer))
        .route("/offers/{id}/reject", post(reject_offer))
        .route("/offers/{id}/progress", post(start_progress))
        .route("/offers/{id}/ready", post(mark_ready))
        .route("/offers/{id}/delivery", post(confirm_delivery))
        .route("/offers/{id}/receipt", post(confirm_receipt))
}

async fn broadcast_offers(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<BroadcastRequest>,
) -> Result<(StatusCode, Json<Vec<OfferResponse>>), ApiError> {
    let expires_at = req.expires_at.unwrap_or_else(|| Utc::now() + state.offer_window);
    let offers = state.board.broadcast(order_id, req.vendor_ids, expires_at).await?;
    Ok((
        StatusCode::CREATED,
        Json(offers.into_iter().map(Into::into).collect()),
    ))
}

async fn list_offers(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<OfferResponse>>, ApiError> {
    let offers = state.board.offers_for_order(order_id).await?;
    Ok(Json(offers.into_iter().map(Into::into).collect()))
}

async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer = state.board.get_offer(id).await?;
    Ok(Json(offer.into()))
}

async fn accept_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer = state.board.accept(id).await?;
    Ok(Json(offer.into()))
}

async fn reject_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectOfferRequest>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer = state.board.reject(id, req.reason).await?;
    Ok(Json(offer.into()))
}

async fn start_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer = state.board.start_progress(id).await?;
    Ok(Json(offer.into()))
}

async fn mark_ready(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer = state.board.mark_ready(id).await?;
    Ok(Json(offer.into()))
}

async fn confirm_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DeliveryRequest>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer = match req {
        DeliveryRequest::Otp { code } => state.delivery.confirm_with_otp(id, &code).await?,
        DeliveryRequest::Photo { evidence_ref } => {
            state.delivery.confirm_with_photo(id, evidence_ref).await?
        }
    };
    Ok(Json(offer.into()))
}

async fn confirm_receipt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer = state.delivery.confirm_receipt(id).await?;
    Ok(Json(offer.into()))
}
