use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use mandi_order::models::{Order, OrderDraft, OrderStatus, OrderTotals, OrderType, PaymentStatus};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub buyer_id: String,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub totals: OrderTotals,
    pub payment_status: PaymentStatus,
    pub settlement_batch_id: Option<Uuid>,
    pub refunded_paise: i64,
    pub cancellation_reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub confirmed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub activated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub cancelled_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price_paise: i64,
    pub line_total_paise: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            buyer_id: order.buyer_id,
            order_type: order.order_type,
            status: order.status,
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    id: item.id,
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price_paise: item.unit_price_paise,
                    line_total_paise: item.line_total_paise(),
                })
                .collect(),
            totals: order.totals,
            payment_status: order.payment_status,
            settlement_batch_id: order.settlement_batch_id,
            refunded_paise: order.refunded_paise,
            cancellation_reason: order.cancellation_reason,
            created_at: order.created_at,
            confirmed_at: order.confirmed_at,
            activated_at: order.activated_at,
            completed_at: order.completed_at,
            cancelled_at: order.cancelled_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/confirm", post(confirm_order))
        .route("/orders/{id}/activate", post(activate_order))
        .route("/orders/{id}/complete", post(complete_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/orders/{id}/payment", post(record_payment))
        .route("/buyers/{id}/orders", get(list_for_buyer))
}

async fn create_order(
    State(state): State<AppState>,
    Json(draft): Json<OrderDraft>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.orders.create_order(draft).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.get_order(id).await?;
    Ok(Json(order.into()))
}

async fn confirm_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.confirm(id).await?;
    Ok(Json(order.into()))
}

async fn activate_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.activate(id).await?;
    Ok(Json(order.into()))
}

async fn complete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.complete(id).await?;
    Ok(Json(order.into()))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.cancel(id, req.reason).await?;
    Ok(Json(order.into()))
}

async fn record_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.record_payment(id).await?;
    Ok(Json(order.into()))
}

async fn list_for_buyer(
    State(state): State<AppState>,
    Path(buyer_id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_for_buyer(&buyer_id).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}
