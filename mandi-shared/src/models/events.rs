use uuid::Uuid;

use crate::pii::Masked;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderConfirmedEvent {
    pub order_id: Uuid,
    pub buyer_id: String,
    pub total_paise: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderCancelledEvent {
    pub order_id: Uuid,
    pub buyer_id: String,
    pub reason: String,
    pub refund_eligible: bool,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderCompletedEvent {
    pub order_id: Uuid,
    pub buyer_id: String,
    pub total_paise: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OfferBroadcastEvent {
    pub order_id: Uuid,
    pub vendor_ids: Vec<Uuid>,
    pub expires_at: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OfferAcceptedEvent {
    pub offer_id: Uuid,
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub withdrawn_sibling_ids: Vec<Uuid>,
    pub timestamp: i64,
}

/// Carries the one-time code shown to the buyer at handover. The code is
/// masked in Debug output; the wire payload keeps the real value.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct DeliveryOtpIssuedEvent {
    pub offer_id: Uuid,
    pub order_id: Uuid,
    pub buyer_id: String,
    pub otp: Masked<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct DeliveryRecordedEvent {
    pub offer_id: Uuid,
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub method: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct DisputeOpenedEvent {
    pub dispute_id: Uuid,
    pub order_id: Uuid,
    pub reason: String,
    pub priority: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct DisputeResolvedEvent {
    pub dispute_id: Uuid,
    pub order_id: Uuid,
    pub outcome: String,
    pub refund_paise: Option<i64>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SettlementBatchCreatedEvent {
    pub batch_id: Uuid,
    pub vendor_id: Uuid,
    pub order_count: u32,
    pub gross_paise: i64,
    pub net_paise: i64,
    pub timestamp: i64,
}
