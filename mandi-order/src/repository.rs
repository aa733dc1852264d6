use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mandi_core::CoreResult;
use mandi_offer::VendorOffer;
use uuid::Uuid;

use crate::dispute::Dispute;
use crate::models::Order;
use crate::settlement::SettlementBatch;

/// Persistence contracts for the engine. `save` is expected to be ACID per
/// entity and to reject stale versions with `ConcurrencyConflict`.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> CoreResult<Option<Order>>;

    async fn save(&self, order: &Order) -> CoreResult<()>;

    async fn list_by_buyer(&self, buyer_id: &str) -> CoreResult<Vec<Order>>;
}

#[async_trait]
pub trait VendorOfferRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> CoreResult<Option<VendorOffer>>;

    async fn save(&self, offer: &VendorOffer) -> CoreResult<()>;

    async fn list_by_order(&self, order_id: Uuid) -> CoreResult<Vec<VendorOffer>>;

    /// COMPLETED offers for a vendor whose completion timestamp falls in
    /// `[from, to)`. The settlement sweep's candidate query.
    async fn list_completed_for_vendor(
        &self,
        vendor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<VendorOffer>>;
}

#[async_trait]
pub trait DisputeRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> CoreResult<Option<Dispute>>;

    async fn save(&self, dispute: &Dispute) -> CoreResult<()>;

    /// At most one non-terminal dispute exists per order.
    async fn find_open_by_order(&self, order_id: Uuid) -> CoreResult<Option<Dispute>>;

    async fn list_by_order(&self, order_id: Uuid) -> CoreResult<Vec<Dispute>>;
}

#[async_trait]
pub trait SettlementRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> CoreResult<Option<SettlementBatch>>;

    async fn save(&self, batch: &SettlementBatch) -> CoreResult<()>;

    async fn list_by_vendor(&self, vendor_id: Uuid) -> CoreResult<Vec<SettlementBatch>>;

    async fn find_by_vendor_period(
        &self,
        vendor_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> CoreResult<Vec<SettlementBatch>>;
}
