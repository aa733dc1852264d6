use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mandi_core::{CoreError, CoreResult};
use mandi_offer::{VendorOffer, VendorOfferStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dispute::Dispute;
use crate::models::Order;
use crate::repository::{DisputeRepository, OrderRepository, SettlementRepository, VendorOfferRepository};
use crate::settlement::SettlementBatch;

/// In-memory repositories with version-checked saves. Insert stores the
/// entity as given; an update requires the caller's version to match the
/// stored one and bumps it, so a stale save surfaces as
/// `ConcurrencyConflict` instead of a silent overwrite.
macro_rules! versioned_save {
    ($rows:expr, $entity:expr, $kind:literal) => {{
        let mut rows = $rows.write().await;
        match rows.get(&$entity.id) {
            Some(existing) if existing.version != $entity.version => {
                return Err(CoreError::ConcurrencyConflict(format!(
                    concat!($kind, " {} was modified concurrently"),
                    $entity.id
                )));
            }
            Some(_) => {
                let mut updated = $entity.clone();
                updated.version += 1;
                rows.insert(updated.id, updated);
            }
            None => {
                rows.insert($entity.id, $entity.clone());
            }
        }
        Ok(())
    }};
}

#[derive(Default)]
pub struct MemoryOrderRepository {
    rows: RwLock<HashMap<Uuid, Order>>,
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn get(&self, id: Uuid) -> CoreResult<Option<Order>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn save(&self, order: &Order) -> CoreResult<()> {
        versioned_save!(self.rows, order, "order")
    }

    async fn list_by_buyer(&self, buyer_id: &str) -> CoreResult<Vec<Order>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|o| o.buyer_id == buyer_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryVendorOfferRepository {
    rows: RwLock<HashMap<Uuid, VendorOffer>>,
}

#[async_trait]
impl VendorOfferRepository for MemoryVendorOfferRepository {
    async fn get(&self, id: Uuid) -> CoreResult<Option<VendorOffer>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn save(&self, offer: &VendorOffer) -> CoreResult<()> {
        versioned_save!(self.rows, offer, "vendor offer")
    }

    async fn list_by_order(&self, order_id: Uuid) -> CoreResult<Vec<VendorOffer>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|o| o.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_completed_for_vendor(
        &self,
        vendor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<VendorOffer>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|o| {
                o.vendor_id == vendor_id
                    && o.status == VendorOfferStatus::Completed
                    && o.completed_at.map(|at| at >= from && at < to).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryDisputeRepository {
    rows: RwLock<HashMap<Uuid, Dispute>>,
}

#[async_trait]
impl DisputeRepository for MemoryDisputeRepository {
    async fn get(&self, id: Uuid) -> CoreResult<Option<Dispute>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn save(&self, dispute: &Dispute) -> CoreResult<()> {
        versioned_save!(self.rows, dispute, "dispute")
    }

    async fn find_open_by_order(&self, order_id: Uuid) -> CoreResult<Option<Dispute>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|d| d.order_id == order_id && !d.status.is_terminal())
            .cloned())
    }

    async fn list_by_order(&self, order_id: Uuid) -> CoreResult<Vec<Dispute>> {
        let mut disputes: Vec<Dispute> = self
            .rows
            .read()
            .await
            .values()
            .filter(|d| d.order_id == order_id)
            .cloned()
            .collect();
        disputes.sort_by_key(|d| d.opened_at);
        Ok(disputes)
    }
}

#[derive(Default)]
pub struct MemorySettlementRepository {
    rows: RwLock<HashMap<Uuid, SettlementBatch>>,
}

#[async_trait]
impl SettlementRepository for MemorySettlementRepository {
    async fn get(&self, id: Uuid) -> CoreResult<Option<SettlementBatch>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn save(&self, batch: &SettlementBatch) -> CoreResult<()> {
        versioned_save!(self.rows, batch, "settlement batch")
    }

    async fn list_by_vendor(&self, vendor_id: Uuid) -> CoreResult<Vec<SettlementBatch>> {
        let mut batches: Vec<SettlementBatch> = self
            .rows
            .read()
            .await
            .values()
            .filter(|b| b.vendor_id == vendor_id)
            .cloned()
            .collect();
        batches.sort_by_key(|b| b.created_at);
        Ok(batches)
    }

    async fn find_by_vendor_period(
        &self,
        vendor_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> CoreResult<Vec<SettlementBatch>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|b| {
                b.vendor_id == vendor_id && b.period_start == period_start && b.period_end == period_end
            })
            .cloned()
            .collect())
    }
}

/// The full set of repositories, ready to wire into the engine services.
#[derive(Clone)]
pub struct MemoryStore {
    pub orders: Arc<MemoryOrderRepository>,
    pub offers: Arc<MemoryVendorOfferRepository>,
    pub disputes: Arc<MemoryDisputeRepository>,
    pub batches: Arc<MemorySettlementRepository>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(MemoryOrderRepository::default()),
            offers: Arc::new(MemoryVendorOfferRepository::default()),
            disputes: Arc::new(MemoryDisputeRepository::default()),
            batches: Arc::new(MemorySettlementRepository::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Order, OrderType};
    use chrono::TimeZone;

    #[tokio::test]
    async fn stale_save_is_a_concurrency_conflict() {
        let repo = MemoryOrderRepository::default();
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap();
        let order = Order::new("buyer-1".to_string(), OrderType::Material, now);
        repo.save(&order).await.unwrap();

        // First writer wins and bumps the version.
        let fresh = repo.get(order.id).await.unwrap().unwrap();
        repo.save(&fresh).await.unwrap();

        // Second writer still holds the stale copy.
        let err = repo.save(&fresh).await.unwrap_err();
        assert!(matches!(err, CoreError::ConcurrencyConflict(_)));
    }
}
