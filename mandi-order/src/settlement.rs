use chrono::{DateTime, Utc};
use mandi_core::clock::Clock;
use mandi_core::lock::KeyedLocks;
use mandi_core::notify::{emit, Notifier};
use mandi_core::{CoreError, CoreResult};
use mandi_shared::models::events::SettlementBatchCreatedEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::{DisputeRepository, OrderRepository, SettlementRepository, VendorOfferRepository};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementBatchStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

/// Percentage knobs applied at batch build time. Rates are percentages, not
/// fractions: 3.0 means 3%.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementRules {
    pub platform_fee_percent: f64,
    pub tds_percent: f64,
}

impl SettlementRules {
    pub fn platform_fee_for(&self, gross_paise: i64) -> i64 {
        percent_of(gross_paise, self.platform_fee_percent)
    }

    /// TDS is withheld on the post-fee amount.
    pub fn tds_for(&self, gross_paise: i64, platform_fee_paise: i64) -> i64 {
        percent_of(gross_paise - platform_fee_paise, self.tds_percent)
    }
}

fn percent_of(amount_paise: i64, percent: f64) -> i64 {
    ((amount_paise as f64) * percent / 100.0).round() as i64
}

/// An immutable, vendor+period-scoped grouping of completed orders. The
/// member set is fixed at creation; only the payment status moves afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementBatch {
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
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl SettlementBatch {
    fn invalid(&self, to: &str) -> CoreError {
        CoreError::InvalidTransition {
            from: format!("{:?}", self.status),
            to: to.to_string(),
        }
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != SettlementBatchStatus::Pending {
            return Err(self.invalid("PROCESSING"));
        }
        self.status = SettlementBatchStatus::Processing;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_paid(&mut self, payment_reference: String, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != SettlementBatchStatus::Processing {
            return Err(self.invalid("PAID"));
        }
        self.payment_reference = Some(payment_reference);
        self.status = SettlementBatchStatus::Paid;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != SettlementBatchStatus::Processing {
            return Err(self.invalid("FAILED"));
        }
        self.status = SettlementBatchStatus::Failed;
        self.updated_at = now;
        Ok(())
    }
}

/// Periodic sweep turning completed, undisputed orders into payable batches.
/// The caller schedules it; this type only does one build at a time per
/// vendor+period key.
pub struct SettlementBatcher {
    orders: Arc<dyn OrderRepository>,
    offers: Arc<dyn VendorOfferRepository>,
    disputes: Arc<dyn DisputeRepository>,
    batches: Arc<dyn SettlementRepository>,
    rules: SettlementRules,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    order_locks: Arc<KeyedLocks<Uuid>>,
    build_locks: KeyedLocks<(Uuid, DateTime<Utc>, DateTime<Utc>)>,
}

impl SettlementBatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        offers: Arc<dyn VendorOfferRepository>,
        disputes: Arc<dyn DisputeRepository>,
        batches: Arc<dyn SettlementRepository>,
        rules: SettlementRules,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        order_locks: Arc<KeyedLocks<Uuid>>,
    ) -> Self {
        Self {
            orders,
            offers,
            disputes,
            batches,
            rules,
            notifier,
            clock,
            order_locks,
            build_locks: KeyedLocks::new(),
        }
    }

    /// Builds at most one batch for the vendor and period. Returns `None`
    /// when nothing is eligible, including on a rebuild after a successful
    /// sweep. Orders whose per-order lock is held elsewhere (e.g. an
    /// in-flight dispute-open) are skipped, not waited on.
    pub async fn build_batch(
        &self,
        vendor_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        adjustments_paise: i64,
    ) -> CoreResult<Option<SettlementBatch>> {
        if period_start >= period_end {
            return Err(CoreError::ValidationFailed(
                "settlement period start must precede its end".to_string(),
            ));
        }

        let _build_guard = self
            .build_locks
            .acquire(&(vendor_id, period_start, period_end))
            .await;
        let now = self.clock.now();

        let candidates = self
            .offers
            .list_completed_for_vendor(vendor_id, period_start, period_end)
            .await?;

        let mut members = Vec::new();
        let mut guards = Vec::new();
        let mut skipped = 0u32;
        for offer in candidates {
            let Some(guard) = self.order_locks.try_acquire(&offer.order_id) else {
                skipped += 1;
                continue;
            };
            let Some(order) = self.orders.get(offer.order_id).await? else {
                continue;
            };
            let completed_in_period = order
                .completed_at
                .map(|at| at >= period_start && at < period_end)
                .unwrap_or(false);
            if order.status != crate::models::OrderStatus::Completed
                || order.settlement_batch_id.is_some()
                || !completed_in_period
            {
                continue;
            }
            if self.disputes.find_open_by_order(order.id).await?.is_some() {
                continue;
            }
            members.push(order);
            guards.push(guard);
        }

        if skipped > 0 {
            tracing::debug!(%vendor_id, skipped, "settlement sweep skipped contended orders");
        }
        if members.is_empty() {
            return Ok(None);
        }

        let gross_paise: i64 = members.iter().map(|o| o.vendor_payable_paise()).sum();
        let platform_fee_paise = self.rules.platform_fee_for(gross_paise);
        let tds_paise = self.rules.tds_for(gross_paise, platform_fee_paise);
        let net_paise = gross_paise - platform_fee_paise - tds_paise - adjustments_paise;

        let batch = SettlementBatch {
            id: Uuid::new_v4(),
            vendor_id,
            period_start,
            period_end,
            order_ids: members.iter().map(|o| o.id).collect(),
            gross_paise,
            platform_fee_paise,
            tds_paise,
            adjustments_paise,
            net_paise,
            status: SettlementBatchStatus::Pending,
            payment_reference: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        // Batch first, then member stamps, all while the per-order guards are
        // held: no reader can see a stamped order without its batch.
        self.batches.save(&batch).await?;
        for mut order in members {
            order.attach_settlement(batch.id, now)?;
            self.orders.save(&order).await?;
        }
        drop(guards);

        tracing::info!(
            batch_id = %batch.id,
            %vendor_id,
            orders = batch.order_ids.len(),
            net_paise = batch.net_paise,
            "settlement batch created"
        );
        emit(
            self.notifier.as_ref(),
            "settlement_batch_created",
            &SettlementBatchCreatedEvent {
                batch_id: batch.id,
                vendor_id,
                order_count: batch.order_ids.len() as u32,
                gross_paise,
                net_paise,
                timestamp: now.timestamp(),
            },
        )
        .await;

        Ok(Some(batch))
    }

    async fn fetch(&self, batch_id: Uuid) -> CoreResult<SettlementBatch> {
        self.batches
            .get(batch_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("settlement batch {}", batch_id)))
    }

    pub async fn mark_processing(&self, batch_id: Uuid) -> CoreResult<SettlementBatch> {
        let mut batch = self.fetch(batch_id).await?;
        batch.mark_processing(self.clock.now())?;
        self.batches.save(&batch).await?;
        Ok(batch)
    }

    pub async fn mark_paid(&self, batch_id: Uuid, payment_reference: String) -> CoreResult<SettlementBatch> {
        if payment_reference.trim().is_empty() {
            return Err(CoreError::ValidationFailed(
                "payment reference must not be empty".to_string(),
            ));
        }
        let mut batch = self.fetch(batch_id).await?;
        batch.mark_paid(payment_reference, self.clock.now())?;
        self.batches.save(&batch).await?;
        Ok(batch)
    }

    pub async fn mark_failed(&self, batch_id: Uuid) -> CoreResult<SettlementBatch> {
        let mut batch = self.fetch(batch_id).await?;
        batch.mark_failed(self.clock.now())?;
        self.batches.save(&batch).await?;
        Ok(batch)
    }

    pub async fn get(&self, batch_id: Uuid) -> CoreResult<SettlementBatch> {
        self.fetch(batch_id).await
    }

    pub async fn list_for_vendor(&self, vendor_id: Uuid) -> CoreResult<Vec<SettlementBatch>> {
        self.batches.list_by_vendor(vendor_id).await
    }

    pub async fn find_for_period(
        &self,
        vendor_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> CoreResult<Vec<SettlementBatch>> {
        self.batches
            .find_by_vendor_period(vendor_id, period_start, period_end)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispute::{ActorRole, DisputeOutcome, DisputePriority, DisputeReason};
    use crate::testkit;
    use chrono::Duration;

    #[tokio::test]
    async fn worked_example_amounts() {
        // Order of Rs 10,000; 3% platform fee, 1% TDS on the remainder.
        let engine = testkit::engine();
        let (order_id, vendor_id, _offer) = testkit::completed_order(&engine).await;

        let start = testkit::t0() - Duration::days(1);
        let end = testkit::t0() + Duration::days(1);
        let batch = engine
            .batcher
            .build_batch(vendor_id, start, end, 0)
            .await
            .unwrap()
            .expect("one eligible order");

        assert_eq!(batch.order_ids, vec![order_id]);
        assert_eq!(batch.gross_paise, 1_000_000);
        assert_eq!(batch.platform_fee_paise, 30_000);
        assert_eq!(batch.tds_paise, 9_700);
        assert_eq!(batch.net_paise, 930_300);
        assert_eq!(batch.status, SettlementBatchStatus::Pending);

        let order = engine.store.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.settlement_batch_id, Some(batch.id));
    }

    #[tokio::test]
    async fn rebuild_with_no_new_orders_is_a_no_op() {
        let engine = testkit::engine();
        let (_order_id, vendor_id, _offer) = testkit::completed_order(&engine).await;

        let start = testkit::t0() - Duration::days(1);
        let end = testkit::t0() + Duration::days(1);
        let first = engine.batcher.build_batch(vendor_id, start, end, 0).await.unwrap();
        assert!(first.is_some());

        let second = engine.batcher.build_batch(vendor_id, start, end, 0).await.unwrap();
        assert!(second.is_none(), "no new eligible orders, no new batch");
    }

    #[tokio::test]
    async fn membership_is_write_once_across_periods() {
        let engine = testkit::engine();
        let (order_id, vendor_id, _offer) = testkit::completed_order(&engine).await;

        let start = testkit::t0() - Duration::days(1);
        let end = testkit::t0() + Duration::days(1);
        engine.batcher.build_batch(vendor_id, start, end, 0).await.unwrap();

        // A wider, overlapping period sees the same order but must not
        // include it again.
        let wider = engine
            .batcher
            .build_batch(vendor_id, start - Duration::days(7), end + Duration::days(7), 0)
            .await
            .unwrap();
        assert!(wider.is_none());

        let order = engine.store.orders.get(order_id).await.unwrap().unwrap();
        let batches = engine.batcher.list_for_vendor(vendor_id).await.unwrap();
        let containing: Vec<_> = batches
            .iter()
            .filter(|b| b.order_ids.contains(&order_id))
            .collect();
        assert_eq!(containing.len(), 1);
        assert_eq!(order.settlement_batch_id, Some(containing[0].id));
    }

    #[tokio::test]
    async fn disputed_orders_are_excluded_until_resolved() {
        let engine = testkit::engine();
        let (order_id, vendor_id, _offer) = testkit::completed_order(&engine).await;

        let dispute = engine
            .disputes
            .open(order_id, DisputeReason::QualityIssue, DisputePriority::Medium, "buyer-7", ActorRole::Buyer, None)
            .await
            .unwrap();

        let start = testkit::t0() - Duration::days(1);
        let end = testkit::t0() + Duration::days(1);
        let while_open = engine.batcher.build_batch(vendor_id, start, end, 0).await.unwrap();
        assert!(while_open.is_none());

        engine.disputes.begin_review(dispute.id, "ops-1").await.unwrap();
        engine
            .disputes
            .resolve(dispute.id, DisputeOutcome::Rejected, None, "ops-1")
            .await
            .unwrap();

        let after = engine.batcher.build_batch(vendor_id, start, end, 0).await.unwrap();
        assert!(after.is_some(), "resolution unblocks settlement");
    }

    #[tokio::test]
    async fn partial_refund_reduces_the_batch_gross() {
        let engine = testkit::engine();
        let (order_id, vendor_id, _offer) = testkit::completed_order(&engine).await;

        let dispute = engine
            .disputes
            .open(order_id, DisputeReason::ShortQuantity, DisputePriority::Medium, "buyer-7", ActorRole::Buyer, None)
            .await
            .unwrap();
        engine.disputes.begin_review(dispute.id, "ops-1").await.unwrap();
        engine
            .disputes
            .resolve(
                dispute.id,
                DisputeOutcome::PartialRefund { amount_paise: 200_000 },
                None,
                "ops-1",
            )
            .await
            .unwrap();

        let start = testkit::t0() - Duration::days(1);
        let end = testkit::t0() + Duration::days(1);
        let batch = engine
            .batcher
            .build_batch(vendor_id, start, end, 0)
            .await
            .unwrap()
            .expect("order settles at the reduced amount");
        assert_eq!(batch.gross_paise, 800_000);
    }

    #[tokio::test]
    async fn empty_period_produces_no_batch() {
        let engine = testkit::engine();
        let (_order_id, vendor_id, _offer) = testkit::completed_order(&engine).await;

        // Period entirely before the completion timestamp.
        let start = testkit::t0() - Duration::days(30);
        let end = testkit::t0() - Duration::days(29);
        let batch = engine.batcher.build_batch(vendor_id, start, end, 0).await.unwrap();
        assert!(batch.is_none());
    }

    #[tokio::test]
    async fn batch_payment_lifecycle() {
        let engine = testkit::engine();
        let (_order_id, vendor_id, _offer) = testkit::completed_order(&engine).await;

        let start = testkit::t0() - Duration::days(1);
        let end = testkit::t0() + Duration::days(1);
        let batch = engine
            .batcher
            .build_batch(vendor_id, start, end, 0)
            .await
            .unwrap()
            .unwrap();

        let err = engine
            .batcher
            .mark_paid(batch.id, "UTR123".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));

        engine.batcher.mark_processing(batch.id).await.unwrap();
        let paid = engine.batcher.mark_paid(batch.id, "UTR123".to_string()).await.unwrap();
        assert_eq!(paid.status, SettlementBatchStatus::Paid);
        assert_eq!(paid.payment_reference.as_deref(), Some("UTR123"));
    }

    #[tokio::test]
    async fn contended_order_is_skipped_not_awaited() {
        let engine = testkit::engine();
        let (order_id, vendor_id, _offer) = testkit::completed_order(&engine).await;

        // Simulate an in-flight dispute-open holding the order's lock.
        let _held = engine.locks.acquire(&order_id).await;

        let start = testkit::t0() - Duration::days(1);
        let end = testkit::t0() + Duration::days(1);
        let batch = engine.batcher.build_batch(vendor_id, start, end, 0).await.unwrap();
        assert!(batch.is_none(), "locked order must be skipped this sweep");
    }
}
