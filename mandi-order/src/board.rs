use chrono::{DateTime, Utc};
use mandi_core::clock::Clock;
use mandi_core::lock::KeyedLocks;
use mandi_core::notify::{emit, Notifier};
use mandi_core::{CoreError, CoreResult};
use mandi_offer::{VendorOffer, VendorOfferStatus};
use mandi_shared::models::events::{DeliveryOtpIssuedEvent, OfferAcceptedEvent, OfferBroadcastEvent};
use mandi_shared::pii::Masked;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Order, OrderStatus};
use crate::repository::{OrderRepository, VendorOfferRepository};

/// Vendor-side sub-lifecycle, layered on the order machine. Offers for one
/// order share the order's critical section, which is what makes
/// first-acceptance-wins deterministic.
pub struct VendorOfferBoard {
    offers: Arc<dyn VendorOfferRepository>,
    orders: Arc<dyn OrderRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks<Uuid>>,
}

impl VendorOfferBoard {
    pub fn new(
        offers: Arc<dyn VendorOfferRepository>,
        orders: Arc<dyn OrderRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        locks: Arc<KeyedLocks<Uuid>>,
    ) -> Self {
        Self {
            offers,
            orders,
            notifier,
            clock,
            locks,
        }
    }

    async fn fetch_offer(&self, offer_id: Uuid) -> CoreResult<VendorOffer> {
        self.offers
            .get(offer_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("vendor offer {}", offer_id)))
    }

    async fn fetch_order(&self, order_id: Uuid) -> CoreResult<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))
    }

    /// Fans an order out to vendors, one OFFERED entry each.
    pub async fn broadcast(
        &self,
        order_id: Uuid,
        vendor_ids: Vec<Uuid>,
        expires_at: DateTime<Utc>,
    ) -> CoreResult<Vec<VendorOffer>> {
        if vendor_ids.is_empty() {
            return Err(CoreError::ValidationFailed(
                "broadcast needs at least one vendor".to_string(),
            ));
        }
        let unique: HashSet<&Uuid> = vendor_ids.iter().collect();
        if unique.len() != vendor_ids.len() {
            return Err(CoreError::ValidationFailed(
                "broadcast vendor list contains duplicates".to_string(),
            ));
        }

        let _guard = self.locks.acquire(&order_id).await;
        let now = self.clock.now();
        if expires_at <= now {
            return Err(CoreError::ValidationFailed(
                "offer window must end in the future".to_string(),
            ));
        }

        let order = self.fetch_order(order_id).await?;
        if order.status != OrderStatus::Confirmed {
            return Err(CoreError::InvalidTransition {
                from: format!("{:?}", order.status),
                to: "OFFERED".to_string(),
            });
        }

        let mut created = Vec::with_capacity(vendor_ids.len());
        for vendor_id in &vendor_ids {
            let offer = VendorOffer::new(order_id, *vendor_id, expires_at, now);
            self.offers.save(&offer).await?;
            created.push(offer);
        }

        tracing::info!(order_id = %order_id, vendors = vendor_ids.len(), "order broadcast to vendors");
        emit(
            self.notifier.as_ref(),
            "offer_broadcast",
            &OfferBroadcastEvent {
                order_id,
                vendor_ids,
                expires_at: expires_at.timestamp(),
                timestamp: now.timestamp(),
            },
        )
        .await;
        Ok(created)
    }

    /// First acceptance wins; sibling offers still OFFERED are withdrawn in
    /// the same critical section, so a half-applied acceptance cannot exist.
    pub async fn accept(&self, offer_id: Uuid) -> CoreResult<VendorOffer> {
        let found = self.fetch_offer(offer_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut offer = self.fetch_offer(offer_id).await?;
        let order = self.fetch_order(offer.order_id).await?;
        if order.status != OrderStatus::Confirmed {
            return Err(CoreError::InvalidTransition {
                from: format!("{:?}", order.status),
                to: "ACCEPTED".to_string(),
            });
        }

        offer.accept(now)?;
        self.offers.save(&offer).await?;

        let mut withdrawn = Vec::new();
        for mut sibling in self.offers.list_by_order(offer.order_id).await? {
            if sibling.id != offer.id && sibling.status == VendorOfferStatus::Offered {
                sibling.withdraw(now)?;
                self.offers.save(&sibling).await?;
                withdrawn.push(sibling.id);
            }
        }

        tracing::info!(
            offer_id = %offer.id,
            order_id = %offer.order_id,
            vendor_id = %offer.vendor_id,
            withdrawn = withdrawn.len(),
            "vendor offer accepted"
        );
        emit(
            self.notifier.as_ref(),
            "offer_accepted",
            &OfferAcceptedEvent {
                offer_id: offer.id,
                order_id: offer.order_id,
                vendor_id: offer.vendor_id,
                withdrawn_sibling_ids: withdrawn,
                timestamp: now.timestamp(),
            },
        )
        .await;
        Ok(offer)
    }

    pub async fn reject(&self, offer_id: Uuid, reason: String) -> CoreResult<VendorOffer> {
        if reason.trim().is_empty() {
            return Err(CoreError::ValidationFailed(
                "rejection reason must not be empty".to_string(),
            ));
        }
        let found = self.fetch_offer(offer_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut offer = self.fetch_offer(offer_id).await?;
        offer.reject(reason, now)?;
        self.offers.save(&offer).await?;
        Ok(offer)
    }

    pub async fn start_progress(&self, offer_id: Uuid) -> CoreResult<VendorOffer> {
        let found = self.fetch_offer(offer_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut offer = self.fetch_offer(offer_id).await?;
        offer.start_progress(now)?;
        self.offers.save(&offer).await?;
        Ok(offer)
    }

    /// READY also issues the delivery OTP and pushes it to the buyer. The
    /// code lives only on this offer and is consumed on redemption.
    pub async fn mark_ready(&self, offer_id: Uuid) -> CoreResult<VendorOffer> {
        let found = self.fetch_offer(offer_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut offer = self.fetch_offer(offer_id).await?;
        offer.mark_ready(now)?;
        let code = offer.issue_otp(now);
        self.offers.save(&offer).await?;

        let order = self.fetch_order(offer.order_id).await?;
        tracing::info!(offer_id = %offer.id, order_id = %offer.order_id, "vendor ready, delivery OTP issued");
        emit(
            self.notifier.as_ref(),
            "delivery_otp_issued",
            &DeliveryOtpIssuedEvent {
                offer_id: offer.id,
                order_id: offer.order_id,
                buyer_id: order.buyer_id,
                otp: Masked(code),
                timestamp: now.timestamp(),
            },
        )
        .await;
        Ok(offer)
    }

    /// Read-side view with lazy expiry applied: OFFERED entries past their
    /// window surface as EXPIRED without being written back.
    pub async fn offers_for_order(&self, order_id: Uuid) -> CoreResult<Vec<VendorOffer>> {
        let now = self.clock.now();
        let mut offers = self.offers.list_by_order(order_id).await?;
        for offer in &mut offers {
            offer.status = offer.effective_status(now);
        }
        Ok(offers)
    }

    pub async fn get_offer(&self, offer_id: Uuid) -> CoreResult<VendorOffer> {
        let now = self.clock.now();
        let mut offer = self.fetch_offer(offer_id).await?;
        offer.status = offer.effective_status(now);
        Ok(offer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use chrono::Duration;

    #[tokio::test]
    async fn acceptance_withdraws_all_siblings() {
        let engine = testkit::engine();
        let order = engine.manager.create_order(testkit::draft(1_000_000)).await.unwrap();
        engine.manager.confirm(order.id).await.unwrap();

        let offers = engine
            .board
            .broadcast(
                order.id,
                vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()],
                testkit::t0() + Duration::hours(1),
            )
            .await
            .unwrap();

        engine.board.accept(offers[1].id).await.unwrap();

        let after = engine.board.offers_for_order(order.id).await.unwrap();
        let accepted: Vec<_> = after
            .iter()
            .filter(|o| o.status == VendorOfferStatus::Accepted)
            .collect();
        let withdrawn: Vec<_> = after
            .iter()
            .filter(|o| o.status == VendorOfferStatus::Withdrawn)
            .collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(withdrawn.len(), 2);
    }

    #[tokio::test]
    async fn second_acceptance_is_rejected_with_state_unchanged() {
        let engine = testkit::engine();
        let order = engine.manager.create_order(testkit::draft(1_000_000)).await.unwrap();
        engine.manager.confirm(order.id).await.unwrap();

        let offers = engine
            .board
            .broadcast(
                order.id,
                vec![Uuid::new_v4(), Uuid::new_v4()],
                testkit::t0() + Duration::hours(1),
            )
            .await
            .unwrap();

        engine.board.accept(offers[0].id).await.unwrap();
        let err = engine.board.accept(offers[1].id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));

        let loser = engine.store.offers.get(offers[1].id).await.unwrap().unwrap();
        assert_eq!(loser.status, VendorOfferStatus::Withdrawn);
    }

    #[tokio::test]
    async fn expired_offer_cannot_be_accepted() {
        let engine = testkit::engine();
        let order = engine.manager.create_order(testkit::draft(1_000_000)).await.unwrap();
        engine.manager.confirm(order.id).await.unwrap();

        let offers = engine
            .board
            .broadcast(order.id, vec![Uuid::new_v4()], testkit::t0() + Duration::minutes(30))
            .await
            .unwrap();

        engine.clock.advance(Duration::hours(1));
        let err = engine.board.accept(offers[0].id).await.unwrap_err();
        assert!(matches!(err, CoreError::Expired(_)));

        // Lazy expiry: the read side reports EXPIRED, storage still says OFFERED.
        let viewed = engine.board.get_offer(offers[0].id).await.unwrap();
        assert_eq!(viewed.status, VendorOfferStatus::Expired);
        let stored = engine.store.offers.get(offers[0].id).await.unwrap().unwrap();
        assert_eq!(stored.status, VendorOfferStatus::Offered);
    }

    #[tokio::test]
    async fn broadcast_requires_a_confirmed_order() {
        let engine = testkit::engine();
        let order = engine.manager.create_order(testkit::draft(1_000_000)).await.unwrap();

        let err = engine
            .board
            .broadcast(order.id, vec![Uuid::new_v4()], testkit::t0() + Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn mark_ready_issues_a_six_digit_otp() {
        let engine = testkit::engine();
        let (_order_id, _vendor, offer_id) = testkit::accepted_order(&engine).await;

        engine.board.mark_ready(offer_id).await.unwrap();

        let offer = engine.store.offers.get(offer_id).await.unwrap().unwrap();
        assert_eq!(offer.status, VendorOfferStatus::Ready);
        let code = offer.delivery_otp.expect("OTP issued at READY").into_inner();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn reject_does_not_touch_siblings() {
        let engine = testkit::engine();
        let order = engine.manager.create_order(testkit::draft(1_000_000)).await.unwrap();
        engine.manager.confirm(order.id).await.unwrap();

        let offers = engine
            .board
            .broadcast(
                order.id,
                vec![Uuid::new_v4(), Uuid::new_v4()],
                testkit::t0() + Duration::hours(1),
            )
            .await
            .unwrap();

        engine.board.reject(offers[0].id, "out of stock".to_string()).await.unwrap();

        let sibling = engine.store.offers.get(offers[1].id).await.unwrap().unwrap();
        assert_eq!(sibling.status, VendorOfferStatus::Offered);
    }
}
