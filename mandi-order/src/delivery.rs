use mandi_core::clock::Clock;
use mandi_core::lock::KeyedLocks;
use mandi_core::notify::{emit, Notifier};
use mandi_core::{CoreError, CoreResult};
use mandi_offer::VendorOffer;
use mandi_shared::models::events::DeliveryRecordedEvent;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Order;
use crate::repository::{OrderRepository, VendorOfferRepository};

/// The two mutually exclusive completion paths out of READY.
///
/// An OTP is buyer-attested in real time, so a match is the final word: the
/// offer jumps straight to COMPLETED and the order completes with it. A photo
/// is vendor-attested only, so it parks the offer at DELIVERED and leaves the
/// order ACTIVE until the buyer confirms receipt (or disputes).
pub struct DeliveryVerification {
    offers: Arc<dyn VendorOfferRepository>,
    orders: Arc<dyn OrderRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks<Uuid>>,
}

impl DeliveryVerification {
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

    /// OTP path: validates, matches, and completes offer and order in one
    /// critical section. Both entities are mutated before either is saved, so
    /// a failing cascade leaves nothing half-applied.
    pub async fn confirm_with_otp(&self, offer_id: Uuid, code: &str) -> CoreResult<VendorOffer> {
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::VerificationFailed(
                "OTP must be exactly 6 digits".to_string(),
            ));
        }

        let found = self.fetch_offer(offer_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut offer = self.fetch_offer(offer_id).await?;
        let mut order = self.fetch_order(offer.order_id).await?;

        offer.redeem_otp(code, now)?;
        let completed = order.complete(now)?;

        self.offers.save(&offer).await?;
        self.orders.save(&order).await?;

        tracing::info!(offer_id = %offer.id, order_id = %order.id, "delivery confirmed via OTP");
        if completed {
            emit(
                self.notifier.as_ref(),
                "delivery_confirmed",
                &DeliveryRecordedEvent {
                    offer_id: offer.id,
                    order_id: order.id,
                    vendor_id: offer.vendor_id,
                    method: "OTP".to_string(),
                    timestamp: now.timestamp(),
                },
            )
            .await;
        }
        Ok(offer)
    }

    /// Photo path: records vendor-attested evidence and stops at DELIVERED.
    /// The order is intentionally untouched.
    pub async fn confirm_with_photo(&self, offer_id: Uuid, evidence_ref: String) -> CoreResult<VendorOffer> {
        if evidence_ref.trim().is_empty() {
            return Err(CoreError::ValidationFailed(
                "photo evidence reference must not be empty".to_string(),
            ));
        }

        let found = self.fetch_offer(offer_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut offer = self.fetch_offer(offer_id).await?;
        offer.record_photo_delivery(evidence_ref, now)?;
        self.offers.save(&offer).await?;

        tracing::info!(offer_id = %offer.id, order_id = %offer.order_id, "delivery recorded with photo evidence");
        emit(
            self.notifier.as_ref(),
            "delivery_recorded",
            &DeliveryRecordedEvent {
                offer_id: offer.id,
                order_id: offer.order_id,
                vendor_id: offer.vendor_id,
                method: "PHOTO".to_string(),
                timestamp: now.timestamp(),
            },
        )
        .await;
        Ok(offer)
    }

    /// The buyer's explicit confirmation that promotes a photo delivery from
    /// DELIVERED to COMPLETED and cascades order completion.
    pub async fn confirm_receipt(&self, offer_id: Uuid) -> CoreResult<VendorOffer> {
        let found = self.fetch_offer(offer_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut offer = self.fetch_offer(offer_id).await?;
        let mut order = self.fetch_order(offer.order_id).await?;

        offer.confirm_receipt(now)?;
        let completed = order.complete(now)?;

        self.offers.save(&offer).await?;
        self.orders.save(&order).await?;

        tracing::info!(offer_id = %offer.id, order_id = %order.id, "buyer confirmed receipt");
        if completed {
            emit(
                self.notifier.as_ref(),
                "delivery_confirmed",
                &DeliveryRecordedEvent {
                    offer_id: offer.id,
                    order_id: order.id,
                    vendor_id: offer.vendor_id,
                    method: "PHOTO".to_string(),
                    timestamp: now.timestamp(),
                },
            )
            .await;
        }
        Ok(offer)
    }
}
