use mandi_core::clock::Clock;
use mandi_core::lock::KeyedLocks;
use mandi_core::notify::{emit, Notifier};
use mandi_core::{CoreError, CoreResult};
use mandi_offer::{VendorOffer, VendorOfferStatus};
use mandi_shared::models::events::{OrderCancelledEvent, OrderCompletedEvent, OrderConfirmedEvent};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Order, OrderDraft, OrderItem, OrderStatus, PaymentStatus};
use crate::repository::{OrderRepository, VendorOfferRepository};

/// Owns the buyer-facing order lifecycle. Every transition runs inside the
/// per-order critical section, so racing calls (a cancel against a complete)
/// resolve with exactly one winner and a typed rejection for the loser.
pub struct OrderManager {
    orders: Arc<dyn OrderRepository>,
    offers: Arc<dyn VendorOfferRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks<Uuid>>,
}

impl OrderManager {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        offers: Arc<dyn VendorOfferRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        locks: Arc<KeyedLocks<Uuid>>,
    ) -> Self {
        Self {
            orders,
            offers,
            notifier,
            clock,
            locks,
        }
    }

    async fn fetch(&self, order_id: Uuid) -> CoreResult<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))
    }

    /// The offer currently carrying the order, if any vendor has accepted.
    async fn working_offer(&self, order_id: Uuid) -> CoreResult<Option<VendorOffer>> {
        let offers = self.offers.list_by_order(order_id).await?;
        Ok(offers.into_iter().find(|o| {
            matches!(
                o.status,
                VendorOfferStatus::Accepted
                    | VendorOfferStatus::InProgress
                    | VendorOfferStatus::Ready
                    | VendorOfferStatus::Delivered
                    | VendorOfferStatus::Completed
            )
        }))
    }

    pub async fn create_order(&self, draft: OrderDraft) -> CoreResult<Order> {
        if draft.buyer_id.trim().is_empty() {
            return Err(CoreError::ValidationFailed("buyer id must not be empty".to_string()));
        }
        if draft.items.is_empty() {
            return Err(CoreError::ValidationFailed("order must contain at least one item".to_string()));
        }
        for item in &draft.items {
            if item.quantity == 0 {
                return Err(CoreError::ValidationFailed(format!(
                    "item '{}' has zero quantity",
                    item.name
                )));
            }
            if item.unit_price_paise < 0 {
                return Err(CoreError::ValidationFailed(format!(
                    "item '{}' has a negative price",
                    item.name
                )));
            }
        }
        if draft.platform_fee_paise < 0 || draft.delivery_fee_paise < 0 || draft.tax_paise < 0 {
            return Err(CoreError::ValidationFailed("fees must not be negative".to_string()));
        }

        let now = self.clock.now();
        let mut order = Order::new(draft.buyer_id, draft.order_type, now);
        let order_id = order.id;
        for item in draft.items {
            order.add_item(
                OrderItem::new(order_id, item.name, item.quantity, item.unit_price_paise, now),
                now,
            );
        }
        order.price(draft.platform_fee_paise, draft.delivery_fee_paise, draft.tax_paise, now);

        self.orders.save(&order).await?;
        tracing::info!(order_id = %order.id, total_paise = order.totals.total_paise, "order created");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> CoreResult<Order> {
        self.fetch(order_id).await
    }

    pub async fn list_for_buyer(&self, buyer_id: &str) -> CoreResult<Vec<Order>> {
        self.orders.list_by_buyer(buyer_id).await
    }

    pub async fn confirm(&self, order_id: Uuid) -> CoreResult<Order> {
        let _guard = self.locks.acquire(&order_id).await;
        let now = self.clock.now();

        let mut order = self.fetch(order_id).await?;
        order.confirm(now)?;
        self.orders.save(&order).await?;

        tracing::info!(order_id = %order.id, "order confirmed");
        emit(
            self.notifier.as_ref(),
            "order_confirmed",
            &OrderConfirmedEvent {
                order_id: order.id,
                buyer_id: order.buyer_id.clone(),
                total_paise: order.totals.total_paise,
                timestamp: now.timestamp(),
            },
        )
        .await;
        Ok(order)
    }

    /// CONFIRMED -> ACTIVE, once a vendor has accepted.
    pub async fn activate(&self, order_id: Uuid) -> CoreResult<Order> {
        let _guard = self.locks.acquire(&order_id).await;
        let now = self.clock.now();

        let mut order = self.fetch(order_id).await?;
        if self.working_offer(order_id).await?.is_none() {
            return Err(CoreError::ValidationFailed(format!(
                "order {} has no accepted vendor offer",
                order_id
            )));
        }
        order.activate(now)?;
        self.orders.save(&order).await?;
        tracing::info!(order_id = %order.id, "order activated");
        Ok(order)
    }

    /// ACTIVE -> COMPLETED once the vendor offer has completed delivery
    /// verification. Calling it again on a COMPLETED order succeeds without
    /// repeating side effects.
    pub async fn complete(&self, order_id: Uuid) -> CoreResult<Order> {
        let _guard = self.locks.acquire(&order_id).await;
        let now = self.clock.now();

        let mut order = self.fetch(order_id).await?;
        if order.status == OrderStatus::Completed {
            return Ok(order);
        }

        match self.working_offer(order_id).await? {
            Some(offer) if offer.status == VendorOfferStatus::Completed => {}
            Some(offer) => {
                return Err(CoreError::InvalidTransition {
                    from: format!("{:?}", offer.status),
                    to: "COMPLETED".to_string(),
                });
            }
            None => {
                return Err(CoreError::ValidationFailed(format!(
                    "order {} has no accepted vendor offer",
                    order_id
                )));
            }
        }

        let transitioned = order.complete(now)?;
        self.orders.save(&order).await?;

        if transitioned {
            tracing::info!(order_id = %order.id, "order completed");
            emit(
                self.notifier.as_ref(),
                "order_completed",
                &OrderCompletedEvent {
                    order_id: order.id,
                    buyer_id: order.buyer_id.clone(),
                    total_paise: order.totals.total_paise,
                    timestamp: now.timestamp(),
                },
            )
            .await;
        }
        Ok(order)
    }

    /// Allowed up to ACTIVE. Any live vendor offer is force-cancelled and
    /// still-open sibling offers are withdrawn in the same critical section.
    pub async fn cancel(&self, order_id: Uuid, reason: String) -> CoreResult<Order> {
        if reason.trim().is_empty() {
            return Err(CoreError::ValidationFailed(
                "cancellation reason must not be empty".to_string(),
            ));
        }
        let _guard = self.locks.acquire(&order_id).await;
        let now = self.clock.now();

        let mut order = self.fetch(order_id).await?;
        order.cancel(reason.clone(), now)?;
        self.orders.save(&order).await?;

        for mut offer in self.offers.list_by_order(order_id).await? {
            match offer.status {
                VendorOfferStatus::Accepted | VendorOfferStatus::InProgress | VendorOfferStatus::Ready => {
                    offer.cancel(now)?;
                    self.offers.save(&offer).await?;
                }
                VendorOfferStatus::Offered => {
                    offer.withdraw(now)?;
                    self.offers.save(&offer).await?;
                }
                _ => {}
            }
        }

        tracing::info!(order_id = %order.id, %reason, "order cancelled");
        emit(
            self.notifier.as_ref(),
            "order_cancelled",
            &OrderCancelledEvent {
                order_id: order.id,
                buyer_id: order.buyer_id.clone(),
                reason,
                refund_eligible: order.payment_status == PaymentStatus::RefundPending,
                timestamp: now.timestamp(),
            },
        )
        .await;
        Ok(order)
    }

    /// Bookkeeping for the external payment gateway's confirmation callback.
    pub async fn record_payment(&self, order_id: Uuid) -> CoreResult<Order> {
        let _guard = self.locks.acquire(&order_id).await;
        let now = self.clock.now();

        let mut order = self.fetch(order_id).await?;
        order.record_payment(now)?;
        self.orders.save(&order).await?;
        Ok(order)
    }
}
