use chrono::{DateTime, Utc};
use mandi_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Buyer-facing order status. Transitions are monotonic along
/// PENDING -> CONFIRMED -> ACTIVE -> COMPLETED, with CANCELLED reachable up to
/// ACTIVE and DISPUTED as a temporary overlay from ACTIVE/COMPLETED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
    Disputed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Material,
    Labor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    RefundPending,
    Refunded,
}

/// All money is carried as integer paise.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal_paise: i64,
    pub platform_fee_paise: i64,
    pub delivery_fee_paise: i64,
    pub tax_paise: i64,
    pub total_paise: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price_paise: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(order_id: Uuid, name: String, quantity: u32, unit_price_paise: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            name,
            quantity,
            unit_price_paise,
            created_at: now,
        }
    }

    pub fn line_total_paise(&self) -> i64 {
        self.unit_price_paise * i64::from(self.quantity)
    }
}

/// Input for order creation; ids and timestamps are assigned by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderDraft {
    pub buyer_id: String,
    pub order_type: OrderType,
    pub items: Vec<DraftItem>,
    pub platform_fee_paise: i64,
    pub delivery_fee_paise: i64,
    pub tax_paise: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price_paise: i64,
}

/// The single source of truth for a buyer's purchase. Never deleted; terminal
/// orders are kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: String,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub payment_status: PaymentStatus,
    /// Write-once: stamped exactly once, by the settlement sweep.
    pub settlement_batch_id: Option<Uuid>,
    pub refunded_paise: i64,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Order {
    pub fn new(buyer_id: String, order_type: OrderType, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            buyer_id,
            order_type,
            status: OrderStatus::Pending,
            items: Vec::new(),
            totals: OrderTotals::default(),
            payment_status: PaymentStatus::Pending,
            settlement_batch_id: None,
            refunded_paise: 0,
            cancellation_reason: None,
            created_at: now,
            confirmed_at: None,
            activated_at: None,
            completed_at: None,
            cancelled_at: None,
            updated_at: now,
            version: 0,
        }
    }

    pub fn add_item(&mut self, item: OrderItem, now: DateTime<Utc>) {
        self.items.push(item);
        self.recompute_totals();
        self.updated_at = now;
    }

    /// Fees come from the caller; pricing them is catalog territory.
    pub fn price(&mut self, platform_fee_paise: i64, delivery_fee_paise: i64, tax_paise: i64, now: DateTime<Utc>) {
        self.totals.platform_fee_paise = platform_fee_paise;
        self.totals.delivery_fee_paise = delivery_fee_paise;
        self.totals.tax_paise = tax_paise;
        self.recompute_totals();
        self.updated_at = now;
    }

    fn recompute_totals(&mut self) {
        self.totals.subtotal_paise = self.items.iter().map(|i| i.line_total_paise()).sum();
        self.totals.total_paise = self.totals.subtotal_paise
            + self.totals.platform_fee_paise
            + self.totals.delivery_fee_paise
            + self.totals.tax_paise;
    }

    /// What the vendor is owed at settlement, net of any dispute refunds.
    pub fn vendor_payable_paise(&self) -> i64 {
        self.totals.total_paise - self.refunded_paise
    }

    fn update_status(&mut self, new_status: OrderStatus, now: DateTime<Utc>) {
        self.status = new_status;
        self.updated_at = now;
    }

    fn invalid(&self, to: &str) -> CoreError {
        CoreError::InvalidTransition {
            from: format!("{:?}", self.status),
            to: to.to_string(),
        }
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != OrderStatus::Pending {
            return Err(self.invalid("CONFIRMED"));
        }
        self.confirmed_at = Some(now);
        self.update_status(OrderStatus::Confirmed, now);
        Ok(())
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != OrderStatus::Confirmed {
            return Err(self.invalid("ACTIVE"));
        }
        self.activated_at = Some(now);
        self.update_status(OrderStatus::Active, now);
        Ok(())
    }

    /// Idempotent: completing a COMPLETED order reports `false` so the caller
    /// can skip duplicate side effects, while any other non-ACTIVE state is a
    /// hard rejection the caller can distinguish from "already done".
    pub fn complete(&mut self, now: DateTime<Utc>) -> CoreResult<bool> {
        match self.status {
            OrderStatus::Completed => Ok(false),
            OrderStatus::Active => {
                self.completed_at = Some(now);
                self.update_status(OrderStatus::Completed, now);
                Ok(true)
            }
            _ => Err(self.invalid("COMPLETED")),
        }
    }

    pub fn cancel(&mut self, reason: String, now: DateTime<Utc>) -> CoreResult<()> {
        if !matches!(
            self.status,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Active
        ) {
            return Err(self.invalid("CANCELLED"));
        }
        self.cancellation_reason = Some(reason);
        self.cancelled_at = Some(now);
        if self.payment_status == PaymentStatus::Paid {
            self.payment_status = PaymentStatus::RefundPending;
        }
        self.update_status(OrderStatus::Cancelled, now);
        Ok(())
    }

    /// Records the external gateway's payment confirmation.
    pub fn record_payment(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status == OrderStatus::Cancelled {
            return Err(self.invalid("PAID"));
        }
        if self.payment_status != PaymentStatus::Pending {
            return Err(CoreError::ValidationFailed(format!(
                "payment already recorded for order {}",
                self.id
            )));
        }
        self.payment_status = PaymentStatus::Paid;
        self.updated_at = now;
        Ok(())
    }

    /// Overlays DISPUTED and returns the status to restore on resolution.
    pub fn mark_disputed(&mut self, now: DateTime<Utc>) -> CoreResult<OrderStatus> {
        if !matches!(self.status, OrderStatus::Active | OrderStatus::Completed) {
            return Err(self.invalid("DISPUTED"));
        }
        let prior = self.status;
        self.update_status(OrderStatus::Disputed, now);
        Ok(prior)
    }

    pub fn restore_after_dispute(&mut self, prior: OrderStatus, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != OrderStatus::Disputed {
            return Err(self.invalid(&format!("{:?}", prior)));
        }
        self.update_status(prior, now);
        Ok(())
    }

    /// Full-refund dispute outcome: the order ends CANCELLED with the whole
    /// remaining amount refunded.
    pub fn cancel_with_refund(&mut self, refund_paise: i64, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != OrderStatus::Disputed {
            return Err(self.invalid("CANCELLED"));
        }
        self.apply_refund(refund_paise, now)?;
        self.cancellation_reason = Some("dispute resolved with full refund".to_string());
        self.cancelled_at = Some(now);
        self.update_status(OrderStatus::Cancelled, now);
        Ok(())
    }

    pub fn apply_refund(&mut self, refund_paise: i64, now: DateTime<Utc>) -> CoreResult<()> {
        if refund_paise <= 0 || refund_paise > self.vendor_payable_paise() {
            return Err(CoreError::ValidationFailed(format!(
                "refund of {} paise is outside the refundable range for order {}",
                refund_paise, self.id
            )));
        }
        self.refunded_paise += refund_paise;
        self.payment_status = PaymentStatus::RefundPending;
        self.updated_at = now;
        Ok(())
    }

    /// Guards the write-once settlement membership invariant.
    pub fn attach_settlement(&mut self, batch_id: Uuid, now: DateTime<Utc>) -> CoreResult<()> {
        if let Some(existing) = self.settlement_batch_id {
            return Err(CoreError::AlreadySettled(format!(
                "order {} already belongs to settlement batch {}",
                self.id, existing
            )));
        }
        if self.status != OrderStatus::Completed {
            return Err(self.invalid("SETTLED"));
        }
        self.settlement_batch_id = Some(batch_id);
        self.updated_at = now;
        Ok(())
    }
}
