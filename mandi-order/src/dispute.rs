use chrono::{DateTime, Utc};
use mandi_core::clock::Clock;
use mandi_core::lock::KeyedLocks;
use mandi_core::notify::{emit, Notifier};
use mandi_core::{CoreError, CoreResult};
use mandi_shared::models::events::{DisputeOpenedEvent, DisputeResolvedEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Order, OrderStatus};
use crate::repository::{DisputeRepository, OrderRepository};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Escalated,
    ResolvedRefund,
    ResolvedReplacement,
    ResolvedPartialRefund,
    Rejected,
}

impl DisputeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DisputeStatus::ResolvedRefund
                | DisputeStatus::ResolvedReplacement
                | DisputeStatus::ResolvedPartialRefund
                | DisputeStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeReason {
    DamagedGoods,
    WrongItems,
    ShortQuantity,
    QualityIssue,
    NotDelivered,
    Overcharged,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputePriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Buyer,
    Vendor,
    Admin,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceKind {
    Photo,
    Document,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    pub kind: EvidenceKind,
    pub uploaded_by: ActorRole,
    pub reference: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Append-only audit log. Entries are never edited or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub actor: String,
    pub role: ActorRole,
    pub action: String,
    pub description: Option<String>,
    pub at: DateTime<Utc>,
}

/// Requested resolution. Refund amounts are derived from the order where the
/// outcome implies them.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeOutcome {
    Refund,
    PartialRefund { amount_paise: i64 },
    Replacement,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: Uuid,
    pub order_id: Uuid,
    pub reason: DisputeReason,
    pub status: DisputeStatus,
    pub priority: DisputePriority,
    pub disputed_paise: i64,
    pub refund_paise: Option<i64>,
    pub evidence: Vec<Evidence>,
    pub timeline: Vec<TimelineEntry>,
    pub resolution_note: Option<String>,
    pub assigned_to: Option<String>,
    /// Status the order held before the DISPUTED overlay; restored on
    /// replacement/rejection outcomes.
    pub order_status_before: OrderStatus,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Dispute {
    #[allow(clippy::too_many_arguments)]
    fn new(
        order_id: Uuid,
        reason: DisputeReason,
        priority: DisputePriority,
        disputed_paise: i64,
        opened_by: &str,
        role: ActorRole,
        order_status_before: OrderStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let mut dispute = Self {
            id: Uuid::new_v4(),
            order_id,
            reason,
            status: DisputeStatus::Open,
            priority,
            disputed_paise,
            refund_paise: None,
            evidence: Vec::new(),
            timeline: Vec::new(),
            resolution_note: None,
            assigned_to: None,
            order_status_before,
            opened_at: now,
            resolved_at: None,
            updated_at: now,
            version: 0,
        };
        dispute.push_timeline(opened_by, role, "OPENED", Some(format!("{:?}", reason)), now);
        dispute
    }

    fn push_timeline(
        &mut self,
        actor: &str,
        role: ActorRole,
        action: &str,
        description: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.timeline.push(TimelineEntry {
            actor: actor.to_string(),
            role,
            action: action.to_string(),
            description,
            at: now,
        });
        self.updated_at = now;
    }

    fn invalid(&self, to: &str) -> CoreError {
        CoreError::InvalidTransition {
            from: format!("{:?}", self.status),
            to: to.to_string(),
        }
    }

    fn begin_review(&mut self, assignee: &str, now: DateTime<Utc>) -> CoreResult<()> {
        if !matches!(self.status, DisputeStatus::Open | DisputeStatus::Escalated) {
            return Err(self.invalid("UNDER_REVIEW"));
        }
        self.assigned_to = Some(assignee.to_string());
        self.status = DisputeStatus::UnderReview;
        self.push_timeline(assignee, ActorRole::Admin, "REVIEW_STARTED", None, now);
        Ok(())
    }

    fn escalate(&mut self, actor: &str, role: ActorRole, now: DateTime<Utc>) -> CoreResult<()> {
        if !matches!(self.status, DisputeStatus::Open | DisputeStatus::UnderReview) {
            return Err(self.invalid("ESCALATED"));
        }
        if self.priority < DisputePriority::High {
            self.priority = DisputePriority::High;
        }
        self.status = DisputeStatus::Escalated;
        self.push_timeline(actor, role, "ESCALATED", None, now);
        Ok(())
    }

    fn add_evidence(
        &mut self,
        kind: EvidenceKind,
        uploaded_by: ActorRole,
        reference: String,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::ValidationFailed(format!(
                "dispute {} is closed; evidence can no longer be added",
                self.id
            )));
        }
        self.evidence.push(Evidence {
            id: Uuid::new_v4(),
            kind,
            uploaded_by,
            reference: reference.clone(),
            uploaded_at: now,
        });
        self.push_timeline("evidence", uploaded_by, "EVIDENCE_ADDED", Some(reference), now);
        Ok(())
    }

    fn resolve(
        &mut self,
        status: DisputeStatus,
        refund_paise: Option<i64>,
        note: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.status != DisputeStatus::UnderReview {
            return Err(self.invalid(&format!("{:?}", status)));
        }
        self.refund_paise = refund_paise;
        self.resolution_note = note;
        self.resolved_at = Some(now);
        self.status = status;
        self.push_timeline(actor, ActorRole::Admin, "RESOLVED", Some(format!("{:?}", status)), now);
        Ok(())
    }
}

/// Dispute sub-workflow. Order-side effects happen inside the same per-order
/// critical section as the dispute write, so a settlement sweep can never
/// observe a half-opened dispute.
pub struct DisputeWorkflow {
    disputes: Arc<dyn DisputeRepository>,
    orders: Arc<dyn OrderRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks<Uuid>>,
}

impl DisputeWorkflow {
    pub fn new(
        disputes: Arc<dyn DisputeRepository>,
        orders: Arc<dyn OrderRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        locks: Arc<KeyedLocks<Uuid>>,
    ) -> Self {
        Self {
            disputes,
            orders,
            notifier,
            clock,
            locks,
        }
    }

    async fn fetch_order(&self, order_id: Uuid) -> CoreResult<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))
    }

    async fn fetch_dispute(&self, dispute_id: Uuid) -> CoreResult<Dispute> {
        self.disputes
            .get(dispute_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("dispute {}", dispute_id)))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn open(
        &self,
        order_id: Uuid,
        reason: DisputeReason,
        priority: DisputePriority,
        opened_by: &str,
        role: ActorRole,
        disputed_paise: Option<i64>,
    ) -> CoreResult<Dispute> {
        let _guard = self.locks.acquire(&order_id).await;
        let now = self.clock.now();

        let mut order = self.fetch_order(order_id).await?;
        if let Some(batch_id) = order.settlement_batch_id {
            return Err(CoreError::AlreadySettled(format!(
                "order {} is already referenced by settlement batch {}",
                order_id, batch_id
            )));
        }
        if self.disputes.find_open_by_order(order_id).await?.is_some() {
            return Err(CoreError::ValidationFailed(format!(
                "order {} already has an open dispute",
                order_id
            )));
        }

        let prior = order.mark_disputed(now)?;
        let amount = disputed_paise.unwrap_or_else(|| order.vendor_payable_paise());
        let dispute = Dispute::new(order_id, reason, priority, amount, opened_by, role, prior, now);

        self.disputes.save(&dispute).await?;
        self.orders.save(&order).await?;

        tracing::info!(dispute_id = %dispute.id, order_id = %order_id, ?reason, "dispute opened");
        emit(
            self.notifier.as_ref(),
            "dispute_opened",
            &DisputeOpenedEvent {
                dispute_id: dispute.id,
                order_id,
                reason: format!("{:?}", reason),
                priority: format!("{:?}", dispute.priority),
                timestamp: now.timestamp(),
            },
        )
        .await;

        Ok(dispute)
    }

    pub async fn begin_review(&self, dispute_id: Uuid, assignee: &str) -> CoreResult<Dispute> {
        let found = self.fetch_dispute(dispute_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut dispute = self.fetch_dispute(dispute_id).await?;
        dispute.begin_review(assignee, now)?;
        self.disputes.save(&dispute).await?;
        Ok(dispute)
    }

    pub async fn escalate(&self, dispute_id: Uuid, actor: &str, role: ActorRole) -> CoreResult<Dispute> {
        let found = self.fetch_dispute(dispute_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut dispute = self.fetch_dispute(dispute_id).await?;
        dispute.escalate(actor, role, now)?;
        self.disputes.save(&dispute).await?;
        tracing::warn!(dispute_id = %dispute.id, order_id = %dispute.order_id, "dispute escalated");
        Ok(dispute)
    }

    pub async fn add_evidence(
        &self,
        dispute_id: Uuid,
        kind: EvidenceKind,
        uploaded_by: ActorRole,
        reference: String,
    ) -> CoreResult<Dispute> {
        if reference.trim().is_empty() {
            return Err(CoreError::ValidationFailed(
                "evidence reference must not be empty".to_string(),
            ));
        }
        let found = self.fetch_dispute(dispute_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut dispute = self.fetch_dispute(dispute_id).await?;
        dispute.add_evidence(kind, uploaded_by, reference, now)?;
        self.disputes.save(&dispute).await?;
        Ok(dispute)
    }

    /// Terminal transition. Refund outcomes adjust the order's refundable
    /// amount; REJECTED restores the pre-dispute status untouched.
    pub async fn resolve(
        &self,
        dispute_id: Uuid,
        outcome: DisputeOutcome,
        note: Option<String>,
        actor: &str,
    ) -> CoreResult<Dispute> {
        let found = self.fetch_dispute(dispute_id).await?;
        let _guard = self.locks.acquire(&found.order_id).await;
        let now = self.clock.now();

        let mut dispute = self.fetch_dispute(dispute_id).await?;
        let mut order = self.fetch_order(dispute.order_id).await?;
        let prior = dispute.order_status_before;

        let (status, refund) = match &outcome {
            DisputeOutcome::Refund => {
                let amount = order.vendor_payable_paise();
                (DisputeStatus::ResolvedRefund, Some(amount))
            }
            DisputeOutcome::PartialRefund { amount_paise } => {
                (DisputeStatus::ResolvedPartialRefund, Some(*amount_paise))
            }
            DisputeOutcome::Replacement => (DisputeStatus::ResolvedReplacement, None),
            DisputeOutcome::Rejected => (DisputeStatus::Rejected, None),
        };

        dispute.resolve(status, refund, note, actor, now)?;

        match outcome {
            DisputeOutcome::Refund => {
                order.cancel_with_refund(refund.unwrap_or(0), now)?;
            }
            DisputeOutcome::PartialRefund { amount_paise } => {
                order.apply_refund(amount_paise, now)?;
                order.restore_after_dispute(prior, now)?;
            }
            DisputeOutcome::Replacement | DisputeOutcome::Rejected => {
                order.restore_after_dispute(prior, now)?;
            }
        }

        self.disputes.save(&dispute).await?;
        self.orders.save(&order).await?;

        tracing::info!(dispute_id = %dispute.id, order_id = %dispute.order_id, ?status, "dispute resolved");
        emit(
            self.notifier.as_ref(),
            "dispute_resolved",
            &DisputeResolvedEvent {
                dispute_id: dispute.id,
                order_id: dispute.order_id,
                outcome: format!("{:?}", status),
                refund_paise: refund,
                timestamp: now.timestamp(),
            },
        )
        .await;

        Ok(dispute)
    }

    pub async fn get(&self, dispute_id: Uuid) -> CoreResult<Dispute> {
        self.fetch_dispute(dispute_id).await
    }

    pub async fn history_for_order(&self, order_id: Uuid) -> CoreResult<Vec<Dispute>> {
        self.disputes.list_by_order(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use crate::testkit;

    #[tokio::test]
    async fn opening_a_dispute_overlays_the_order() {
        let engine = testkit::engine();
        let (order_id, _vendor, _offer) = testkit::completed_order(&engine).await;

        let dispute = engine
            .disputes
            .open(order_id, DisputeReason::DamagedGoods, DisputePriority::Medium, "buyer-7", ActorRole::Buyer, None)
            .await
            .unwrap();

        assert_eq!(dispute.status, DisputeStatus::Open);
        assert_eq!(dispute.order_status_before, OrderStatus::Completed);
        let order = engine.store.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Disputed);
    }

    #[tokio::test]
    async fn only_one_open_dispute_per_order() {
        let engine = testkit::engine();
        let (order_id, _vendor, _offer) = testkit::completed_order(&engine).await;

        engine
            .disputes
            .open(order_id, DisputeReason::WrongItems, DisputePriority::Low, "buyer-7", ActorRole::Buyer, None)
            .await
            .unwrap();
        let err = engine
            .disputes
            .open(order_id, DisputeReason::WrongItems, DisputePriority::Low, "buyer-7", ActorRole::Buyer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn settled_orders_cannot_be_disputed() {
        let engine = testkit::engine();
        let (order_id, vendor_id, _offer) = testkit::completed_order(&engine).await;

        let start = testkit::t0() - chrono::Duration::days(1);
        let end = testkit::t0() + chrono::Duration::days(1);
        engine
            .batcher
            .build_batch(vendor_id, start, end, 0)
            .await
            .unwrap()
            .expect("order settles");

        let err = engine
            .disputes
            .open(order_id, DisputeReason::DamagedGoods, DisputePriority::Medium, "buyer-7", ActorRole::Buyer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadySettled(_)));
    }

    #[tokio::test]
    async fn rejection_restores_the_pre_dispute_status() {
        let engine = testkit::engine();
        let (order_id, _vendor, _offer) = testkit::completed_order(&engine).await;

        let dispute = engine
            .disputes
            .open(order_id, DisputeReason::QualityIssue, DisputePriority::Medium, "buyer-7", ActorRole::Buyer, None)
            .await
            .unwrap();
        engine.disputes.begin_review(dispute.id, "ops-1").await.unwrap();
        engine
            .disputes
            .resolve(dispute.id, DisputeOutcome::Rejected, Some("no defect found".to_string()), "ops-1")
            .await
            .unwrap();

        let order = engine.store.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.refunded_paise, 0);
    }

    #[tokio::test]
    async fn full_refund_cancels_the_order() {
        let engine = testkit::engine();
        let (order_id, _vendor, _offer) = testkit::completed_order(&engine).await;
        let total = engine
            .store
            .orders
            .get(order_id)
            .await
            .unwrap()
            .unwrap()
            .totals
            .total_paise;

        let dispute = engine
            .disputes
            .open(order_id, DisputeReason::NotDelivered, DisputePriority::High, "buyer-7", ActorRole::Buyer, None)
            .await
            .unwrap();
        engine.disputes.begin_review(dispute.id, "ops-1").await.unwrap();
        let resolved = engine
            .disputes
            .resolve(dispute.id, DisputeOutcome::Refund, None, "ops-1")
            .await
            .unwrap();

        assert_eq!(resolved.status, DisputeStatus::ResolvedRefund);
        assert_eq!(resolved.refund_paise, Some(total));
        let order = engine.store.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.vendor_payable_paise(), 0);
    }

    #[tokio::test]
    async fn partial_refund_reduces_the_vendor_payable() {
        let engine = testkit::engine();
        let (order_id, _vendor, _offer) = testkit::completed_order(&engine).await;

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
                DisputeOutcome::PartialRefund { amount_paise: 100_000 },
                None,
                "ops-1",
            )
            .await
            .unwrap();

        let order = engine.store.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.refunded_paise, 100_000);
    }

    #[tokio::test]
    async fn timeline_only_grows() {
        let engine = testkit::engine();
        let (order_id, _vendor, _offer) = testkit::completed_order(&engine).await;

        let dispute = engine
            .disputes
            .open(order_id, DisputeReason::Other, DisputePriority::Low, "buyer-7", ActorRole::Buyer, None)
            .await
            .unwrap();
        assert_eq!(dispute.timeline.len(), 1);

        let dispute = engine
            .disputes
            .add_evidence(dispute.id, EvidenceKind::Photo, ActorRole::Buyer, "s3://ev/1.jpg".to_string())
            .await
            .unwrap();
        let dispute = engine.disputes.escalate(dispute.id, "buyer-7", ActorRole::Buyer).await.unwrap();
        let dispute = engine.disputes.begin_review(dispute.id, "ops-1").await.unwrap();
        let dispute = engine
            .disputes
            .resolve(dispute.id, DisputeOutcome::Rejected, None, "ops-1")
            .await
            .unwrap();

        assert_eq!(dispute.timeline.len(), 5);
        for pair in dispute.timeline.windows(2) {
            assert!(pair[0].at <= pair[1].at);
        }
    }

    #[tokio::test]
    async fn closed_disputes_are_immutable() {
        let engine = testkit::engine();
        let (order_id, _vendor, _offer) = testkit::completed_order(&engine).await;

        let dispute = engine
            .disputes
            .open(order_id, DisputeReason::Other, DisputePriority::Low, "buyer-7", ActorRole::Buyer, None)
            .await
            .unwrap();
        engine.disputes.begin_review(dispute.id, "ops-1").await.unwrap();
        engine
            .disputes
            .resolve(dispute.id, DisputeOutcome::Rejected, None, "ops-1")
            .await
            .unwrap();

        let err = engine
            .disputes
            .add_evidence(dispute.id, EvidenceKind::Photo, ActorRole::Buyer, "s3://ev/late.jpg".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));

        let err = engine
            .disputes
            .resolve(dispute.id, DisputeOutcome::Refund, None, "ops-1")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }
}
