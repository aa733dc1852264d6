//! Shared wiring for the module tests: every service over one in-memory
//! store, one manual clock, and one lock registry.

use chrono::{DateTime, Duration, TimeZone, Utc};
use mandi_core::clock::{Clock, ManualClock};
use mandi_core::lock::KeyedLocks;
use mandi_core::notify::NullNotifier;
use std::sync::Arc;
use uuid::Uuid;

use crate::board::VendorOfferBoard;
use crate::delivery::DeliveryVerification;
use crate::dispute::DisputeWorkflow;
use crate::manager::OrderManager;
use crate::memory::MemoryStore;
use crate::models::{DraftItem, OrderDraft, OrderType};
use crate::settlement::{SettlementBatcher, SettlementRules};

pub(crate) struct TestEngine {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub locks: Arc<KeyedLocks<Uuid>>,
    pub manager: OrderManager,
    pub board: VendorOfferBoard,
    pub delivery: DeliveryVerification,
    pub disputes: DisputeWorkflow,
    pub batcher: SettlementBatcher,
}

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap()
}

pub(crate) fn engine() -> TestEngine {
    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let locks = Arc::new(KeyedLocks::new());
    let notifier = Arc::new(NullNotifier);

    let manager = OrderManager::new(
        store.orders.clone(),
        store.offers.clone(),
        notifier.clone(),
        clock.clone(),
        locks.clone(),
    );
    let board = VendorOfferBoard::new(
        store.offers.clone(),
        store.orders.clone(),
        notifier.clone(),
        clock.clone(),
        locks.clone(),
    );
    let delivery = DeliveryVerification::new(
        store.offers.clone(),
        store.orders.clone(),
        notifier.clone(),
        clock.clone(),
        locks.clone(),
    );
    let disputes = DisputeWorkflow::new(
        store.disputes.clone(),
        store.orders.clone(),
        notifier.clone(),
        clock.clone(),
        locks.clone(),
    );
    let batcher = SettlementBatcher::new(
        store.orders.clone(),
        store.offers.clone(),
        store.disputes.clone(),
        store.batches.clone(),
        SettlementRules {
            platform_fee_percent: 3.0,
            tds_percent: 1.0,
        },
        notifier,
        clock.clone(),
        locks.clone(),
    );

    TestEngine {
        store,
        clock,
        locks,
        manager,
        board,
        delivery,
        disputes,
        batcher,
    }
}

/// Single-item draft whose total comes out to exactly `total_paise`.
pub(crate) fn draft(total_paise: i64) -> OrderDraft {
    OrderDraft {
        buyer_id: "buyer-7".to_string(),
        order_type: OrderType::Material,
        items: vec![DraftItem {
            name: "TMT bars 12mm".to_string(),
            quantity: 1,
            unit_price_paise: total_paise,
        }],
        platform_fee_paise: 0,
        delivery_fee_paise: 0,
        tax_paise: 0,
    }
}

/// Confirmed order with one accepted vendor offer.
/// Returns (order_id, vendor_id, offer_id).
pub(crate) async fn accepted_order(engine: &TestEngine) -> (Uuid, Uuid, Uuid) {
    let order = engine.manager.create_order(draft(1_000_000)).await.unwrap();
    engine.manager.confirm(order.id).await.unwrap();

    let vendor_id = Uuid::new_v4();
    let offers = engine
        .board
        .broadcast(order.id, vec![vendor_id], engine.clock.now() + Duration::hours(1))
        .await
        .unwrap();
    let offer = engine.board.accept(offers[0].id).await.unwrap();
    (order.id, vendor_id, offer.id)
}

/// Active order whose vendor has marked READY (OTP issued).
pub(crate) async fn ready_order(engine: &TestEngine) -> (Uuid, Uuid, Uuid) {
    let (order_id, vendor_id, offer_id) = accepted_order(engine).await;
    engine.manager.activate(order_id).await.unwrap();
    engine.board.start_progress(offer_id).await.unwrap();
    engine.board.mark_ready(offer_id).await.unwrap();
    (order_id, vendor_id, offer_id)
}

pub(crate) async fn issued_otp(engine: &TestEngine, offer_id: Uuid) -> String {
    use crate::repository::VendorOfferRepository;
    engine
        .store
        .offers
        .get(offer_id)
        .await
        .unwrap()
        .unwrap()
        .delivery_otp
        .expect("OTP issued at READY")
        .into_inner()
}

/// Order driven all the way to COMPLETED via the OTP path.
pub(crate) async fn completed_order(engine: &TestEngine) -> (Uuid, Uuid, Uuid) {
    let (order_id, vendor_id, offer_id) = ready_order(engine).await;
    let code = issued_otp(engine, offer_id).await;
    engine.delivery.confirm_with_otp(offer_id, &code).await.unwrap();
    (order_id, vendor_id, offer_id)
}
