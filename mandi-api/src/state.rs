use chrono::Duration;
use mandi_core::clock::SystemClock;
use mandi_core::lock::KeyedLocks;
use mandi_core::notify::LogNotifier;
use mandi_order::{
    DeliveryVerification, DisputeWorkflow, MemoryStore, OrderManager, SettlementBatcher,
    SettlementRules, VendorOfferBoard,
};
use std::sync::Arc;

use crate::app_config::Config;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderManager>,
    pub board: Arc<VendorOfferBoard>,
    pub delivery: Arc<DeliveryVerification>,
    pub disputes: Arc<DisputeWorkflow>,
    pub settlements: Arc<SettlementBatcher>,
    pub offer_window: Duration,
}

impl AppState {
    /// Wires every engine service over one store, one clock and one lock
    /// registry. The shared registry is what makes dispute-open and
    /// settlement builds mutually exclusive per order.
    pub fn new(config: &Config) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(SystemClock);
        let locks = Arc::new(KeyedLocks::new());
        let notifier = Arc::new(LogNotifier);

        let orders = Arc::new(OrderManager::new(
            store.orders.clone(),
            store.offers.clone(),
            notifier.clone(),
            clock.clone(),
            locks.clone(),
        ));
        let board = Arc::new(VendorOfferBoard::new(
            store.offers.clone(),
            store.orders.clone(),
            notifier.clone(),
            clock.clone(),
            locks.clone(),
        ));
        let delivery = Arc::new(DeliveryVerification::new(
            store.offers.clone(),
            store.orders.clone(),
            notifier.clone(),
            clock.clone(),
            locks.clone(),
        ));
        let disputes = Arc::new(DisputeWorkflow::new(
            store.disputes.clone(),
            store.orders.clone(),
            notifier.clone(),
            clock.clone(),
            locks.clone(),
        ));
        let settlements = Arc::new(SettlementBatcher::new(
            store.orders.clone(),
            store.offers.clone(),
            store.disputes.clone(),
            store.batches.clone(),
            SettlementRules {
                platform_fee_percent: config.settlement.platform_fee_percent,
                tds_percent: config.settlement.tds_percent,
            },
            notifier,
            clock,
            locks,
        ));

        Self {
            orders,
            board,
            delivery,
            disputes,
            settlements,
            offer_window: Duration::minutes(config.offers.default_window_minutes),
        }
    }
}
