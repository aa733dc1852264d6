pub mod board;
pub mod delivery;
pub mod dispute;
pub mod manager;
pub mod memory;
pub mod models;
pub mod repository;
pub mod settlement;

pub use board::VendorOfferBoard;
pub use delivery::DeliveryVerification;
pub use dispute::{Dispute, DisputeOutcome, DisputeStatus, DisputeWorkflow};
pub use manager::OrderManager;
pub use memory::MemoryStore;
pub use models::{Order, OrderDraft, OrderItem, OrderStatus, OrderType, PaymentStatus};
pub use settlement::{SettlementBatch, SettlementBatcher, SettlementRules};

#[cfg(test)]
pub(crate) mod testkit;
