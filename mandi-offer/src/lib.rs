pub mod models;

pub use models::{VendorOffer, VendorOfferStatus, VerificationMethod};
