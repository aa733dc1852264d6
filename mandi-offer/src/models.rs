use chrono::{DateTime, Utc};
use mandi_core::{CoreError, CoreResult};
use mandi_shared::pii::Masked;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Vendor-side sub-lifecycle of an order. OFFERED offers past their window
/// are expired lazily at read/transition time; nothing sweeps them in the
/// background.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VendorOfferStatus {
    Offered,
    Accepted,
    InProgress,
    Ready,
    Delivered,
    Completed,
    Rejected,
    Withdrawn,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethod {
    Otp,
    Photo,
}

/// One vendor's view of an order. An order fans out to many of these; exactly
/// one may reach ACCEPTED, and acceptance withdraws the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorOffer {
    pub id: Uuid,
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub status: VendorOfferStatus,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub verification_method: Option<VerificationMethod>,
    /// Single-use code issued when the vendor marks READY, cleared on
    /// redemption. Masked in Debug output.
    pub delivery_otp: Option<Masked<String>>,
    pub delivery_evidence: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl VendorOffer {
    pub fn new(order_id: Uuid, vendor_id: Uuid, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            vendor_id,
            status: VendorOfferStatus::Offered,
            expires_at,
            accepted_at: None,
            rejected_at: None,
            ready_at: None,
            delivered_at: None,
            completed_at: None,
            rejection_reason: None,
            verification_method: None,
            delivery_otp: None,
            delivery_evidence: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Only an OFFERED offer can expire; later states have left the window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == VendorOfferStatus::Offered && now > self.expires_at
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == VendorOfferStatus::Offered && !self.is_expired(now)
    }

    /// Status as any reader should see it, with lazy expiry applied.
    pub fn effective_status(&self, now: DateTime<Utc>) -> VendorOfferStatus {
        if self.is_expired(now) {
            VendorOfferStatus::Expired
        } else {
            self.status.clone()
        }
    }

    fn update_status(&mut self, new_status: VendorOfferStatus, now: DateTime<Utc>) {
        self.status = new_status;
        self.updated_at = now;
    }

    fn invalid(&self, to: &str) -> CoreError {
        CoreError::InvalidTransition {
            from: format!("{:?}", self.status),
            to: to.to_string(),
        }
    }

    pub fn accept(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != VendorOfferStatus::Offered {
            return Err(self.invalid("ACCEPTED"));
        }
        if self.is_expired(now) {
            return Err(CoreError::Expired(format!("vendor offer {}", self.id)));
        }
        self.accepted_at = Some(now);
        self.update_status(VendorOfferStatus::Accepted, now);
        Ok(())
    }

    pub fn reject(&mut self, reason: String, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != VendorOfferStatus::Offered {
            return Err(self.invalid("REJECTED"));
        }
        if self.is_expired(now) {
            return Err(CoreError::Expired(format!("vendor offer {}", self.id)));
        }
        self.rejected_at = Some(now);
        self.rejection_reason = Some(reason);
        self.update_status(VendorOfferStatus::Rejected, now);
        Ok(())
    }

    /// Losing-sibling terminal state once another vendor accepts. Withdrawing
    /// an already-expired offer is allowed; the outcome is the same for the
    /// vendor either way.
    pub fn withdraw(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != VendorOfferStatus::Offered {
            return Err(self.invalid("WITHDRAWN"));
        }
        self.update_status(VendorOfferStatus::Withdrawn, now);
        Ok(())
    }

    pub fn start_progress(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != VendorOfferStatus::Accepted {
            return Err(self.invalid("IN_PROGRESS"));
        }
        self.update_status(VendorOfferStatus::InProgress, now);
        Ok(())
    }

    pub fn mark_ready(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if !matches!(
            self.status,
            VendorOfferStatus::Accepted | VendorOfferStatus::InProgress
        ) {
            return Err(self.invalid("READY"));
        }
        self.ready_at = Some(now);
        self.update_status(VendorOfferStatus::Ready, now);
        Ok(())
    }

    /// Issues the one-time code bound to this offer. Called by the board when
    /// the vendor marks READY; any previously issued code is replaced.
    pub fn issue_otp(&mut self, now: DateTime<Utc>) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.delivery_otp = Some(Masked(code.clone()));
        self.updated_at = now;
        code
    }

    /// OTP path: a matching code is the buyer's real-time attestation, so the
    /// offer jumps READY -> COMPLETED in one step, skipping DELIVERED. The
    /// code is consumed on success.
    pub fn redeem_otp(&mut self, code: &str, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != VendorOfferStatus::Ready {
            return Err(self.invalid("COMPLETED"));
        }
        let matches = self
            .delivery_otp
            .as_ref()
            .map(|issued| issued.0 == code)
            .unwrap_or(false);
        if !matches {
            return Err(CoreError::VerificationFailed(
                "OTP does not match the code issued for this delivery".to_string(),
            ));
        }
        self.delivery_otp = None;
        self.verification_method = Some(VerificationMethod::Otp);
        self.completed_at = Some(now);
        self.update_status(VendorOfferStatus::Completed, now);
        Ok(())
    }

    /// Photo path: vendor-attested only, so the offer stops at DELIVERED and
    /// waits for the buyer's confirmation window.
    pub fn record_photo_delivery(&mut self, evidence_ref: String, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != VendorOfferStatus::Ready {
            return Err(self.invalid("DELIVERED"));
        }
        self.verification_method = Some(VerificationMethod::Photo);
        self.delivery_evidence = Some(evidence_ref);
        self.delivered_at = Some(now);
        self.update_status(VendorOfferStatus::Delivered, now);
        Ok(())
    }

    /// Buyer's out-of-band confirmation promoting a photo delivery.
    pub fn confirm_receipt(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != VendorOfferStatus::Delivered {
            return Err(self.invalid("COMPLETED"));
        }
        self.completed_at = Some(now);
        self.update_status(VendorOfferStatus::Completed, now);
        Ok(())
    }

    /// Forced terminal state when the parent order is cancelled mid-flight.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if !matches!(
            self.status,
            VendorOfferStatus::Accepted | VendorOfferStatus::InProgress | VendorOfferStatus::Ready
        ) {
            return Err(self.invalid("CANCELLED"));
        }
        self.update_status(VendorOfferStatus::Cancelled, now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap()
    }

    fn offer() -> VendorOffer {
        VendorOffer::new(Uuid::new_v4(), Uuid::new_v4(), t0() + Duration::hours(1), t0())
    }

    #[test]
    fn accept_within_window() {
        let mut offer = offer();
        assert!(offer.is_open(t0()));
        offer.accept(t0() + Duration::minutes(10)).unwrap();
        assert_eq!(offer.status, VendorOfferStatus::Accepted);
        assert!(offer.accepted_at.is_some());
    }

    #[test]
    fn accept_after_window_is_expired() {
        let mut offer = offer();
        let late = t0() + Duration::hours(2);

        assert_eq!(offer.effective_status(late), VendorOfferStatus::Expired);
        let err = offer.accept(late).unwrap_err();
        assert!(matches!(err, CoreError::Expired(_)));
        // The stored status is untouched; expiry is a view, not a write.
        assert_eq!(offer.status, VendorOfferStatus::Offered);
    }

    #[test]
    fn otp_redemption_skips_delivered() {
        let mut offer = offer();
        let now = t0() + Duration::minutes(10);
        offer.accept(now).unwrap();
        offer.mark_ready(now).unwrap();
        let code = offer.issue_otp(now);

        offer.redeem_otp(&code, now).unwrap();
        assert_eq!(offer.status, VendorOfferStatus::Completed);
        assert!(offer.delivered_at.is_none());
        assert!(offer.delivery_otp.is_none(), "OTP is single-use");
    }

    #[test]
    fn wrong_otp_leaves_state_unchanged() {
        let mut offer = offer();
        let now = t0() + Duration::minutes(10);
        offer.accept(now).unwrap();
        offer.mark_ready(now).unwrap();
        offer.issue_otp(now);

        let err = offer.redeem_otp("000000", now).unwrap_err();
        assert!(matches!(err, CoreError::VerificationFailed(_)));
        assert_eq!(offer.status, VendorOfferStatus::Ready);
        assert!(offer.delivery_otp.is_some());
    }

    #[test]
    fn photo_delivery_requires_receipt_confirmation() {
        let mut offer = offer();
        let now = t0() + Duration::minutes(10);
        offer.accept(now).unwrap();
        offer.mark_ready(now).unwrap();

        offer
            .record_photo_delivery("s3://evidence/123.jpg".to_string(), now)
            .unwrap();
        assert_eq!(offer.status, VendorOfferStatus::Delivered);

        offer.confirm_receipt(now + Duration::hours(1)).unwrap();
        assert_eq!(offer.status, VendorOfferStatus::Completed);
    }

    #[test]
    fn reject_only_from_offered() {
        let mut offer = offer();
        let now = t0() + Duration::minutes(10);
        offer.accept(now).unwrap();

        let err = offer.reject("too far".to_string(), now).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }
}
