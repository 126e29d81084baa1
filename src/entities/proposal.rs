// Proposal - a buyer's offer against an OPEN listing
//
// Status path: PENDING → ACCEPTED → PAID, or PENDING → REJECTED (terminal).
// Only the listing owner accepts or rejects; both are legal only from PENDING.
// At most one proposal per listing may sit in ACCEPTED/PAID at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Paid,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "PENDING",
            ProposalStatus::Accepted => "ACCEPTED",
            ProposalStatus::Paid => "PAID",
            ProposalStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ProposalStatus::Pending),
            "ACCEPTED" => Some(ProposalStatus::Accepted),
            "PAID" => Some(ProposalStatus::Paid),
            "REJECTED" => Some(ProposalStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub supply_id: String,
    pub buyer_id: String,
    pub buyer_contact: String,

    /// Lump-sum offer for the whole lot
    pub price_offer: f64,
    /// Price per arroba (@); when absent it is derived at settlement from
    /// the offer and the listing's estimated weight
    pub price_per_unit: Option<f64>,
    pub message: Option<String>,
    pub loading_date: Option<String>,
    pub conditions: Option<String>,

    pub status: ProposalStatus,

    // Reservation deposit bookkeeping; the refund happens at most once
    pub deposit_amount: Option<f64>,
    pub deposit_paid_at: Option<DateTime<Utc>>,
    pub deposit_refunded: bool,
    pub deposit_refunded_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// Payload for creating a proposal
#[derive(Debug, Clone, Deserialize)]
pub struct NewProposal {
    pub supply_id: String,
    pub price_offer: f64,
    #[serde(default)]
    pub message: Option<String>,
    pub loading_date: Option<String>,
    pub conditions: Option<String>,
    pub price_per_unit: Option<f64>,
}

impl Proposal {
    pub fn create(data: NewProposal, buyer_id: &str, buyer_contact: &str) -> Self {
        Proposal {
            id: uuid::Uuid::new_v4().to_string(),
            supply_id: data.supply_id,
            buyer_id: buyer_id.to_string(),
            buyer_contact: buyer_contact.to_string(),
            price_offer: data.price_offer,
            price_per_unit: data.price_per_unit,
            message: data.message,
            loading_date: data.loading_date,
            conditions: data.conditions,
            status: ProposalStatus::Pending,
            deposit_amount: None,
            deposit_paid_at: None,
            deposit_refunded: false,
            deposit_refunded_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ProposalStatus::Pending,
            ProposalStatus::Accepted,
            ProposalStatus::Paid,
            ProposalStatus::Rejected,
        ] {
            assert_eq!(ProposalStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_new_proposal_starts_pending() {
        let prop = Proposal::create(
            NewProposal {
                supply_id: "listing1".to_string(),
                price_offer: 10000.0,
                message: None,
                loading_date: None,
                conditions: None,
                price_per_unit: None,
            },
            "buyer1",
            "+55 91 99999-0000",
        );
        assert_eq!(prop.status, ProposalStatus::Pending);
        assert!(prop.deposit_amount.is_none());
        assert!(!prop.deposit_refunded);
    }
}
