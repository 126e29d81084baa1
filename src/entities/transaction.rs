// Transaction - the settlement record created at finalization
//
// Exactly one active transaction per listing. Holds the computed amounts
// (gross, net, yield rate, price per arroba, fees) and its own status:
//
//   awaiting_weighing | awaiting_slaughterhouse_weight
//     → awaiting_final_payment → final_payment_paid → completed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::listing::WeightMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Live mode but no weight entries yet at finalization
    AwaitingWeighing,
    /// Dead mode: carcass weight still to be reported
    AwaitingSlaughterhouseWeight,
    AwaitingFinalPayment,
    FinalPaymentPaid,
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::AwaitingWeighing => "awaiting_weighing",
            TransactionStatus::AwaitingSlaughterhouseWeight => "awaiting_slaughterhouse_weight",
            TransactionStatus::AwaitingFinalPayment => "awaiting_final_payment",
            TransactionStatus::FinalPaymentPaid => "final_payment_paid",
            TransactionStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "awaiting_weighing" => Some(TransactionStatus::AwaitingWeighing),
            "awaiting_slaughterhouse_weight" => {
                Some(TransactionStatus::AwaitingSlaughterhouseWeight)
            }
            "awaiting_final_payment" => Some(TransactionStatus::AwaitingFinalPayment),
            "final_payment_paid" => Some(TransactionStatus::FinalPaymentPaid),
            "completed" => Some(TransactionStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub listing_id: String,
    pub proposal_id: String,

    pub weight_type: WeightMode,
    pub status: TransactionStatus,

    // Settlement documents (invoice / animal transport permit)
    pub nfe_document: Option<String>,
    pub gta_document: Option<String>,

    pub transport_fee: f64,
    pub funrural_tax: f64,

    // Computed at settlement; None until the weight basis is known
    pub total_weight: Option<f64>,
    /// Weight converted to arrobas (15 kg units)
    pub unit_count: Option<f64>,
    pub yield_rate: Option<f64>,
    pub price_per_unit: Option<f64>,
    pub gross_amount: Option<f64>,
    pub final_amount: Option<f64>,

    pub final_payment_paid_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// New settlement record for a listing/proposal pair, before any
    /// amounts are computed
    pub fn create(
        listing_id: &str,
        proposal_id: &str,
        weight_type: WeightMode,
        status: TransactionStatus,
        transport_fee: f64,
        funrural_tax: f64,
    ) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            listing_id: listing_id.to_string(),
            proposal_id: proposal_id.to_string(),
            weight_type,
            status,
            nfe_document: None,
            gta_document: None,
            transport_fee,
            funrural_tax,
            total_weight: None,
            unit_count: None,
            yield_rate: None,
            price_per_unit: None,
            gross_amount: None,
            final_amount: None,
            final_payment_paid_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }
}
