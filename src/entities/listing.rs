// Supply Listing - a farmer's offer of a cattle lot
//
// The listing carries the deal's primary status field. Status only ever moves
// forward along:
//
//   OPEN → AWAITING_PAYMENT → RESERVED → AWAITING_FINAL_PAYMENT
//        → FINAL_PAYMENT_PAID → COMPLETED
//
// COMPLETED is terminal. Admins can delete a listing at any state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// WEIGHT MODE
// ============================================================================

/// Pricing basis for the lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightMode {
    /// Pre-slaughter weight, recorded batch by batch on the farm
    Live,
    /// Post-slaughter carcass weight, reported by the slaughterhouse
    Dead,
}

impl WeightMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightMode::Live => "live",
            WeightMode::Dead => "dead",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "live" => Some(WeightMode::Live),
            "dead" => Some(WeightMode::Dead),
            _ => None,
        }
    }
}

impl Default for WeightMode {
    fn default() -> Self {
        WeightMode::Live
    }
}

// ============================================================================
// LISTING STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Open,
    AwaitingPayment,
    Reserved,
    /// Legacy alias for Reserved kept in stored data; still weighing-eligible
    Sold,
    AwaitingFinalPayment,
    FinalPaymentPaid,
    Completed,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Open => "OPEN",
            ListingStatus::AwaitingPayment => "AWAITING_PAYMENT",
            ListingStatus::Reserved => "RESERVED",
            ListingStatus::Sold => "SOLD",
            ListingStatus::AwaitingFinalPayment => "AWAITING_FINAL_PAYMENT",
            ListingStatus::FinalPaymentPaid => "FINAL_PAYMENT_PAID",
            ListingStatus::Completed => "COMPLETED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(ListingStatus::Open),
            "AWAITING_PAYMENT" => Some(ListingStatus::AwaitingPayment),
            "RESERVED" => Some(ListingStatus::Reserved),
            "SOLD" => Some(ListingStatus::Sold),
            "AWAITING_FINAL_PAYMENT" => Some(ListingStatus::AwaitingFinalPayment),
            "FINAL_PAYMENT_PAID" => Some(ListingStatus::FinalPaymentPaid),
            "COMPLETED" => Some(ListingStatus::Completed),
            _ => None,
        }
    }

    /// Weight entries may only be recorded while the deal is locked in
    pub fn accepts_weighing(&self) -> bool {
        matches!(
            self,
            ListingStatus::Reserved | ListingStatus::Sold | ListingStatus::AwaitingPayment
        )
    }
}

// ============================================================================
// LISTING RECORD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub owner_id: String,

    /// Breed, e.g. "Nelore"
    pub race: String,
    pub age: i64,
    pub sex: String,
    pub quantity: i64,
    pub state: String,
    pub city: String,
    pub contact: String,

    pub category: Option<String>,
    /// Estimated weight per head in kg, used to derive a price per arroba
    /// when the proposal does not fix one
    pub estimated_weight: Option<f64>,
    pub availability_start: Option<String>,
    pub availability_end: Option<String>,
    pub weight_type: WeightMode,
    pub cattle_photo: Option<String>,

    pub status: ListingStatus,
    /// Set when a proposal is accepted
    pub buyer_id: Option<String>,
    /// Set when the deal is finalized; one active transaction per listing
    pub transaction_id: Option<String>,

    // Dead-weight side channel: internal weighing is informational only
    pub internal_weight_recorded: bool,
    pub internal_weight_skipped: bool,

    // Symbolic advance payment (pauta value) requested by the farmer
    pub pauta_value_requested: Option<f64>,
    pub advance_payment_status: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Payload for creating a listing
#[derive(Debug, Clone, Deserialize)]
pub struct NewListing {
    pub race: String,
    pub age: i64,
    pub sex: String,
    pub quantity: i64,
    pub state: String,
    pub city: String,
    pub contact: String,
    pub category: Option<String>,
    pub estimated_weight: Option<f64>,
    pub availability_start: Option<String>,
    pub availability_end: Option<String>,
    #[serde(default)]
    pub weight_type: WeightMode,
    pub cattle_photo: Option<String>,
}

impl Listing {
    /// Build a fresh OPEN listing owned by `owner_id`
    pub fn create(data: NewListing, owner_id: &str) -> Self {
        Listing {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            race: data.race,
            age: data.age,
            sex: data.sex,
            quantity: data.quantity,
            state: data.state,
            city: data.city,
            contact: data.contact,
            category: data.category,
            estimated_weight: data.estimated_weight,
            availability_start: data.availability_start,
            availability_end: data.availability_end,
            weight_type: data.weight_type,
            cattle_photo: data.cattle_photo,
            status: ListingStatus::Open,
            buyer_id: None,
            transaction_id: None,
            internal_weight_recorded: false,
            internal_weight_skipped: false,
            pauta_value_requested: None,
            advance_payment_status: None,
            created_at: Utc::now(),
        }
    }
}
