// Weight Entry - one weighing batch for a listing
//
// Append-only. Live-mode entries gate settlement; internal (dead-mode)
// entries are informational and never drive the state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightEntry {
    pub id: String,
    pub listing_id: String,
    pub batch_number: i64,
    /// Head count in this batch
    pub quantity: i64,
    /// Batch weight in kg
    pub total_weight: f64,
    /// Farmer's own dead-mode weighing, for reference only
    pub is_internal: bool,
    pub timestamp: DateTime<Utc>,
}

/// Payload for recording a weighing batch
#[derive(Debug, Clone, Deserialize)]
pub struct NewWeightEntry {
    pub batch_number: i64,
    pub quantity: i64,
    pub total_weight: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WeightEntry {
    pub fn create(data: NewWeightEntry, listing_id: &str, is_internal: bool) -> Self {
        WeightEntry {
            id: uuid::Uuid::new_v4().to_string(),
            listing_id: listing_id.to_string(),
            batch_number: data.batch_number,
            quantity: data.quantity,
            total_weight: data.total_weight,
            is_internal,
            timestamp: data.timestamp.unwrap_or_else(Utc::now),
        }
    }
}
