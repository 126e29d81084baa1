// Demand Request - a buyer's standing purchase interest
//
// Immutable after creation except by admin deletion. Matched against supply
// listings on location, breed and age range.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One target region; `city == "ANY"` covers the entire state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRegion {
    pub state: String,
    pub city: String,
}

impl TargetRegion {
    /// True when this region covers the given listing location
    pub fn covers(&self, state: &str, city: &str) -> bool {
        self.state == state && (self.city == "ANY" || self.city == city)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandRequest {
    pub id: String,
    pub owner_id: String,

    pub targets: Vec<TargetRegion>,
    /// Breed filter; "Any" matches every breed
    pub race: String,
    pub age_min: i64,
    pub age_max: i64,
    pub sex: String,
    pub quantity: i64,
    pub contact: String,

    pub created_at: DateTime<Utc>,
}

/// Payload for creating a demand request
#[derive(Debug, Clone, Deserialize)]
pub struct NewDemand {
    pub targets: Vec<TargetRegion>,
    pub race: String,
    #[serde(default)]
    pub age_min: Option<i64>,
    #[serde(default)]
    pub age_max: Option<i64>,
    pub sex: String,
    pub quantity: i64,
    pub contact: String,
}

impl DemandRequest {
    pub fn create(data: NewDemand, owner_id: &str) -> Self {
        DemandRequest {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            targets: data.targets,
            race: data.race,
            age_min: data.age_min.unwrap_or(0),
            age_max: data.age_max.unwrap_or(100),
            sex: data.sex,
            quantity: data.quantity,
            contact: data.contact,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_covers() {
        let whole_state = TargetRegion {
            state: "PA".to_string(),
            city: "ANY".to_string(),
        };
        assert!(whole_state.covers("PA", "Belém"));
        assert!(whole_state.covers("PA", "Santarém"));
        assert!(!whole_state.covers("SP", "Campinas"));

        let one_city = TargetRegion {
            state: "PA".to_string(),
            city: "Santarém".to_string(),
        };
        assert!(one_city.covers("PA", "Santarém"));
        assert!(!one_city.covers("PA", "Belém"));
    }

    #[test]
    fn test_age_defaults() {
        let demand = DemandRequest::create(
            NewDemand {
                targets: vec![],
                race: "Any".to_string(),
                age_min: None,
                age_max: None,
                sex: "Any".to_string(),
                quantity: 50,
                contact: "buyer@example.com".to_string(),
            },
            "buyer1",
        );
        assert_eq!(demand.age_min, 0);
        assert_eq!(demand.age_max, 100);
    }
}
