// Weighing Tracker - append-only weight batches per listing
//
// Live mode: entries are only accepted while the deal is locked in
// (RESERVED / SOLD / AWAITING_PAYMENT) and feed the settlement. A completion
// notification fires once the summed head count reaches the listing's
// declared quantity (soft check; excess is allowed).
//
// Dead mode: the farmer may record an internal weighing for reference; it is
// flagged `is_internal` and never gates the state machine.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::entities::{NewWeightEntry, WeightEntry, WeightMode};
use crate::error::{AppError, Result};
use crate::notify;
use crate::settlement::round2;
use crate::store;

/// Running totals returned after each insert
#[derive(Debug, Clone, Serialize)]
pub struct WeighingProgress {
    pub total_weighed: i64,
    pub remaining: i64,
}

/// Aggregated view of a listing's weighings
#[derive(Debug, Clone, Serialize)]
pub struct WeightSummary {
    pub data: Vec<WeightEntry>,
    pub total_batches: usize,
    pub total_quantity: i64,
    pub total_weight: f64,
}

/// Dead-mode internal weighing request: either record a batch or explicitly
/// skip weighing and mark the lot ready for transport
#[derive(Debug, Clone, Deserialize)]
pub struct InternalWeightRequest {
    #[serde(default)]
    pub perform_weighing: bool,
    pub batch_number: Option<i64>,
    pub quantity: Option<i64>,
    pub total_weight: Option<f64>,
}

/// Record a live-mode weight batch for a listing the caller owns
pub fn add_weight_entry(
    conn: &Connection,
    caller: &str,
    listing_id: &str,
    entry: NewWeightEntry,
) -> Result<WeighingProgress> {
    let listing = store::get_listing(conn, listing_id)?.ok_or(AppError::NotFound("Listing"))?;

    if listing.owner_id != caller {
        return Err(AppError::forbidden("Only the listing owner can record weights"));
    }
    if listing.weight_type != WeightMode::Live {
        return Err(AppError::ValidationFailed(
            "This listing is for dead weight. Use the internal weight endpoint for reference only."
                .to_string(),
        ));
    }
    if !listing.status.accepts_weighing() {
        return Err(AppError::wrong_status(
            "Listing",
            "RESERVED",
            listing.status.as_str(),
        ));
    }

    let record = WeightEntry::create(entry, listing_id, false);
    store::insert_weight_entry(conn, &record)?;

    let total_weighed: i64 = store::weights_for_listing(conn, listing_id)?
        .iter()
        .filter(|w| !w.is_internal)
        .map(|w| w.quantity)
        .sum();

    if total_weighed >= listing.quantity {
        notify::notify(
            conn,
            &listing.owner_id,
            &format!("Weighing completed for listing #{}", listing_id),
            serde_json::json!({
                "listing_id": listing_id,
                "total_weighed": total_weighed,
            }),
        );
    }

    Ok(WeighingProgress {
        total_weighed,
        remaining: listing.quantity - total_weighed,
    })
}

/// All recorded batches plus totals
pub fn weight_summary(conn: &Connection, listing_id: &str) -> Result<WeightSummary> {
    let entries = store::weights_for_listing(conn, listing_id)?;
    let total_quantity = entries.iter().map(|w| w.quantity).sum();
    let total_weight = round2(entries.iter().map(|w| w.total_weight).sum());
    Ok(WeightSummary {
        total_batches: entries.len(),
        total_quantity,
        total_weight,
        data: entries,
    })
}

/// Dead-mode internal weighing (informational). Returns whether a batch was
/// actually recorded.
pub fn record_internal_weight(
    conn: &Connection,
    caller: &str,
    listing_id: &str,
    request: InternalWeightRequest,
) -> Result<bool> {
    let mut listing =
        store::get_listing(conn, listing_id)?.ok_or(AppError::NotFound("Listing"))?;

    if listing.owner_id != caller {
        return Err(AppError::forbidden("Not authorized"));
    }
    if listing.weight_type != WeightMode::Dead {
        return Err(AppError::ValidationFailed(
            "Internal weight is only for dead weight transactions".to_string(),
        ));
    }

    if request.perform_weighing {
        let (quantity, total_weight) = match (request.quantity, request.total_weight) {
            (Some(q), Some(w)) => (q, w),
            _ => {
                return Err(AppError::ValidationFailed(
                    "quantity and total_weight are required when perform_weighing is true"
                        .to_string(),
                ))
            }
        };
        let entry = WeightEntry::create(
            NewWeightEntry {
                batch_number: request.batch_number.unwrap_or(1),
                quantity,
                total_weight,
                timestamp: None,
            },
            listing_id,
            true,
        );
        store::insert_weight_entry(conn, &entry)?;
        listing.internal_weight_recorded = true;
    } else {
        // Skip weighing, go straight to transport
        listing.internal_weight_skipped = true;
    }

    store::update_listing(conn, &listing)?;
    Ok(request.perform_weighing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Listing, ListingStatus, NewListing};

    fn setup(weight_type: WeightMode, status: ListingStatus) -> (Connection, Listing) {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();
        let mut listing = Listing::create(
            NewListing {
                race: "Nelore".to_string(),
                age: 24,
                sex: "M".to_string(),
                quantity: 10,
                state: "PA".to_string(),
                city: "Belém".to_string(),
                contact: "farmer@example.com".to_string(),
                category: None,
                estimated_weight: Some(450.0),
                availability_start: None,
                availability_end: None,
                weight_type,
                cattle_photo: None,
            },
            "farmer1",
        );
        listing.status = status;
        store::insert_listing(&conn, &listing).unwrap();
        (conn, listing)
    }

    fn batch(n: i64, qty: i64, weight: f64) -> NewWeightEntry {
        NewWeightEntry {
            batch_number: n,
            quantity: qty,
            total_weight: weight,
            timestamp: None,
        }
    }

    #[test]
    fn test_batches_accumulate_and_complete() {
        let (conn, listing) = setup(WeightMode::Live, ListingStatus::Reserved);

        let progress = add_weight_entry(&conn, "farmer1", &listing.id, batch(1, 4, 600.0)).unwrap();
        assert_eq!(progress.total_weighed, 4);
        assert_eq!(progress.remaining, 6);
        // not complete yet, no notification
        assert!(notify::notifications_for(&conn, "farmer1").unwrap().is_empty());

        let progress = add_weight_entry(&conn, "farmer1", &listing.id, batch(2, 6, 900.0)).unwrap();
        assert_eq!(progress.total_weighed, 10);
        assert_eq!(progress.remaining, 0);

        let notifs = notify::notifications_for(&conn, "farmer1").unwrap();
        assert_eq!(notifs.len(), 1);
        assert!(notifs[0].message.contains("Weighing completed"));

        let summary = weight_summary(&conn, &listing.id).unwrap();
        assert_eq!(summary.total_batches, 2);
        assert_eq!(summary.total_quantity, 10);
        assert_eq!(summary.total_weight, 1500.0);
    }

    #[test]
    fn test_only_owner_may_weigh() {
        let (conn, listing) = setup(WeightMode::Live, ListingStatus::Reserved);
        let err = add_weight_entry(&conn, "intruder", &listing.id, batch(1, 4, 600.0)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_open_listing_rejects_weighing() {
        let (conn, listing) = setup(WeightMode::Live, ListingStatus::Open);
        let err = add_weight_entry(&conn, "farmer1", &listing.id, batch(1, 4, 600.0)).unwrap_err();
        match err {
            AppError::PreconditionFailed(msg) => assert!(msg.contains("RESERVED")),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_dead_mode_rejects_live_endpoint() {
        let (conn, listing) = setup(WeightMode::Dead, ListingStatus::Reserved);
        let err = add_weight_entry(&conn, "farmer1", &listing.id, batch(1, 4, 600.0)).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[test]
    fn test_internal_weight_records_flag() {
        let (conn, listing) = setup(WeightMode::Dead, ListingStatus::Reserved);

        let weighed = record_internal_weight(
            &conn,
            "farmer1",
            &listing.id,
            InternalWeightRequest {
                perform_weighing: true,
                batch_number: Some(1),
                quantity: Some(10),
                total_weight: Some(1400.0),
            },
        )
        .unwrap();
        assert!(weighed);

        let loaded = store::get_listing(&conn, &listing.id).unwrap().unwrap();
        assert!(loaded.internal_weight_recorded);

        let entries = store::weights_for_listing(&conn, &listing.id).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_internal);
    }

    #[test]
    fn test_internal_weight_skip_path() {
        let (conn, listing) = setup(WeightMode::Dead, ListingStatus::Reserved);

        let weighed = record_internal_weight(
            &conn,
            "farmer1",
            &listing.id,
            InternalWeightRequest {
                perform_weighing: false,
                batch_number: None,
                quantity: None,
                total_weight: None,
            },
        )
        .unwrap();
        assert!(!weighed);

        let loaded = store::get_listing(&conn, &listing.id).unwrap().unwrap();
        assert!(loaded.internal_weight_skipped);
        assert!(!loaded.internal_weight_recorded);
    }
}
