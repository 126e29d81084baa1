// Match Scanner - pairs new supply with standing demand (and vice versa)
//
// A candidate (listing, demand) pair matches only when all three criteria
// hold:
//   1. Location: some target region has the listing's state and either
//      city "ANY" or the listing's city.
//   2. Breed: demand filter is "Any" or equals the listing's breed.
//   3. Age: demand age_min <= listing age <= age_max.
//
// For every match, both owners get an in-app notification and a best-effort
// email to their recorded contact. Email failures are logged, never raised.

use rusqlite::Connection;

use crate::entities::{DemandRequest, Listing};
use crate::error::Result;
use crate::mailer::{self, MailSender, MatchDetails};
use crate::notify;

/// The full three-criterion match check
pub fn is_match(listing: &Listing, demand: &DemandRequest) -> bool {
    // 1. Geographic location
    let location_match = demand
        .targets
        .iter()
        .any(|t| t.covers(&listing.state, &listing.city));
    if !location_match {
        return false;
    }

    // 2. Breed ("Any" is a wildcard)
    if demand.race != "Any" && demand.race != listing.race {
        return false;
    }

    // 3. Age range
    demand.age_min <= listing.age && listing.age <= demand.age_max
}

/// New supply listing: scan all standing demand. Returns the match count.
pub fn scan_for_listing(
    conn: &Connection,
    mailer: &dyn MailSender,
    listing: &Listing,
) -> Result<usize> {
    let demands = crate::store::all_demands(conn)?;
    let mut matches = 0;

    for demand in &demands {
        if !is_match(listing, demand) {
            continue;
        }
        matches += 1;
        notify_pair(conn, mailer, listing, demand, true);
    }

    Ok(matches)
}

/// New demand request: scan all OPEN supply. Returns the match count.
pub fn scan_for_demand(
    conn: &Connection,
    mailer: &dyn MailSender,
    demand: &DemandRequest,
) -> Result<usize> {
    let listings = crate::store::open_listings(conn)?;
    let mut matches = 0;

    for listing in &listings {
        if !is_match(listing, demand) {
            continue;
        }
        matches += 1;
        notify_pair(conn, mailer, listing, demand, false);
    }

    Ok(matches)
}

/// Notify both sides of a matched pair. `listing_is_new` flips who is the
/// submitter and who holds the older record.
fn notify_pair(
    conn: &Connection,
    mailer: &dyn MailSender,
    listing: &Listing,
    demand: &DemandRequest,
    listing_is_new: bool,
) {
    let farmer_details = MatchDetails {
        role: "Matched with Buyer".to_string(),
        contact: Some(demand.contact.clone()),
        race: demand.race.clone(),
        quantity: demand.quantity,
        location: listing.city.clone(),
    };
    let buyer_details = MatchDetails {
        role: if listing_is_new {
            "New Farmer matched you".to_string()
        } else {
            "Matched with Farmer".to_string()
        },
        contact: Some(listing.contact.clone()),
        race: listing.race.clone(),
        quantity: listing.quantity,
        location: listing.city.clone(),
    };

    let (farmer_subject, buyer_subject) = if listing_is_new {
        ("Match Found: New Deal Available!", "New Interest in your Listing!")
    } else {
        ("New Interest in your Listing!", "Match Found: New Deal Available!")
    };

    notify::notify(
        conn,
        &listing.owner_id,
        farmer_subject,
        serde_json::to_value(&farmer_details).unwrap_or_default(),
    );
    mailer::send_match_email(mailer, &listing.contact, farmer_subject, &farmer_details);

    notify::notify(
        conn,
        &demand.owner_id,
        buyer_subject,
        serde_json::to_value(&buyer_details).unwrap_or_default(),
    );
    mailer::send_match_email(mailer, &demand.contact, buyer_subject, &buyer_details);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{NewDemand, NewListing, TargetRegion, WeightMode};
    use crate::mailer::testing::RecordingMailer;
    use crate::store;

    fn pa_listing(city: &str, race: &str, age: i64) -> Listing {
        Listing::create(
            NewListing {
                race: race.to_string(),
                age,
                sex: "M".to_string(),
                quantity: 10,
                state: "PA".to_string(),
                city: city.to_string(),
                contact: "farmer@example.com".to_string(),
                category: None,
                estimated_weight: Some(450.0),
                availability_start: None,
                availability_end: None,
                weight_type: WeightMode::Live,
                cattle_photo: None,
            },
            "farmer1",
        )
    }

    fn demand(targets: Vec<TargetRegion>, race: &str, age_min: i64, age_max: i64) -> DemandRequest {
        DemandRequest::create(
            NewDemand {
                targets,
                race: race.to_string(),
                age_min: Some(age_min),
                age_max: Some(age_max),
                sex: "M".to_string(),
                quantity: 50,
                contact: "buyer@example.com".to_string(),
            },
            "buyer1",
        )
    }

    fn region(state: &str, city: &str) -> TargetRegion {
        TargetRegion {
            state: state.to_string(),
            city: city.to_string(),
        }
    }

    #[test]
    fn test_any_city_wildcard_matches() {
        // farmer {PA, Belém, Nelore, 24} vs buyer {PA, ANY}, "Any", [0, 36]
        let listing = pa_listing("Belém", "Nelore", 24);
        let buyer = demand(vec![region("PA", "ANY")], "Any", 0, 36);
        assert!(is_match(&listing, &buyer));
    }

    #[test]
    fn test_different_city_fails() {
        // same farmer vs buyer target {PA, Santarém}
        let listing = pa_listing("Belém", "Nelore", 24);
        let buyer = demand(vec![region("PA", "Santarém")], "Any", 0, 36);
        assert!(!is_match(&listing, &buyer));
    }

    #[test]
    fn test_breed_filter() {
        let listing = pa_listing("Belém", "Nelore", 24);
        let angus_only = demand(vec![region("PA", "ANY")], "Angus", 0, 100);
        assert!(!is_match(&listing, &angus_only));

        let nelore = demand(vec![region("PA", "ANY")], "Nelore", 0, 100);
        assert!(is_match(&listing, &nelore));
    }

    #[test]
    fn test_age_range_is_inclusive() {
        let listing = pa_listing("Belém", "Nelore", 36);
        assert!(is_match(&listing, &demand(vec![region("PA", "ANY")], "Any", 0, 36)));
        assert!(!is_match(&listing, &demand(vec![region("PA", "ANY")], "Any", 0, 35)));
        assert!(!is_match(&listing, &demand(vec![region("PA", "ANY")], "Any", 37, 60)));
    }

    #[test]
    fn test_any_target_region_suffices() {
        let listing = pa_listing("Belém", "Nelore", 24);
        let buyer = demand(
            vec![region("MT", "ANY"), region("PA", "Belém")],
            "Any",
            0,
            100,
        );
        assert!(is_match(&listing, &buyer));
    }

    #[test]
    fn test_scan_notifies_both_sides_and_counts() {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();

        let matching = demand(vec![region("PA", "ANY")], "Any", 0, 36);
        let non_matching = demand(vec![region("SP", "ANY")], "Any", 0, 36);
        store::insert_demand(&conn, &matching).unwrap();
        store::insert_demand(&conn, &non_matching).unwrap();

        let listing = pa_listing("Belém", "Nelore", 24);
        store::insert_listing(&conn, &listing).unwrap();

        let mailer = RecordingMailer::new();
        let count = scan_for_listing(&conn, &mailer, &listing).unwrap();
        assert_eq!(count, 1);

        // one notification per side
        assert_eq!(notify::notifications_for(&conn, "farmer1").unwrap().len(), 1);
        assert_eq!(notify::notifications_for(&conn, "buyer1").unwrap().len(), 1);

        // one email per side (both contacts look like emails)
        assert_eq!(mailer.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_scan_for_demand_only_sees_open_listings() {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();

        let open = pa_listing("Belém", "Nelore", 24);
        let mut reserved = pa_listing("Belém", "Nelore", 24);
        reserved.status = crate::entities::ListingStatus::Reserved;
        store::insert_listing(&conn, &open).unwrap();
        store::insert_listing(&conn, &reserved).unwrap();

        let buyer = demand(vec![region("PA", "ANY")], "Any", 0, 36);
        store::insert_demand(&conn, &buyer).unwrap();

        let mailer = RecordingMailer::new();
        let count = scan_for_demand(&conn, &mailer, &buyer).unwrap();
        assert_eq!(count, 1);
    }
}
