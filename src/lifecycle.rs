// Deal Lifecycle State Machine - the core of the marketplace
//
// Governs listing status, proposal status and transaction status, and the
// legal transitions between them:
//
//   Listing:  OPEN → AWAITING_PAYMENT → RESERVED → AWAITING_FINAL_PAYMENT
//                  → FINAL_PAYMENT_PAID → COMPLETED
//   Proposal: PENDING → ACCEPTED → PAID   (or PENDING → REJECTED)
//   Transaction: awaiting_* → awaiting_final_payment → final_payment_paid
//                → completed
//
// Every operation checks ownership and the expected prior state before
// touching any record; a disallowed transition fails with a precondition
// error naming the expected status. Notifications are fire-and-forget.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entities::{
    DemandRequest, Listing, ListingStatus, NewDemand, NewListing, NewProposal, Proposal,
    ProposalStatus, Role, Transaction, TransactionStatus, WeightMode,
};
use crate::error::{AppError, Result};
use crate::mailer::MailSender;
use crate::matcher;
use crate::notify;
use crate::settlement::{
    self, dead_settlement, live_settlement, validate_yield_rate, DEFAULT_YIELD_RATE,
    RESERVATION_DEPOSIT,
};
use crate::store;

// ============================================================================
// REQUEST / RESPONSE PAYLOADS
// ============================================================================

/// Result of creating a listing or demand: new id plus match count
#[derive(Debug, Clone, Serialize)]
pub struct CreatedWithMatches {
    pub id: String,
    pub matches: usize,
}

/// Final settlement submission by the farmer
#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeRequest {
    pub nfe_document: Option<String>,
    pub gta_document: Option<String>,
    #[serde(default)]
    pub transport_fee: f64,
    #[serde(default)]
    pub funrural_tax: f64,
    #[serde(default = "default_yield_rate")]
    pub yield_rate: f64,
}

fn default_yield_rate() -> f64 {
    DEFAULT_YIELD_RATE
}

/// Carcass weight reported after slaughter (dead-weight mode)
#[derive(Debug, Clone, Deserialize)]
pub struct SlaughterhouseWeight {
    pub final_weight: f64,
    #[serde(default = "default_yield_rate")]
    pub yield_rate: f64,
    pub price_per_unit: f64,
}

/// Receipt returned when the reservation deposit is paid
#[derive(Debug, Clone, Serialize)]
pub struct DepositReceipt {
    pub deposit_amount: f64,
    pub status: ListingStatus,
    pub listing_id: String,
}

/// Outcome of the farmer confirming final payment receipt
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub refund_amount: f64,
    pub status: TransactionStatus,
}

/// Listing snapshot embedded in proposal views
#[derive(Debug, Clone, Serialize)]
pub struct SupplyDetail {
    pub race: String,
    pub quantity: i64,
    pub location: String,
    pub city: String,
    pub state: String,
    pub age: i64,
    pub weight: Option<f64>,
    pub weight_type: WeightMode,
    pub category: Option<String>,
    pub photo: Option<String>,
}

impl SupplyDetail {
    fn from_listing(listing: &Listing) -> Self {
        SupplyDetail {
            race: listing.race.clone(),
            quantity: listing.quantity,
            location: format!("{}, {}", listing.city, listing.state),
            city: listing.city.clone(),
            state: listing.state.clone(),
            age: listing.age,
            weight: listing.estimated_weight,
            weight_type: listing.weight_type,
            category: listing.category.clone(),
            photo: listing.cattle_photo.clone(),
        }
    }
}

/// Proposal plus the listing it targets
#[derive(Debug, Clone, Serialize)]
pub struct ProposalView {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub supply_detail: Option<SupplyDetail>,
}

// ============================================================================
// CREATION (triggers the match scanner)
// ============================================================================

/// Create a supply listing and scan standing demand for matches
pub fn create_listing(
    conn: &Connection,
    mailer: &dyn MailSender,
    caller: &str,
    data: NewListing,
) -> Result<CreatedWithMatches> {
    let listing = Listing::create(data, caller);
    store::insert_listing(conn, &listing)?;

    let matches = matcher::scan_for_listing(conn, mailer, &listing)?;
    info!(listing = %listing.id, matches, "supply listing created");

    Ok(CreatedWithMatches {
        id: listing.id,
        matches,
    })
}

/// Create a demand request and scan open supply for matches
pub fn create_demand(
    conn: &Connection,
    mailer: &dyn MailSender,
    caller: &str,
    data: NewDemand,
) -> Result<CreatedWithMatches> {
    let demand = DemandRequest::create(data, caller);
    store::insert_demand(conn, &demand)?;

    let matches = matcher::scan_for_demand(conn, mailer, &demand)?;
    info!(demand = %demand.id, matches, "demand request created");

    Ok(CreatedWithMatches {
        id: demand.id,
        matches,
    })
}

/// Create a proposal against an OPEN listing. Farmers cannot buy.
pub fn create_proposal(conn: &Connection, caller: &str, data: NewProposal) -> Result<String> {
    let listing =
        store::get_listing(conn, &data.supply_id)?.ok_or(AppError::NotFound("Listing"))?;

    if listing.status != ListingStatus::Open {
        return Err(AppError::wrong_status(
            "Listing",
            ListingStatus::Open.as_str(),
            listing.status.as_str(),
        ));
    }

    let user = store::get_user(conn, caller)?.ok_or(AppError::NotFound("User"))?;
    if user.role == Role::Farmer {
        return Err(AppError::forbidden("Farmers cannot buy"));
    }

    let price_offer = data.price_offer;
    let prop = Proposal::create(data, caller, &user.phone);
    store::insert_proposal(conn, &prop)?;

    notify::notify(
        conn,
        &listing.owner_id,
        &format!("New Offer: R$ {}", price_offer),
        serde_json::to_value(&prop).unwrap_or_default(),
    );

    Ok(prop.id)
}

// ============================================================================
// PROPOSAL DECISIONS (listing owner only)
// ============================================================================

/// OPEN → AWAITING_PAYMENT: the farmer accepts one pending proposal.
/// Checking the listing is still OPEN guarantees at most one proposal per
/// listing ever reaches ACCEPTED/PAID.
pub fn accept_proposal(conn: &Connection, caller: &str, proposal_id: &str) -> Result<()> {
    let mut prop =
        store::get_proposal(conn, proposal_id)?.ok_or(AppError::NotFound("Proposal"))?;
    let mut listing =
        store::get_listing(conn, &prop.supply_id)?.ok_or(AppError::NotFound("Listing"))?;

    if listing.owner_id != caller {
        return Err(AppError::forbidden(
            "Only the seller can accept or reject proposals",
        ));
    }
    if prop.status != ProposalStatus::Pending {
        return Err(AppError::wrong_status(
            "Proposal",
            ProposalStatus::Pending.as_str(),
            prop.status.as_str(),
        ));
    }
    if listing.status != ListingStatus::Open {
        return Err(AppError::wrong_status(
            "Listing",
            ListingStatus::Open.as_str(),
            listing.status.as_str(),
        ));
    }

    prop.status = ProposalStatus::Accepted;
    listing.status = ListingStatus::AwaitingPayment;
    listing.buyer_id = Some(prop.buyer_id.clone());
    store::update_proposal(conn, &prop)?;
    store::update_listing(conn, &listing)?;

    notify::notify(
        conn,
        &prop.buyer_id,
        "Offer Accepted! Pay reservation deposit to lock the deal.",
        serde_json::to_value(&prop).unwrap_or_default(),
    );

    Ok(())
}

/// Reject a pending proposal. Legal only from PENDING, so an accepted or
/// already-paid deal cannot be torn down through this path.
pub fn reject_proposal(conn: &Connection, caller: &str, proposal_id: &str) -> Result<()> {
    let mut prop =
        store::get_proposal(conn, proposal_id)?.ok_or(AppError::NotFound("Proposal"))?;
    let listing =
        store::get_listing(conn, &prop.supply_id)?.ok_or(AppError::NotFound("Listing"))?;

    if listing.owner_id != caller {
        return Err(AppError::forbidden(
            "Only the seller can accept or reject proposals",
        ));
    }
    if prop.status != ProposalStatus::Pending {
        return Err(AppError::wrong_status(
            "Proposal",
            ProposalStatus::Pending.as_str(),
            prop.status.as_str(),
        ));
    }

    prop.status = ProposalStatus::Rejected;
    store::update_proposal(conn, &prop)?;
    Ok(())
}

// ============================================================================
// RESERVATION DEPOSIT (buyer)
// ============================================================================

/// AWAITING_PAYMENT → RESERVED: the buyer pays the fixed reservation deposit
pub fn pay_reservation(conn: &Connection, caller: &str, proposal_id: &str) -> Result<DepositReceipt> {
    let mut prop =
        store::get_proposal(conn, proposal_id)?.ok_or(AppError::NotFound("Proposal"))?;

    if prop.buyer_id != caller {
        return Err(AppError::forbidden("Only the buyer can pay the deposit"));
    }
    if prop.status != ProposalStatus::Accepted {
        return Err(AppError::wrong_status(
            "Proposal",
            ProposalStatus::Accepted.as_str(),
            prop.status.as_str(),
        ));
    }

    let mut listing =
        store::get_listing(conn, &prop.supply_id)?.ok_or(AppError::NotFound("Listing"))?;
    if listing.status != ListingStatus::AwaitingPayment {
        return Err(AppError::wrong_status(
            "Listing",
            ListingStatus::AwaitingPayment.as_str(),
            listing.status.as_str(),
        ));
    }

    listing.status = ListingStatus::Reserved;
    prop.status = ProposalStatus::Paid;
    prop.deposit_amount = Some(RESERVATION_DEPOSIT);
    prop.deposit_paid_at = Some(Utc::now());
    store::update_listing(conn, &listing)?;
    store::update_proposal(conn, &prop)?;

    notify::notify(
        conn,
        &listing.owner_id,
        "Reservation deposit received! You can now start weighing.",
        serde_json::json!({
            "listing_id": prop.supply_id,
            "proposal_id": proposal_id,
            "next_action": "Start weighing",
        }),
    );

    Ok(DepositReceipt {
        deposit_amount: RESERVATION_DEPOSIT,
        status: ListingStatus::Reserved,
        listing_id: prop.supply_id,
    })
}

// ============================================================================
// FINALIZATION & SETTLEMENT (farmer)
// ============================================================================

/// RESERVED → AWAITING_FINAL_PAYMENT: the farmer submits settlement
/// documents; the settlement is computed and the Transaction created.
/// The yield rate is validated before any record is mutated.
pub fn finalize_listing(
    conn: &Connection,
    caller: &str,
    listing_id: &str,
    request: FinalizeRequest,
) -> Result<Transaction> {
    validate_yield_rate(request.yield_rate)?;

    let mut listing =
        store::get_listing(conn, listing_id)?.ok_or(AppError::NotFound("Listing"))?;
    if listing.owner_id != caller {
        return Err(AppError::forbidden("Only the seller can finalize"));
    }
    if listing.status != ListingStatus::Reserved {
        return Err(AppError::wrong_status(
            "Listing",
            ListingStatus::Reserved.as_str(),
            listing.status.as_str(),
        ));
    }

    let prop = store::proposal_for_listing_with_status(conn, listing_id, ProposalStatus::Paid)?
        .ok_or_else(|| {
            AppError::PreconditionFailed("Listing has no proposal in PAID status".to_string())
        })?;

    // One active transaction per listing
    if store::transaction_by_listing(conn, listing_id)?.is_some() {
        return Err(AppError::PreconditionFailed(
            "Listing already has an active transaction".to_string(),
        ));
    }

    let farm_weights: Vec<_> = store::weights_for_listing(conn, listing_id)?
        .into_iter()
        .filter(|w| !w.is_internal)
        .collect();

    let mut tx = Transaction::create(
        listing_id,
        &prop.id,
        listing.weight_type,
        TransactionStatus::AwaitingWeighing,
        request.transport_fee,
        request.funrural_tax,
    );
    tx.nfe_document = request.nfe_document;
    tx.gta_document = request.gta_document;

    match listing.weight_type {
        WeightMode::Live if !farm_weights.is_empty() => {
            let total_weight: f64 = farm_weights.iter().map(|w| w.total_weight).sum();
            let price_per_unit = prop.price_per_unit.unwrap_or_else(|| {
                settlement::derived_price_per_unit(
                    prop.price_offer,
                    listing.quantity,
                    listing.estimated_weight.unwrap_or(1.0),
                )
            });
            let amounts = live_settlement(
                total_weight,
                request.yield_rate,
                price_per_unit,
                request.transport_fee,
                request.funrural_tax,
            );
            tx.total_weight = Some(amounts.total_weight);
            tx.unit_count = Some(amounts.unit_count);
            tx.yield_rate = Some(amounts.yield_rate);
            tx.price_per_unit = Some(amounts.price_per_unit);
            tx.gross_amount = Some(amounts.gross_amount);
            tx.final_amount = Some(amounts.final_amount);
            tx.status = TransactionStatus::AwaitingFinalPayment;
        }
        WeightMode::Dead => {
            tx.status = TransactionStatus::AwaitingSlaughterhouseWeight;
        }
        WeightMode::Live => {
            // Live mode but nothing weighed yet
            tx.status = TransactionStatus::AwaitingWeighing;
        }
    }

    store::insert_transaction(conn, &tx)?;

    listing.status = ListingStatus::AwaitingFinalPayment;
    listing.transaction_id = Some(tx.id.clone());
    store::update_listing(conn, &listing)?;

    if let Some(buyer_id) = &listing.buyer_id {
        notify::notify(
            conn,
            buyer_id,
            &format!(
                "Final payment required: R$ {:.2}",
                tx.final_amount.unwrap_or(0.0)
            ),
            serde_json::json!({
                "transaction_id": tx.id,
                "listing_id": listing_id,
                "final_amount": tx.final_amount,
                "gross_amount": tx.gross_amount,
                "action": "pay_final_payment",
            }),
        );
    }

    info!(listing = listing_id, transaction = %tx.id, status = tx.status.as_str(), "listing finalized");
    Ok(tx)
}

/// Dead-weight completion: the slaughterhouse-reported carcass weight closes
/// the settlement. The buyer-supplied price per arroba applies directly (no
/// yield multiplication); the yield rate is recorded for the books.
pub fn submit_slaughterhouse_weight(
    conn: &Connection,
    caller: &str,
    transaction_id: &str,
    data: SlaughterhouseWeight,
) -> Result<Transaction> {
    validate_yield_rate(data.yield_rate)?;

    let mut tx =
        store::get_transaction(conn, transaction_id)?.ok_or(AppError::NotFound("Transaction"))?;
    let prop =
        store::get_proposal(conn, &tx.proposal_id)?.ok_or(AppError::NotFound("Proposal"))?;

    if prop.buyer_id != caller {
        return Err(AppError::forbidden(
            "Only the buyer can submit slaughterhouse weight",
        ));
    }
    if tx.status != TransactionStatus::AwaitingSlaughterhouseWeight {
        return Err(AppError::wrong_status(
            "Transaction",
            TransactionStatus::AwaitingSlaughterhouseWeight.as_str(),
            tx.status.as_str(),
        ));
    }

    let amounts = dead_settlement(
        data.final_weight,
        data.yield_rate,
        data.price_per_unit,
        tx.transport_fee,
        tx.funrural_tax,
    );
    tx.total_weight = Some(amounts.total_weight);
    tx.unit_count = Some(amounts.unit_count);
    tx.yield_rate = Some(amounts.yield_rate);
    tx.price_per_unit = Some(amounts.price_per_unit);
    tx.gross_amount = Some(amounts.gross_amount);
    tx.final_amount = Some(amounts.final_amount);
    tx.status = TransactionStatus::Completed;
    tx.completed_at = Some(Utc::now());
    store::update_transaction(conn, &tx)?;

    if let Some(mut listing) = store::get_listing(conn, &tx.listing_id)? {
        listing.status = ListingStatus::Completed;
        store::update_listing(conn, &listing)?;

        notify::notify(
            conn,
            &listing.owner_id,
            "Final weighing completed by slaughterhouse",
            serde_json::json!({
                "transaction_id": transaction_id,
                "final_weight": data.final_weight,
                "final_amount": tx.final_amount,
            }),
        );
    }

    Ok(tx)
}

// ============================================================================
// FINAL PAYMENT & COMPLETION
// ============================================================================

/// AWAITING_FINAL_PAYMENT → FINAL_PAYMENT_PAID: the buyer pays the balance
pub fn pay_final(conn: &Connection, caller: &str, transaction_id: &str) -> Result<Transaction> {
    let mut tx =
        store::get_transaction(conn, transaction_id)?.ok_or(AppError::NotFound("Transaction"))?;
    let prop =
        store::get_proposal(conn, &tx.proposal_id)?.ok_or(AppError::NotFound("Proposal"))?;

    if prop.buyer_id != caller {
        return Err(AppError::forbidden("Only the buyer can pay final payment"));
    }
    if tx.status != TransactionStatus::AwaitingFinalPayment {
        return Err(AppError::wrong_status(
            "Transaction",
            TransactionStatus::AwaitingFinalPayment.as_str(),
            tx.status.as_str(),
        ));
    }

    tx.status = TransactionStatus::FinalPaymentPaid;
    tx.final_payment_paid_at = Some(Utc::now());
    store::update_transaction(conn, &tx)?;

    if let Some(mut listing) = store::get_listing(conn, &tx.listing_id)? {
        listing.status = ListingStatus::FinalPaymentPaid;
        store::update_listing(conn, &listing)?;

        notify::notify(
            conn,
            &listing.owner_id,
            &format!(
                "Final payment received: R$ {:.2}. Please confirm receipt.",
                tx.final_amount.unwrap_or(0.0)
            ),
            serde_json::json!({
                "transaction_id": transaction_id,
                "listing_id": tx.listing_id,
                "final_amount": tx.final_amount,
                "action": "confirm_payment",
            }),
        );
    }

    Ok(tx)
}

/// FINAL_PAYMENT_PAID → COMPLETED: the farmer confirms receipt and the
/// reservation deposit is refunded to the buyer - at most once, even when
/// confirmation is retried.
pub fn confirm_payment(
    conn: &Connection,
    caller: &str,
    transaction_id: &str,
) -> Result<ConfirmOutcome> {
    let mut tx =
        store::get_transaction(conn, transaction_id)?.ok_or(AppError::NotFound("Transaction"))?;
    let mut listing =
        store::get_listing(conn, &tx.listing_id)?.ok_or(AppError::NotFound("Listing"))?;

    if listing.owner_id != caller {
        return Err(AppError::forbidden(
            "Only the producer can confirm payment receipt",
        ));
    }
    if tx.status != TransactionStatus::FinalPaymentPaid {
        return Err(AppError::wrong_status(
            "Transaction",
            TransactionStatus::FinalPaymentPaid.as_str(),
            tx.status.as_str(),
        ));
    }

    let mut refund_amount = 0.0;
    if let Some(mut prop) = store::get_proposal(conn, &tx.proposal_id)? {
        if let Some(deposit) = prop.deposit_amount {
            if !prop.deposit_refunded {
                prop.deposit_refunded = true;
                prop.deposit_refunded_at = Some(Utc::now());
                store::update_proposal(conn, &prop)?;
                refund_amount = deposit;

                notify::notify(
                    conn,
                    &prop.buyer_id,
                    &format!("Reservation deposit refunded: R$ {:.2}", deposit),
                    serde_json::json!({
                        "transaction_id": transaction_id,
                        "refund_amount": deposit,
                    }),
                );
            }
        }
    }

    tx.status = TransactionStatus::Completed;
    tx.completed_at = Some(Utc::now());
    store::update_transaction(conn, &tx)?;

    listing.status = ListingStatus::Completed;
    store::update_listing(conn, &listing)?;

    info!(transaction = transaction_id, refund_amount, "deal completed");
    Ok(ConfirmOutcome {
        refund_amount,
        status: TransactionStatus::Completed,
    })
}

// ============================================================================
// ADVANCE PAYMENT (dead-weight side path)
// ============================================================================

/// Farmer requests a symbolic advance (pauta value); the buyer is notified
pub fn request_advance(
    conn: &Connection,
    caller: &str,
    listing_id: &str,
    pauta_value: f64,
) -> Result<()> {
    let mut listing =
        store::get_listing(conn, listing_id)?.ok_or(AppError::NotFound("Listing"))?;
    if listing.owner_id != caller {
        return Err(AppError::forbidden("Not authorized"));
    }

    listing.pauta_value_requested = Some(pauta_value);
    listing.advance_payment_status = Some("pending".to_string());
    store::update_listing(conn, &listing)?;

    if let Some(buyer_id) = &listing.buyer_id {
        notify::notify(
            conn,
            buyer_id,
            &format!("Advance payment requested: R$ {}", pauta_value),
            serde_json::json!({
                "listing_id": listing_id,
                "amount": pauta_value,
            }),
        );
    }

    Ok(())
}

// ============================================================================
// READ OPERATIONS
// ============================================================================

/// Proposals received against the caller's listings, newest first
pub fn received_proposals(conn: &Connection, caller: &str) -> Result<Vec<ProposalView>> {
    let listings = store::listings_by_owner(conn, caller)?;
    let mut views = Vec::new();
    for listing in &listings {
        for prop in store::proposals_for_listing(conn, &listing.id)? {
            views.push(ProposalView {
                proposal: prop,
                supply_detail: Some(SupplyDetail::from_listing(listing)),
            });
        }
    }
    views.sort_by(|a, b| b.proposal.created_at.cmp(&a.proposal.created_at));
    Ok(views)
}

/// Proposals the caller sent as a buyer, newest first
pub fn sent_proposals(conn: &Connection, caller: &str) -> Result<Vec<ProposalView>> {
    let props = store::proposals_by_buyer(conn, caller)?;
    let mut views = Vec::new();
    for prop in props {
        let supply_detail = store::get_listing(conn, &prop.supply_id)?
            .map(|listing| SupplyDetail::from_listing(&listing));
        views.push(ProposalView {
            proposal: prop,
            supply_detail,
        });
    }
    views.sort_by(|a, b| b.proposal.created_at.cmp(&a.proposal.created_at));
    Ok(views)
}

/// Transaction detail, restricted to the deal's farmer and buyer
pub fn transaction_for_viewer(
    conn: &Connection,
    caller: &str,
    transaction_id: &str,
) -> Result<Transaction> {
    let tx =
        store::get_transaction(conn, transaction_id)?.ok_or(AppError::NotFound("Transaction"))?;
    authorize_viewer(conn, caller, &tx)?;
    Ok(tx)
}

/// Transaction lookup by listing, same authorization
pub fn transaction_for_listing_viewer(
    conn: &Connection,
    caller: &str,
    listing_id: &str,
) -> Result<Transaction> {
    let tx =
        store::transaction_by_listing(conn, listing_id)?.ok_or(AppError::NotFound("Transaction"))?;
    authorize_viewer(conn, caller, &tx)?;
    Ok(tx)
}

fn authorize_viewer(conn: &Connection, caller: &str, tx: &Transaction) -> Result<()> {
    let listing = store::get_listing(conn, &tx.listing_id)?;
    let prop = store::get_proposal(conn, &tx.proposal_id)?;

    let is_owner = listing.map(|l| l.owner_id == caller).unwrap_or(false);
    let is_buyer = prop.map(|p| p.buyer_id == caller).unwrap_or(false);
    if !is_owner && !is_buyer {
        return Err(AppError::forbidden(
            "Not authorized to view this transaction",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{NewUser, NewWeightEntry};
    use crate::mailer::testing::RecordingMailer;
    use crate::weighing;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();
        conn
    }

    fn add_user(conn: &Connection, username: &str, role: Role) {
        let user = crate::auth::build_user(NewUser {
            username: username.to_string(),
            password: "secret123".to_string(),
            email: format!("{}@example.com", username),
            first_name: username.to_string(),
            last_name: "Test".to_string(),
            phone: "+55 91 99999-0000".to_string(),
            address: "Fazenda Boa Vista".to_string(),
            tax_id: None,
            ie: None,
            role,
        });
        store::insert_user(conn, &user).unwrap();
    }

    fn listing_payload(weight_type: WeightMode) -> NewListing {
        NewListing {
            race: "Nelore".to_string(),
            age: 24,
            sex: "M".to_string(),
            quantity: 10,
            state: "PA".to_string(),
            city: "Belém".to_string(),
            contact: "farmer1@example.com".to_string(),
            category: Some("Beef Cattle".to_string()),
            estimated_weight: Some(450.0),
            availability_start: None,
            availability_end: None,
            weight_type,
            cattle_photo: None,
        }
    }

    fn proposal_payload(supply_id: &str, price_per_unit: Option<f64>) -> NewProposal {
        NewProposal {
            supply_id: supply_id.to_string(),
            price_offer: 10000.0,
            message: Some("Interested in the whole lot".to_string()),
            loading_date: None,
            conditions: None,
            price_per_unit,
        }
    }

    /// Drive a deal up to RESERVED; returns (listing_id, proposal_id)
    fn reserve_deal(conn: &Connection, weight_type: WeightMode, ppu: Option<f64>) -> (String, String) {
        add_user(conn, "farmer1", Role::Farmer);
        add_user(conn, "buyer1", Role::Buyer);

        let mailer = RecordingMailer::new();
        let created =
            create_listing(conn, &mailer, "farmer1", listing_payload(weight_type)).unwrap();
        let prop_id = create_proposal(conn, "buyer1", proposal_payload(&created.id, ppu)).unwrap();
        accept_proposal(conn, "farmer1", &prop_id).unwrap();
        pay_reservation(conn, "buyer1", &prop_id).unwrap();
        (created.id, prop_id)
    }

    fn listing_status(conn: &Connection, id: &str) -> ListingStatus {
        store::get_listing(conn, id).unwrap().unwrap().status
    }

    // ------------------------------------------------------------------
    // Proposal rules
    // ------------------------------------------------------------------

    #[test]
    fn test_farmer_cannot_send_proposal() {
        let conn = test_conn();
        add_user(&conn, "farmer1", Role::Farmer);
        add_user(&conn, "farmer2", Role::Farmer);

        let mailer = RecordingMailer::new();
        let created =
            create_listing(&conn, &mailer, "farmer1", listing_payload(WeightMode::Live)).unwrap();

        let err = create_proposal(&conn, "farmer2", proposal_payload(&created.id, None))
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_proposal_requires_open_listing() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Live, None);
        add_user(&conn, "buyer2", Role::Buyer);

        let err =
            create_proposal(&conn, "buyer2", proposal_payload(&listing_id, None)).unwrap_err();
        match err {
            AppError::PreconditionFailed(msg) => assert!(msg.contains("OPEN")),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_only_owner_accepts() {
        let conn = test_conn();
        add_user(&conn, "farmer1", Role::Farmer);
        add_user(&conn, "buyer1", Role::Buyer);

        let mailer = RecordingMailer::new();
        let created =
            create_listing(&conn, &mailer, "farmer1", listing_payload(WeightMode::Live)).unwrap();
        let prop_id = create_proposal(&conn, "buyer1", proposal_payload(&created.id, None)).unwrap();

        let err = accept_proposal(&conn, "buyer1", &prop_id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_second_accept_fails_while_first_is_active() {
        let conn = test_conn();
        add_user(&conn, "farmer1", Role::Farmer);
        add_user(&conn, "buyer1", Role::Buyer);
        add_user(&conn, "buyer2", Role::Buyer);

        let mailer = RecordingMailer::new();
        let created =
            create_listing(&conn, &mailer, "farmer1", listing_payload(WeightMode::Live)).unwrap();
        let first = create_proposal(&conn, "buyer1", proposal_payload(&created.id, None)).unwrap();
        let second = create_proposal(&conn, "buyer2", proposal_payload(&created.id, None)).unwrap();

        accept_proposal(&conn, "farmer1", &first).unwrap();

        // The listing left OPEN, so the second accept must fail
        let err = accept_proposal(&conn, "farmer1", &second).unwrap_err();
        match err {
            AppError::PreconditionFailed(msg) => assert!(msg.contains("OPEN")),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_only_from_pending() {
        let conn = test_conn();
        let (_, prop_id) = reserve_deal(&conn, WeightMode::Live, None);

        // proposal is PAID by now; reject must refuse
        let err = reject_proposal(&conn, "farmer1", &prop_id).unwrap_err();
        match err {
            AppError::PreconditionFailed(msg) => assert!(msg.contains("PENDING")),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_pay_reservation_requires_buyer_and_accepted() {
        let conn = test_conn();
        add_user(&conn, "farmer1", Role::Farmer);
        add_user(&conn, "buyer1", Role::Buyer);

        let mailer = RecordingMailer::new();
        let created =
            create_listing(&conn, &mailer, "farmer1", listing_payload(WeightMode::Live)).unwrap();
        let prop_id = create_proposal(&conn, "buyer1", proposal_payload(&created.id, None)).unwrap();

        // not accepted yet
        let err = pay_reservation(&conn, "buyer1", &prop_id).unwrap_err();
        match err {
            AppError::PreconditionFailed(msg) => assert!(msg.contains("ACCEPTED")),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }

        accept_proposal(&conn, "farmer1", &prop_id).unwrap();

        // wrong caller
        let err = pay_reservation(&conn, "farmer1", &prop_id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let receipt = pay_reservation(&conn, "buyer1", &prop_id).unwrap();
        assert_eq!(receipt.deposit_amount, RESERVATION_DEPOSIT);
        assert_eq!(receipt.status, ListingStatus::Reserved);
    }

    // ------------------------------------------------------------------
    // Finalization & settlement
    // ------------------------------------------------------------------

    fn finalize_defaults() -> FinalizeRequest {
        FinalizeRequest {
            nfe_document: Some("NFE-001".to_string()),
            gta_document: Some("GTA-001".to_string()),
            transport_fee: 0.0,
            funrural_tax: 0.0,
            yield_rate: DEFAULT_YIELD_RATE,
        }
    }

    #[test]
    fn test_yield_rate_validated_before_any_mutation() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Live, None);

        let mut request = finalize_defaults();
        request.yield_rate = 0.60;
        let err = finalize_listing(&conn, "farmer1", &listing_id, request).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));

        // nothing moved
        assert_eq!(listing_status(&conn, &listing_id), ListingStatus::Reserved);
        assert!(store::transaction_by_listing(&conn, &listing_id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_finalize_requires_reserved_listing() {
        let conn = test_conn();
        add_user(&conn, "farmer1", Role::Farmer);

        let mailer = RecordingMailer::new();
        let created =
            create_listing(&conn, &mailer, "farmer1", listing_payload(WeightMode::Live)).unwrap();

        let err = finalize_listing(&conn, "farmer1", &created.id, finalize_defaults()).unwrap_err();
        match err {
            AppError::PreconditionFailed(msg) => assert!(msg.contains("RESERVED")),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_finalize_without_weights_awaits_weighing() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Live, None);

        let tx = finalize_listing(&conn, "farmer1", &listing_id, finalize_defaults()).unwrap();
        assert_eq!(tx.status, TransactionStatus::AwaitingWeighing);
        assert!(tx.final_amount.is_none());
        assert_eq!(
            listing_status(&conn, &listing_id),
            ListingStatus::AwaitingFinalPayment
        );
    }

    #[test]
    fn test_finalize_twice_is_rejected() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Live, None);

        finalize_listing(&conn, "farmer1", &listing_id, finalize_defaults()).unwrap();
        let err = finalize_listing(&conn, "farmer1", &listing_id, finalize_defaults()).unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
    }

    #[test]
    fn test_live_settlement_uses_explicit_price_per_unit() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Live, Some(300.0));

        weighing::add_weight_entry(
            &conn,
            "farmer1",
            &listing_id,
            NewWeightEntry {
                batch_number: 1,
                quantity: 10,
                total_weight: 1500.0,
                timestamp: None,
            },
        )
        .unwrap();

        let tx = finalize_listing(&conn, "farmer1", &listing_id, finalize_defaults()).unwrap();
        assert_eq!(tx.status, TransactionStatus::AwaitingFinalPayment);
        assert_eq!(tx.unit_count, Some(100.0));
        // 100 @ * 0.52 * 300 = 15600
        assert_eq!(tx.gross_amount, Some(15600.0));
        assert_eq!(tx.final_amount, Some(15600.0));
    }

    #[test]
    fn test_live_settlement_derives_price_from_offer() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Live, None);

        weighing::add_weight_entry(
            &conn,
            "farmer1",
            &listing_id,
            NewWeightEntry {
                batch_number: 1,
                quantity: 10,
                total_weight: 1500.0,
                timestamp: None,
            },
        )
        .unwrap();

        let tx = finalize_listing(&conn, "farmer1", &listing_id, finalize_defaults()).unwrap();
        // derived ppu = 10000 / (10 * 450 / 15) = 10000 / 300 = 33.333...
        // gross = 100 * 0.52 * 33.333... = 1733.33
        assert_eq!(tx.gross_amount, Some(1733.33));
    }

    // ------------------------------------------------------------------
    // Final payment, confirmation, refund
    // ------------------------------------------------------------------

    /// The §8-style full live-mode walkthrough
    #[test]
    fn test_end_to_end_live_deal() {
        let conn = test_conn();
        let (listing_id, prop_id) = reserve_deal(&conn, WeightMode::Live, Some(52.0));
        assert_eq!(listing_status(&conn, &listing_id), ListingStatus::Reserved);

        weighing::add_weight_entry(
            &conn,
            "farmer1",
            &listing_id,
            NewWeightEntry {
                batch_number: 1,
                quantity: 10,
                total_weight: 1500.0,
                timestamp: None,
            },
        )
        .unwrap();

        let tx = finalize_listing(&conn, "farmer1", &listing_id, finalize_defaults()).unwrap();
        // 1500 kg → 100 @; gross = 100 * 0.52 * 52 = 2704
        assert_eq!(tx.unit_count, Some(100.0));
        assert_eq!(tx.gross_amount, Some(2704.0));
        assert_eq!(
            listing_status(&conn, &listing_id),
            ListingStatus::AwaitingFinalPayment
        );

        let tx = pay_final(&conn, "buyer1", &tx.id).unwrap();
        assert_eq!(tx.status, TransactionStatus::FinalPaymentPaid);
        assert_eq!(
            listing_status(&conn, &listing_id),
            ListingStatus::FinalPaymentPaid
        );

        let outcome = confirm_payment(&conn, "farmer1", &tx.id).unwrap();
        assert_eq!(outcome.refund_amount, RESERVATION_DEPOSIT);
        assert_eq!(outcome.status, TransactionStatus::Completed);
        assert_eq!(listing_status(&conn, &listing_id), ListingStatus::Completed);

        let prop = store::get_proposal(&conn, &prop_id).unwrap().unwrap();
        assert!(prop.deposit_refunded);

        // Confirming again must fail: the transaction already completed
        let err = confirm_payment(&conn, "farmer1", &tx.id).unwrap_err();
        match err {
            AppError::PreconditionFailed(msg) => assert!(msg.contains("final_payment_paid")),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
        // and the refund stays single
        let prop = store::get_proposal(&conn, &prop_id).unwrap().unwrap();
        assert!(prop.deposit_refunded);
    }

    #[test]
    fn test_pay_final_requires_awaiting_status_and_buyer() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Live, Some(52.0));

        weighing::add_weight_entry(
            &conn,
            "farmer1",
            &listing_id,
            NewWeightEntry {
                batch_number: 1,
                quantity: 10,
                total_weight: 1500.0,
                timestamp: None,
            },
        )
        .unwrap();
        let tx = finalize_listing(&conn, "farmer1", &listing_id, finalize_defaults()).unwrap();

        let err = pay_final(&conn, "farmer1", &tx.id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        pay_final(&conn, "buyer1", &tx.id).unwrap();
        let err = pay_final(&conn, "buyer1", &tx.id).unwrap_err();
        match err {
            AppError::PreconditionFailed(msg) => assert!(msg.contains("awaiting_final_payment")),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    // ------------------------------------------------------------------
    // Dead-weight path
    // ------------------------------------------------------------------

    #[test]
    fn test_dead_weight_deal_completes_at_slaughterhouse() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Dead, None);

        let tx = finalize_listing(&conn, "farmer1", &listing_id, finalize_defaults()).unwrap();
        assert_eq!(tx.status, TransactionStatus::AwaitingSlaughterhouseWeight);
        assert!(tx.gross_amount.is_none());

        // only the buyer may report
        let err = submit_slaughterhouse_weight(
            &conn,
            "farmer1",
            &tx.id,
            SlaughterhouseWeight {
                final_weight: 750.0,
                yield_rate: DEFAULT_YIELD_RATE,
                price_per_unit: 300.0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let tx = submit_slaughterhouse_weight(
            &conn,
            "buyer1",
            &tx.id,
            SlaughterhouseWeight {
                final_weight: 750.0,
                yield_rate: DEFAULT_YIELD_RATE,
                price_per_unit: 300.0,
            },
        )
        .unwrap();

        // carcass weight priced directly: 50 @ * 300 = 15000, no yield factor
        assert_eq!(tx.unit_count, Some(50.0));
        assert_eq!(tx.gross_amount, Some(15000.0));
        assert_eq!(tx.yield_rate, Some(DEFAULT_YIELD_RATE));
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(listing_status(&conn, &listing_id), ListingStatus::Completed);
    }

    #[test]
    fn test_slaughterhouse_weight_needs_awaiting_status() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Live, Some(52.0));

        weighing::add_weight_entry(
            &conn,
            "farmer1",
            &listing_id,
            NewWeightEntry {
                batch_number: 1,
                quantity: 10,
                total_weight: 1500.0,
                timestamp: None,
            },
        )
        .unwrap();
        let tx = finalize_listing(&conn, "farmer1", &listing_id, finalize_defaults()).unwrap();

        let err = submit_slaughterhouse_weight(
            &conn,
            "buyer1",
            &tx.id,
            SlaughterhouseWeight {
                final_weight: 750.0,
                yield_rate: DEFAULT_YIELD_RATE,
                price_per_unit: 300.0,
            },
        )
        .unwrap_err();
        match err {
            AppError::PreconditionFailed(msg) => {
                assert!(msg.contains("awaiting_slaughterhouse_weight"))
            }
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    #[test]
    fn test_proposal_views_embed_supply_detail() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Live, None);

        let received = received_proposals(&conn, "farmer1").unwrap();
        assert_eq!(received.len(), 1);
        let detail = received[0].supply_detail.as_ref().unwrap();
        assert_eq!(detail.race, "Nelore");
        assert_eq!(detail.location, "Belém, PA");
        assert_eq!(detail.quantity, 10);

        let sent = sent_proposals(&conn, "buyer1").unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].proposal.supply_id, listing_id);
    }

    #[test]
    fn test_transaction_view_authorization() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Live, Some(52.0));
        add_user(&conn, "stranger", Role::User);

        weighing::add_weight_entry(
            &conn,
            "farmer1",
            &listing_id,
            NewWeightEntry {
                batch_number: 1,
                quantity: 10,
                total_weight: 1500.0,
                timestamp: None,
            },
        )
        .unwrap();
        let tx = finalize_listing(&conn, "farmer1", &listing_id, finalize_defaults()).unwrap();

        assert!(transaction_for_viewer(&conn, "farmer1", &tx.id).is_ok());
        assert!(transaction_for_viewer(&conn, "buyer1", &tx.id).is_ok());
        let err = transaction_for_viewer(&conn, "stranger", &tx.id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        assert!(transaction_for_listing_viewer(&conn, "buyer1", &listing_id).is_ok());
    }

    #[test]
    fn test_request_advance_notifies_buyer() {
        let conn = test_conn();
        let (listing_id, _) = reserve_deal(&conn, WeightMode::Dead, None);

        request_advance(&conn, "farmer1", &listing_id, 5000.0).unwrap();

        let listing = store::get_listing(&conn, &listing_id).unwrap().unwrap();
        assert_eq!(listing.pauta_value_requested, Some(5000.0));
        assert_eq!(listing.advance_payment_status.as_deref(), Some("pending"));

        let notifs = notify::notifications_for(&conn, "buyer1").unwrap();
        assert!(notifs.iter().any(|n| n.message.contains("Advance payment")));
    }
}
