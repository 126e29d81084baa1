// Record Store - SQLite-backed collections, one table per entity
//
// The store keeps the flat-record shape of the domain (string ids, owner ids,
// RFC 3339 timestamps) but mutates one record at a time with targeted UPDATE
// statements. "Last write wins"; no cross-request locking is provided or
// required at the expected volumes.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::entities::{
    DemandRequest, Listing, ListingStatus, Notification, Proposal, ProposalStatus, Role,
    Transaction, TransactionStatus, User, WeightEntry, WeightMode,
};
use crate::error::Result;

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            email TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            phone TEXT NOT NULL,
            address TEXT NOT NULL,
            tax_id TEXT,
            ie TEXT,
            role TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS listings (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            race TEXT NOT NULL,
            age INTEGER NOT NULL,
            sex TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            state TEXT NOT NULL,
            city TEXT NOT NULL,
            contact TEXT NOT NULL,
            category TEXT,
            estimated_weight REAL,
            availability_start TEXT,
            availability_end TEXT,
            weight_type TEXT NOT NULL,
            cattle_photo TEXT,
            status TEXT NOT NULL,
            buyer_id TEXT,
            transaction_id TEXT,
            internal_weight_recorded INTEGER NOT NULL DEFAULT 0,
            internal_weight_skipped INTEGER NOT NULL DEFAULT 0,
            pauta_value_requested REAL,
            advance_payment_status TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS demand_requests (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            targets TEXT NOT NULL,
            race TEXT NOT NULL,
            age_min INTEGER NOT NULL,
            age_max INTEGER NOT NULL,
            sex TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            contact TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS proposals (
            id TEXT PRIMARY KEY,
            supply_id TEXT NOT NULL,
            buyer_id TEXT NOT NULL,
            buyer_contact TEXT NOT NULL,
            price_offer REAL NOT NULL,
            price_per_unit REAL,
            message TEXT,
            loading_date TEXT,
            conditions TEXT,
            status TEXT NOT NULL,
            deposit_amount REAL,
            deposit_paid_at TEXT,
            deposit_refunded INTEGER NOT NULL DEFAULT 0,
            deposit_refunded_at TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS weight_entries (
            id TEXT PRIMARY KEY,
            listing_id TEXT NOT NULL,
            batch_number INTEGER NOT NULL,
            quantity INTEGER NOT NULL,
            total_weight REAL NOT NULL,
            is_internal INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            listing_id TEXT NOT NULL,
            proposal_id TEXT NOT NULL,
            weight_type TEXT NOT NULL,
            status TEXT NOT NULL,
            nfe_document TEXT,
            gta_document TEXT,
            transport_fee REAL NOT NULL DEFAULT 0,
            funrural_tax REAL NOT NULL DEFAULT 0,
            total_weight REAL,
            unit_count REAL,
            yield_rate REAL,
            price_per_unit REAL,
            gross_amount REAL,
            final_amount REAL,
            final_payment_paid_at TEXT,
            completed_at TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            message TEXT NOT NULL,
            details TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Indexes for the hot lookups
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_proposals_supply ON proposals(supply_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_weights_listing ON weight_entries(listing_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_listing ON transactions(listing_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// DATETIME HELPERS
// ============================================================================

fn dt_to_sql(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn dt_opt_to_sql(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(|d| d.to_rfc3339())
}

fn dt_from_sql(s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)
}

fn dt_opt_from_sql(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// USERS & SESSIONS
// ============================================================================

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let role: String = row.get(10)?;
    Ok(User {
        username: row.get(0)?,
        password_hash: row.get(1)?,
        salt: row.get(2)?,
        email: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        phone: row.get(6)?,
        address: row.get(7)?,
        tax_id: row.get(8)?,
        ie: row.get(9)?,
        role: Role::from_str(&role).ok_or(rusqlite::Error::InvalidQuery)?,
        is_active: row.get(11)?,
        created_at: dt_from_sql(row.get(12)?)?,
    })
}

const USER_COLS: &str = "username, password_hash, salt, email, first_name, last_name, \
                         phone, address, tax_id, ie, role, is_active, created_at";

pub fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (username, password_hash, salt, email, first_name, last_name,
                            phone, address, tax_id, ie, role, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            user.username,
            user.password_hash,
            user.salt,
            user.email,
            user.first_name,
            user.last_name,
            user.phone,
            user.address,
            user.tax_id,
            user.ie,
            user.role.as_str(),
            user.is_active,
            dt_to_sql(&user.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, username: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLS),
            params![username],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn all_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY username", USER_COLS))?;
    let users = stmt
        .query_map([], row_to_user)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

pub fn set_user_active(conn: &Connection, username: &str, active: bool) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET is_active = ?1 WHERE username = ?2",
        params![active, username],
    )?;
    Ok(changed > 0)
}

pub fn delete_user(conn: &Connection, username: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM users WHERE username = ?1", params![username])?;
    Ok(changed > 0)
}

pub fn update_user_password(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    salt: &str,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?1, salt = ?2 WHERE username = ?3",
        params![password_hash, salt, username],
    )?;
    Ok(changed > 0)
}

pub fn user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
            params![email],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn insert_session(
    conn: &Connection,
    token: &str,
    username: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (token, username, expires_at) VALUES (?1, ?2, ?3)",
        params![token, username, dt_to_sql(&expires_at)],
    )?;
    Ok(())
}

/// Returns the session's username and expiry; the caller checks the expiry
pub fn get_session(conn: &Connection, token: &str) -> Result<Option<(String, DateTime<Utc>)>> {
    let session = conn
        .query_row(
            "SELECT username, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                let username: String = row.get(0)?;
                let expires_at = dt_from_sql(row.get(1)?)?;
                Ok((username, expires_at))
            },
        )
        .optional()?;
    Ok(session)
}

pub fn delete_session(conn: &Connection, token: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(changed > 0)
}

// ============================================================================
// LISTINGS
// ============================================================================

const LISTING_COLS: &str = "id, owner_id, race, age, sex, quantity, state, city, contact, \
                            category, estimated_weight, availability_start, availability_end, \
                            weight_type, cattle_photo, status, buyer_id, transaction_id, \
                            internal_weight_recorded, internal_weight_skipped, \
                            pauta_value_requested, advance_payment_status, created_at";

fn row_to_listing(row: &Row) -> rusqlite::Result<Listing> {
    let weight_type: String = row.get(13)?;
    let status: String = row.get(15)?;
    Ok(Listing {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        race: row.get(2)?,
        age: row.get(3)?,
        sex: row.get(4)?,
        quantity: row.get(5)?,
        state: row.get(6)?,
        city: row.get(7)?,
        contact: row.get(8)?,
        category: row.get(9)?,
        estimated_weight: row.get(10)?,
        availability_start: row.get(11)?,
        availability_end: row.get(12)?,
        weight_type: WeightMode::from_str(&weight_type).ok_or(rusqlite::Error::InvalidQuery)?,
        cattle_photo: row.get(14)?,
        status: ListingStatus::from_str(&status).ok_or(rusqlite::Error::InvalidQuery)?,
        buyer_id: row.get(16)?,
        transaction_id: row.get(17)?,
        internal_weight_recorded: row.get(18)?,
        internal_weight_skipped: row.get(19)?,
        pauta_value_requested: row.get(20)?,
        advance_payment_status: row.get(21)?,
        created_at: dt_from_sql(row.get(22)?)?,
    })
}

pub fn insert_listing(conn: &Connection, listing: &Listing) -> Result<()> {
    conn.execute(
        "INSERT INTO listings (id, owner_id, race, age, sex, quantity, state, city, contact,
                               category, estimated_weight, availability_start, availability_end,
                               weight_type, cattle_photo, status, buyer_id, transaction_id,
                               internal_weight_recorded, internal_weight_skipped,
                               pauta_value_requested, advance_payment_status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21, ?22, ?23)",
        params![
            listing.id,
            listing.owner_id,
            listing.race,
            listing.age,
            listing.sex,
            listing.quantity,
            listing.state,
            listing.city,
            listing.contact,
            listing.category,
            listing.estimated_weight,
            listing.availability_start,
            listing.availability_end,
            listing.weight_type.as_str(),
            listing.cattle_photo,
            listing.status.as_str(),
            listing.buyer_id,
            listing.transaction_id,
            listing.internal_weight_recorded,
            listing.internal_weight_skipped,
            listing.pauta_value_requested,
            listing.advance_payment_status,
            dt_to_sql(&listing.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_listing(conn: &Connection, id: &str) -> Result<Option<Listing>> {
    let listing = conn
        .query_row(
            &format!("SELECT {} FROM listings WHERE id = ?1", LISTING_COLS),
            params![id],
            row_to_listing,
        )
        .optional()?;
    Ok(listing)
}

pub fn open_listings(conn: &Connection) -> Result<Vec<Listing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM listings WHERE status = 'OPEN' ORDER BY created_at DESC",
        LISTING_COLS
    ))?;
    let listings = stmt
        .query_map([], row_to_listing)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(listings)
}

pub fn listings_by_owner(conn: &Connection, owner_id: &str) -> Result<Vec<Listing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM listings WHERE owner_id = ?1 ORDER BY created_at DESC",
        LISTING_COLS
    ))?;
    let listings = stmt
        .query_map(params![owner_id], row_to_listing)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(listings)
}

pub fn all_listings(conn: &Connection) -> Result<Vec<Listing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM listings ORDER BY created_at DESC",
        LISTING_COLS
    ))?;
    let listings = stmt
        .query_map([], row_to_listing)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(listings)
}

/// Persist a listing's mutable fields; one record, one UPDATE
pub fn update_listing(conn: &Connection, listing: &Listing) -> Result<()> {
    conn.execute(
        "UPDATE listings
         SET status = ?1, buyer_id = ?2, transaction_id = ?3,
             internal_weight_recorded = ?4, internal_weight_skipped = ?5,
             pauta_value_requested = ?6, advance_payment_status = ?7
         WHERE id = ?8",
        params![
            listing.status.as_str(),
            listing.buyer_id,
            listing.transaction_id,
            listing.internal_weight_recorded,
            listing.internal_weight_skipped,
            listing.pauta_value_requested,
            listing.advance_payment_status,
            listing.id,
        ],
    )?;
    Ok(())
}

pub fn delete_listing(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM listings WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

// ============================================================================
// DEMAND REQUESTS
// ============================================================================

const DEMAND_COLS: &str =
    "id, owner_id, targets, race, age_min, age_max, sex, quantity, contact, created_at";

fn row_to_demand(row: &Row) -> rusqlite::Result<DemandRequest> {
    let targets_json: String = row.get(2)?;
    Ok(DemandRequest {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        targets: serde_json::from_str(&targets_json).map_err(|_| rusqlite::Error::InvalidQuery)?,
        race: row.get(3)?,
        age_min: row.get(4)?,
        age_max: row.get(5)?,
        sex: row.get(6)?,
        quantity: row.get(7)?,
        contact: row.get(8)?,
        created_at: dt_from_sql(row.get(9)?)?,
    })
}

pub fn insert_demand(conn: &Connection, demand: &DemandRequest) -> Result<()> {
    let targets_json = serde_json::to_string(&demand.targets)?;
    conn.execute(
        "INSERT INTO demand_requests (id, owner_id, targets, race, age_min, age_max,
                                      sex, quantity, contact, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            demand.id,
            demand.owner_id,
            targets_json,
            demand.race,
            demand.age_min,
            demand.age_max,
            demand.sex,
            demand.quantity,
            demand.contact,
            dt_to_sql(&demand.created_at),
        ],
    )?;
    Ok(())
}

pub fn all_demands(conn: &Connection) -> Result<Vec<DemandRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM demand_requests ORDER BY created_at DESC",
        DEMAND_COLS
    ))?;
    let demands = stmt
        .query_map([], row_to_demand)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(demands)
}

pub fn demands_by_owner(conn: &Connection, owner_id: &str) -> Result<Vec<DemandRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM demand_requests WHERE owner_id = ?1 ORDER BY created_at DESC",
        DEMAND_COLS
    ))?;
    let demands = stmt
        .query_map(params![owner_id], row_to_demand)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(demands)
}

pub fn delete_demand(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM demand_requests WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

// ============================================================================
// PROPOSALS
// ============================================================================

const PROPOSAL_COLS: &str = "id, supply_id, buyer_id, buyer_contact, price_offer, \
                             price_per_unit, message, loading_date, conditions, status, \
                             deposit_amount, deposit_paid_at, deposit_refunded, \
                             deposit_refunded_at, created_at";

fn row_to_proposal(row: &Row) -> rusqlite::Result<Proposal> {
    let status: String = row.get(9)?;
    Ok(Proposal {
        id: row.get(0)?,
        supply_id: row.get(1)?,
        buyer_id: row.get(2)?,
        buyer_contact: row.get(3)?,
        price_offer: row.get(4)?,
        price_per_unit: row.get(5)?,
        message: row.get(6)?,
        loading_date: row.get(7)?,
        conditions: row.get(8)?,
        status: ProposalStatus::from_str(&status).ok_or(rusqlite::Error::InvalidQuery)?,
        deposit_amount: row.get(10)?,
        deposit_paid_at: dt_opt_from_sql(row.get(11)?),
        deposit_refunded: row.get(12)?,
        deposit_refunded_at: dt_opt_from_sql(row.get(13)?),
        created_at: dt_from_sql(row.get(14)?)?,
    })
}

pub fn insert_proposal(conn: &Connection, prop: &Proposal) -> Result<()> {
    conn.execute(
        "INSERT INTO proposals (id, supply_id, buyer_id, buyer_contact, price_offer,
                                price_per_unit, message, loading_date, conditions, status,
                                deposit_amount, deposit_paid_at, deposit_refunded,
                                deposit_refunded_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            prop.id,
            prop.supply_id,
            prop.buyer_id,
            prop.buyer_contact,
            prop.price_offer,
            prop.price_per_unit,
            prop.message,
            prop.loading_date,
            prop.conditions,
            prop.status.as_str(),
            prop.deposit_amount,
            dt_opt_to_sql(&prop.deposit_paid_at),
            prop.deposit_refunded,
            dt_opt_to_sql(&prop.deposit_refunded_at),
            dt_to_sql(&prop.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_proposal(conn: &Connection, id: &str) -> Result<Option<Proposal>> {
    let prop = conn
        .query_row(
            &format!("SELECT {} FROM proposals WHERE id = ?1", PROPOSAL_COLS),
            params![id],
            row_to_proposal,
        )
        .optional()?;
    Ok(prop)
}

pub fn proposals_for_listing(conn: &Connection, supply_id: &str) -> Result<Vec<Proposal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM proposals WHERE supply_id = ?1 ORDER BY created_at DESC",
        PROPOSAL_COLS
    ))?;
    let props = stmt
        .query_map(params![supply_id], row_to_proposal)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(props)
}

pub fn proposals_by_buyer(conn: &Connection, buyer_id: &str) -> Result<Vec<Proposal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM proposals WHERE buyer_id = ?1 ORDER BY created_at DESC",
        PROPOSAL_COLS
    ))?;
    let props = stmt
        .query_map(params![buyer_id], row_to_proposal)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(props)
}

/// The proposal currently holding the deal, if any (settlement looks for PAID)
pub fn proposal_for_listing_with_status(
    conn: &Connection,
    supply_id: &str,
    status: ProposalStatus,
) -> Result<Option<Proposal>> {
    let prop = conn
        .query_row(
            &format!(
                "SELECT {} FROM proposals WHERE supply_id = ?1 AND status = ?2",
                PROPOSAL_COLS
            ),
            params![supply_id, status.as_str()],
            row_to_proposal,
        )
        .optional()?;
    Ok(prop)
}

pub fn update_proposal(conn: &Connection, prop: &Proposal) -> Result<()> {
    conn.execute(
        "UPDATE proposals
         SET status = ?1, deposit_amount = ?2, deposit_paid_at = ?3,
             deposit_refunded = ?4, deposit_refunded_at = ?5
         WHERE id = ?6",
        params![
            prop.status.as_str(),
            prop.deposit_amount,
            dt_opt_to_sql(&prop.deposit_paid_at),
            prop.deposit_refunded,
            dt_opt_to_sql(&prop.deposit_refunded_at),
            prop.id,
        ],
    )?;
    Ok(())
}

// ============================================================================
// WEIGHT ENTRIES
// ============================================================================

fn row_to_weight(row: &Row) -> rusqlite::Result<WeightEntry> {
    Ok(WeightEntry {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        batch_number: row.get(2)?,
        quantity: row.get(3)?,
        total_weight: row.get(4)?,
        is_internal: row.get(5)?,
        timestamp: dt_from_sql(row.get(6)?)?,
    })
}

pub fn insert_weight_entry(conn: &Connection, entry: &WeightEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO weight_entries (id, listing_id, batch_number, quantity, total_weight,
                                     is_internal, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.id,
            entry.listing_id,
            entry.batch_number,
            entry.quantity,
            entry.total_weight,
            entry.is_internal,
            dt_to_sql(&entry.timestamp),
        ],
    )?;
    Ok(())
}

pub fn weights_for_listing(conn: &Connection, listing_id: &str) -> Result<Vec<WeightEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, listing_id, batch_number, quantity, total_weight, is_internal, timestamp
         FROM weight_entries WHERE listing_id = ?1 ORDER BY timestamp",
    )?;
    let entries = stmt
        .query_map(params![listing_id], row_to_weight)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

const TRANSACTION_COLS: &str = "id, listing_id, proposal_id, weight_type, status, \
                                nfe_document, gta_document, transport_fee, funrural_tax, \
                                total_weight, unit_count, yield_rate, price_per_unit, \
                                gross_amount, final_amount, final_payment_paid_at, \
                                completed_at, created_at";

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    let weight_type: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(Transaction {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        proposal_id: row.get(2)?,
        weight_type: WeightMode::from_str(&weight_type).ok_or(rusqlite::Error::InvalidQuery)?,
        status: TransactionStatus::from_str(&status).ok_or(rusqlite::Error::InvalidQuery)?,
        nfe_document: row.get(5)?,
        gta_document: row.get(6)?,
        transport_fee: row.get(7)?,
        funrural_tax: row.get(8)?,
        total_weight: row.get(9)?,
        unit_count: row.get(10)?,
        yield_rate: row.get(11)?,
        price_per_unit: row.get(12)?,
        gross_amount: row.get(13)?,
        final_amount: row.get(14)?,
        final_payment_paid_at: dt_opt_from_sql(row.get(15)?),
        completed_at: dt_opt_from_sql(row.get(16)?),
        created_at: dt_from_sql(row.get(17)?)?,
    })
}

pub fn insert_transaction(conn: &Connection, tx: &Transaction) -> Result<()> {
    conn.execute(
        "INSERT INTO transactions (id, listing_id, proposal_id, weight_type, status,
                                   nfe_document, gta_document, transport_fee, funrural_tax,
                                   total_weight, unit_count, yield_rate, price_per_unit,
                                   gross_amount, final_amount, final_payment_paid_at,
                                   completed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18)",
        params![
            tx.id,
            tx.listing_id,
            tx.proposal_id,
            tx.weight_type.as_str(),
            tx.status.as_str(),
            tx.nfe_document,
            tx.gta_document,
            tx.transport_fee,
            tx.funrural_tax,
            tx.total_weight,
            tx.unit_count,
            tx.yield_rate,
            tx.price_per_unit,
            tx.gross_amount,
            tx.final_amount,
            dt_opt_to_sql(&tx.final_payment_paid_at),
            dt_opt_to_sql(&tx.completed_at),
            dt_to_sql(&tx.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_transaction(conn: &Connection, id: &str) -> Result<Option<Transaction>> {
    let tx = conn
        .query_row(
            &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLS),
            params![id],
            row_to_transaction,
        )
        .optional()?;
    Ok(tx)
}

pub fn transaction_by_listing(conn: &Connection, listing_id: &str) -> Result<Option<Transaction>> {
    let tx = conn
        .query_row(
            &format!(
                "SELECT {} FROM transactions WHERE listing_id = ?1",
                TRANSACTION_COLS
            ),
            params![listing_id],
            row_to_transaction,
        )
        .optional()?;
    Ok(tx)
}

pub fn update_transaction(conn: &Connection, tx: &Transaction) -> Result<()> {
    conn.execute(
        "UPDATE transactions
         SET status = ?1, total_weight = ?2, unit_count = ?3, yield_rate = ?4,
             price_per_unit = ?5, gross_amount = ?6, final_amount = ?7,
             final_payment_paid_at = ?8, completed_at = ?9,
             nfe_document = ?10, gta_document = ?11
         WHERE id = ?12",
        params![
            tx.status.as_str(),
            tx.total_weight,
            tx.unit_count,
            tx.yield_rate,
            tx.price_per_unit,
            tx.gross_amount,
            tx.final_amount,
            dt_opt_to_sql(&tx.final_payment_paid_at),
            dt_opt_to_sql(&tx.completed_at),
            tx.nfe_document,
            tx.gta_document,
            tx.id,
        ],
    )?;
    Ok(())
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

pub fn insert_notification(conn: &Connection, notif: &Notification) -> Result<()> {
    let details_json = serde_json::to_string(&notif.details)?;
    conn.execute(
        "INSERT INTO notifications (id, user_id, message, details, read, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            notif.id,
            notif.user_id,
            notif.message,
            details_json,
            notif.read,
            dt_to_sql(&notif.timestamp),
        ],
    )?;
    Ok(())
}

pub fn notifications_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, message, details, read, timestamp
         FROM notifications WHERE user_id = ?1 ORDER BY timestamp DESC",
    )?;
    let notifs = stmt
        .query_map(params![user_id], |row| {
            let details_json: String = row.get(3)?;
            Ok(Notification {
                id: row.get(0)?,
                user_id: row.get(1)?,
                message: row.get(2)?,
                details: serde_json::from_str(&details_json).unwrap_or_default(),
                read: row.get(4)?,
                timestamp: dt_from_sql(row.get(5)?)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(notifs)
}

pub fn mark_notification_read(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(changed > 0)
}

// ============================================================================
// CONFIG (reference data, mail settings)
// ============================================================================

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn set_config(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
    let json = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, json],
    )?;
    Ok(())
}

// ============================================================================
// COUNTS (admin stats)
// ============================================================================

pub fn count_users(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_listings(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_demands(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM demand_requests", [], |row| row.get(0))?;
    Ok(count)
}
