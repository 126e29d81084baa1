// Admin Surface - platform stats, user management, reference data
//
// Every operation revalidates the admin role; the HTTP extractor is not the
// only gate.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth;
use crate::entities::{Listing, User, UserPublic};
use crate::error::{AppError, Result};
use crate::store;

const REFERENCES_KEY: &str = "references";

/// A custom city entry, keyed by state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityRef {
    pub state: String,
    pub name: String,
}

/// Platform-wide reference lists shown in listing/demand forms. Seeded with
/// the stock breeds; admins append custom breeds and cities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct References {
    pub breeds: Vec<String>,
    pub cities: Vec<CityRef>,
}

impl Default for References {
    fn default() -> Self {
        References {
            breeds: vec!["Angus".to_string(), "Nelore".to_string()],
            cities: Vec::new(),
        }
    }
}

pub fn load_references(conn: &Connection) -> Result<References> {
    match store::get_config(conn, REFERENCES_KEY)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(References::default()),
    }
}

pub fn add_breed(conn: &Connection, admin: &User, breed: &str) -> Result<References> {
    auth::require_admin(admin)?;
    let breed = breed.trim();
    if breed.is_empty() {
        return Err(AppError::ValidationFailed("Breed name is empty".to_string()));
    }

    let mut refs = load_references(conn)?;
    if !refs.breeds.iter().any(|b| b.eq_ignore_ascii_case(breed)) {
        refs.breeds.push(breed.to_string());
        store::set_config(conn, REFERENCES_KEY, &serde_json::to_value(&refs)?)?;
    }
    Ok(refs)
}

pub fn remove_breed(conn: &Connection, admin: &User, breed: &str) -> Result<References> {
    auth::require_admin(admin)?;
    let mut refs = load_references(conn)?;
    let before = refs.breeds.len();
    refs.breeds.retain(|b| !b.eq_ignore_ascii_case(breed));
    if refs.breeds.len() == before {
        return Err(AppError::NotFound("Breed"));
    }
    store::set_config(conn, REFERENCES_KEY, &serde_json::to_value(&refs)?)?;
    Ok(refs)
}

pub fn add_city(conn: &Connection, admin: &User, state: &str, name: &str) -> Result<References> {
    auth::require_admin(admin)?;
    let (state, name) = (state.trim(), name.trim());
    if state.is_empty() || name.is_empty() {
        return Err(AppError::ValidationFailed(
            "State and city name are required".to_string(),
        ));
    }

    let mut refs = load_references(conn)?;
    let exists = refs
        .cities
        .iter()
        .any(|c| c.state.eq_ignore_ascii_case(state) && c.name.eq_ignore_ascii_case(name));
    if !exists {
        refs.cities.push(CityRef {
            state: state.to_string(),
            name: name.to_string(),
        });
        store::set_config(conn, REFERENCES_KEY, &serde_json::to_value(&refs)?)?;
    }
    Ok(refs)
}

pub fn remove_city(conn: &Connection, admin: &User, state: &str, name: &str) -> Result<References> {
    auth::require_admin(admin)?;
    let mut refs = load_references(conn)?;
    let before = refs.cities.len();
    refs.cities
        .retain(|c| !(c.state.eq_ignore_ascii_case(state) && c.name.eq_ignore_ascii_case(name)));
    if refs.cities.len() == before {
        return Err(AppError::NotFound("City"));
    }
    store::set_config(conn, REFERENCES_KEY, &serde_json::to_value(&refs)?)?;
    Ok(refs)
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub total_users: i64,
    pub total_listings: i64,
    pub total_demands: i64,
}

pub fn platform_stats(conn: &Connection, admin: &User) -> Result<PlatformStats> {
    auth::require_admin(admin)?;
    Ok(PlatformStats {
        total_users: store::count_users(conn)?,
        total_listings: store::count_listings(conn)?,
        total_demands: store::count_demands(conn)?,
    })
}

pub fn list_users(conn: &Connection, admin: &User) -> Result<Vec<UserPublic>> {
    auth::require_admin(admin)?;
    Ok(store::all_users(conn)?.into_iter().map(Into::into).collect())
}

pub fn set_user_active(
    conn: &Connection,
    admin: &User,
    username: &str,
    active: bool,
) -> Result<()> {
    auth::require_admin(admin)?;
    if admin.username == username {
        return Err(AppError::forbidden("Cannot deactivate your own account"));
    }
    if !store::set_user_active(conn, username, active)? {
        return Err(AppError::NotFound("User"));
    }
    info!(username, active, "user activation changed");
    Ok(())
}

pub fn remove_user(conn: &Connection, admin: &User, username: &str) -> Result<()> {
    auth::require_admin(admin)?;
    if admin.username == username {
        return Err(AppError::forbidden("Cannot delete your own account"));
    }
    if !store::delete_user(conn, username)? {
        return Err(AppError::NotFound("User"));
    }
    info!(username, "user deleted");
    Ok(())
}

pub fn all_listings(conn: &Connection, admin: &User) -> Result<Vec<Listing>> {
    auth::require_admin(admin)?;
    store::all_listings(conn)
}

/// Administrative delete, legal at any listing state
pub fn remove_listing(conn: &Connection, admin: &User, id: &str) -> Result<()> {
    auth::require_admin(admin)?;
    if !store::delete_listing(conn, id)? {
        return Err(AppError::NotFound("Listing"));
    }
    info!(listing = id, "listing deleted by admin");
    Ok(())
}

pub fn remove_demand(conn: &Connection, admin: &User, id: &str) -> Result<()> {
    auth::require_admin(admin)?;
    if !store::delete_demand(conn, id)? {
        return Err(AppError::NotFound("Demand"));
    }
    info!(demand = id, "demand deleted by admin");
    Ok(())
}
