// Authentication - salted SHA-256 credentials and bearer-token sessions
//
// Login mints an opaque token with a fixed 60-minute expiry; every protected
// operation resolves the token back to a user and checks the account is
// still active. Deactivated accounts keep their records but cannot log in
// or act.

use chrono::{Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::entities::{NewUser, Role, User, UserPublic};
use crate::error::{AppError, Result};
use crate::store;

pub const SESSION_TTL_MINUTES: i64 = 60;

fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn new_salt() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Hash the registration payload into a storable account record
pub fn build_user(data: NewUser) -> User {
    let salt = new_salt();
    let password_hash = hash_password(&data.password, &salt);
    User {
        username: data.username,
        password_hash,
        salt,
        email: data.email,
        first_name: data.first_name,
        last_name: data.last_name,
        phone: data.phone,
        address: data.address,
        tax_id: data.tax_id,
        ie: data.ie,
        role: data.role,
        is_active: true,
        created_at: Utc::now(),
    }
}

pub fn verify_password(user: &User, password: &str) -> bool {
    hash_password(password, &user.salt) == user.password_hash
}

/// Register a new account; usernames and emails are unique
pub fn register(conn: &Connection, data: NewUser) -> Result<UserPublic> {
    if store::get_user(conn, &data.username)?.is_some() {
        return Err(AppError::ValidationFailed(
            "Username already registered".to_string(),
        ));
    }
    if store::user_by_email(conn, &data.email)?.is_some() {
        return Err(AppError::ValidationFailed(
            "Email already registered".to_string(),
        ));
    }

    let user = build_user(data);
    store::insert_user(conn, &user)?;
    info!(username = %user.username, role = user.role.as_str(), "user registered");
    Ok(user.into())
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub access_token: String,
    pub token_type: &'static str,
    pub username: String,
    pub role: Role,
}

/// Verify credentials and mint a session token
pub fn login(conn: &Connection, username: &str, password: &str) -> Result<Session> {
    let user = match store::get_user(conn, username)? {
        Some(u) if verify_password(&u, password) => u,
        _ => {
            return Err(AppError::forbidden("Incorrect username or password"));
        }
    };
    if !user.is_active {
        return Err(AppError::forbidden("Account is deactivated"));
    }

    let token = uuid::Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::minutes(SESSION_TTL_MINUTES);
    store::insert_session(conn, &token, username, expires_at)?;

    Ok(Session {
        access_token: token,
        token_type: "bearer",
        username: user.username,
        role: user.role,
    })
}

/// Resolve a bearer token to its user; expired or unknown tokens fail
pub fn authenticate(conn: &Connection, token: &str) -> Result<User> {
    let (username, expires_at) = store::get_session(conn, token)?
        .ok_or_else(|| AppError::forbidden("Invalid or expired session"))?;
    if expires_at < Utc::now() {
        store::delete_session(conn, token)?;
        return Err(AppError::forbidden("Invalid or expired session"));
    }

    let user =
        store::get_user(conn, &username)?.ok_or(AppError::NotFound("User"))?;
    if !user.is_active {
        return Err(AppError::forbidden("Account is deactivated"));
    }
    Ok(user)
}

pub fn logout(conn: &Connection, token: &str) -> Result<bool> {
    store::delete_session(conn, token)
}

/// Admin gate used by the management surface
pub fn require_admin(user: &User) -> Result<()> {
    if user.role != Role::Admin {
        return Err(AppError::forbidden("Admin privileges required"));
    }
    Ok(())
}

/// Replace a user's password with a fresh salt (verified reset flow)
pub fn set_password(conn: &Connection, username: &str, new_password: &str) -> Result<()> {
    let salt = new_salt();
    let hash = hash_password(new_password, &salt);
    if !store::update_user_password(conn, username, &hash, &salt)? {
        return Err(AppError::NotFound("User"));
    }
    Ok(())
}
