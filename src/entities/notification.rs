// Notification - an in-app message addressed to a user
//
// Append-only; read user-filtered, newest first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub message: String,
    /// Free-form structured payload (matched record, amounts, next action)
    pub details: serde_json::Value,
    pub read: bool,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn create(user_id: &str, message: &str, details: serde_json::Value) -> Self {
        Notification {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            details,
            read: false,
            timestamp: Utc::now(),
        }
    }
}
