// Notification Dispatch - in-app messages driven by state changes
//
// Fire-and-forget: a failed insert is logged and swallowed so it can never
// abort the state transition that triggered it.

use rusqlite::Connection;
use tracing::warn;

use crate::entities::Notification;
use crate::error::Result;
use crate::store;

/// Record a notification for a user; failures are logged, never raised
pub fn notify(conn: &Connection, user_id: &str, message: &str, details: serde_json::Value) {
    let notif = Notification::create(user_id, message, details);
    if let Err(e) = store::insert_notification(conn, &notif) {
        warn!(user = user_id, error = %e, "failed to store notification");
    }
}

/// All notifications for a user, newest first
pub fn notifications_for(conn: &Connection, user_id: &str) -> Result<Vec<Notification>> {
    store::notifications_for_user(conn, user_id)
}

/// Mark one of the user's notifications as read; false when it is not theirs
pub fn mark_read(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    store::mark_notification_read(conn, user_id, id)
}
