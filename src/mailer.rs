// Email Dispatch - best-effort delivery of state-change events
//
// Actual SMTP transport lives outside this system; the `MailSender` trait is
// the seam. Every send is fire-and-forget: failures are logged and swallowed,
// they never block the triggering state transition.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::store;

/// Outbound mail seam; implementations must never be relied on for delivery
pub trait MailSender: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Default sender: logs the message instead of delivering it
pub struct LogMailer;

impl MailSender for LogMailer {
    fn send(&self, to: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        info!(to, subject, "email dispatched (log only)");
        Ok(())
    }
}

/// Contact fields hold phone numbers as often as addresses; only attempt
/// delivery when the value looks like an email
pub fn looks_like_email(contact: &str) -> bool {
    contact.contains('@') && contact.contains('.')
}

/// Details rendered into a match email
#[derive(Debug, Clone, Serialize)]
pub struct MatchDetails {
    pub role: String,
    pub contact: Option<String>,
    pub race: String,
    pub quantity: i64,
    pub location: String,
}

/// Send a match notification email, best-effort
pub fn send_match_email(mailer: &dyn MailSender, to: &str, subject: &str, details: &MatchDetails) {
    if !looks_like_email(to) {
        info!(contact = to, "skipped email for non-email contact");
        return;
    }

    let body = format!(
        "Great news! The system has identified a potential match for your listing.\n\n\
         Role: {}\nRace: {}\nQuantity: {}\nLocation: {}\n\n\
         Log in to your dashboard to view contact details.",
        details.role, details.race, details.quantity, details.location
    );

    if let Err(e) = mailer.send(to, subject, &body) {
        warn!(to, error = %e, "match email delivery failed");
    }
}

/// Send a two-factor verification code; returns whether the send succeeded
pub fn send_verification_code(mailer: &dyn MailSender, to: &str, code: &str) -> bool {
    let body = format!(
        "Your verification code is: {}\n\nIt expires in 10 minutes. \
         If you did not request this code, ignore this message.",
        code
    );
    match mailer.send(to, "Your verification code", &body) {
        Ok(()) => true,
        Err(e) => {
            warn!(to, error = %e, "verification code delivery failed");
            false
        }
    }
}

// ============================================================================
// MAIL CONFIGURATION (admin-managed, stored in the config table)
// ============================================================================

const EMAIL_CONFIG_KEY: &str = "email_config";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_login: String,
    pub smtp_password: String,
    pub sender_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        EmailConfig {
            smtp_server: String::new(),
            smtp_port: 465,
            smtp_login: String::new(),
            smtp_password: String::new(),
            sender_name: "Cattle Match System".to_string(),
        }
    }
}

pub fn load_email_config(conn: &Connection) -> Result<EmailConfig> {
    match store::get_config(conn, EMAIL_CONFIG_KEY)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(EmailConfig::default()),
    }
}

pub fn save_email_config(conn: &Connection, config: &EmailConfig) -> Result<()> {
    store::set_config(conn, EMAIL_CONFIG_KEY, &serde_json::to_value(config)?)
}
