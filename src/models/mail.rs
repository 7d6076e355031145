//! Outbound alert mail, queued for an external dispatcher.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A queued email. Rows in `mail_queue` are insert-only from this service;
/// a separately operated dispatcher drains the table and actually sends.
#[derive(Serialize, Clone, Debug)]
pub struct MailMessage {
    pub id: Uuid,
    pub to_addrs: Vec<String>,
    pub subject: String,
    pub html: String,
    pub queued_at: DateTime<Utc>,
}

impl MailMessage {
    pub fn new(to: String, subject: String, html: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            to_addrs: vec![to],
            subject,
            html,
            queued_at: now,
        }
    }
}
