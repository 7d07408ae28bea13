//! Notification catalog, timezone-aware time resolution, and delivery.

pub mod catalog;
pub mod resolver;
pub mod sender;

pub use catalog::NotificationKind;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user, per-kind notification preference.
///
/// Unique per (user, kind); creating a duplicate updates the existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub is_enabled: bool,
    /// Minute-of-day override for the send time; `None` means the kind's
    /// default send time applies. Kinds' day offsets cannot be overridden.
    pub time_offset: Option<u32>,
}

/// One row of delivery history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}
