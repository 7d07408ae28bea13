//! Notification delivery with outcome classification and bounded retries.
//!
//! Delivery is an auxiliary feature: nothing in this module panics or
//! returns an error to the caller. Every terminal outcome is written to
//! the notification log; transient outcomes retry under a single cap
//! shared by the rate-limit and network paths.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::DatabaseError;
use crate::notify::catalog::NotificationKind;
use crate::storage::{Db, User};
use crate::transport::{MessageTransport, SendOutcome};

/// Total send attempts allowed per job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base of the network-error backoff: `5 * (attempt + 1)` seconds.
const NETWORK_BACKOFF_BASE_SECS: u64 = 5;

/// Delivery-log status values.
pub mod delivery_status {
    pub const SENT: &str = "sent";
    pub const BLOCKED: &str = "blocked";
    pub const FAILED_RATE_LIMIT: &str = "failed_rate_limit";
    pub const FAILED_BAD_REQUEST: &str = "failed_bad_request";
    pub const FAILED_NETWORK: &str = "failed_network";
    pub const FAILED_TRANSPORT: &str = "failed_telegram_error";
    pub const FAILED_UNEXPECTED: &str = "failed_unexpected";
}

/// Sends one notification to one recipient and records the outcome.
pub struct DeliverySender {
    db: Arc<Db>,
    transport: Arc<dyn MessageTransport>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl DeliverySender {
    pub fn new(db: Arc<Db>, transport: Arc<dyn MessageTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            transport,
            clock,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Deliver one notification. Returns true only when the transport
    /// accepted the message.
    ///
    /// This is the outermost delivery boundary: failures of any kind are
    /// logged and recorded, never propagated.
    pub async fn deliver(
        &self,
        user_id: i64,
        kind: NotificationKind,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> bool {
        let user = match self.db.get_user(user_id) {
            Ok(Some(user)) => user,
            Ok(None) => {
                error!(user_id, %kind, "recipient not found, dropping notification");
                return false;
            }
            Err(e) => {
                error!(user_id, %kind, error = %e, "user lookup failed");
                self.record_unexpected(user_id, kind, scheduled_at, &e.to_string());
                return false;
            }
        };

        if !user.is_active {
            info!(user_id, %kind, "recipient inactive, skipping delivery");
            return false;
        }

        match self.attempt(&user, kind, scheduled_at, 0).await {
            Ok(sent) => sent,
            Err(e) => {
                error!(user_id, %kind, error = %e, "unexpected delivery failure");
                self.record_unexpected(user_id, kind, scheduled_at, &e.to_string());
                false
            }
        }
    }

    /// One send attempt; transient outcomes re-invoke with an incremented
    /// attempt counter under the shared cap.
    fn attempt<'a>(
        &'a self,
        user: &'a User,
        kind: NotificationKind,
        scheduled_at: Option<DateTime<Utc>>,
        attempt: u32,
    ) -> Pin<Box<dyn Future<Output = Result<bool, DatabaseError>> + Send + 'a>> {
        Box::pin(async move {
            match self.transport.send(user.chat_id, kind.message()).await {
                SendOutcome::Sent => {
                    self.db.append_log(
                        user.id,
                        kind,
                        delivery_status::SENT,
                        scheduled_at,
                        Some(self.clock.now_utc()),
                        None,
                        attempt,
                    )?;
                    info!(user_id = user.id, %kind, attempt, "notification sent");
                    Ok(true)
                }

                SendOutcome::RateLimited { retry_after_secs } => {
                    if attempt + 1 < self.max_attempts {
                        warn!(
                            user_id = user.id,
                            %kind,
                            retry_after_secs,
                            "rate limited, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                        self.attempt(user, kind, scheduled_at, attempt + 1).await
                    } else {
                        error!(user_id = user.id, %kind, "rate-limit retries exhausted");
                        self.db.append_log(
                            user.id,
                            kind,
                            delivery_status::FAILED_RATE_LIMIT,
                            scheduled_at,
                            None,
                            None,
                            attempt + 1,
                        )?;
                        Ok(false)
                    }
                }

                SendOutcome::Blocked => {
                    warn!(user_id = user.id, %kind, "recipient blocked the sender");
                    self.db.set_user_active(user.id, false)?;
                    self.db.append_log(
                        user.id,
                        kind,
                        delivery_status::BLOCKED,
                        scheduled_at,
                        None,
                        None,
                        attempt,
                    )?;
                    Ok(false)
                }

                SendOutcome::BadRequest(detail) => {
                    error!(user_id = user.id, %kind, detail, "bad request, not retrying");
                    self.db.append_log(
                        user.id,
                        kind,
                        delivery_status::FAILED_BAD_REQUEST,
                        scheduled_at,
                        None,
                        Some(&detail),
                        attempt,
                    )?;
                    Ok(false)
                }

                SendOutcome::Network(detail) => {
                    if attempt + 1 < self.max_attempts {
                        let backoff = NETWORK_BACKOFF_BASE_SECS * (attempt as u64 + 1);
                        warn!(
                            user_id = user.id,
                            %kind,
                            detail,
                            backoff_secs = backoff,
                            "network error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(backoff)).await;
                        self.attempt(user, kind, scheduled_at, attempt + 1).await
                    } else {
                        error!(user_id = user.id, %kind, detail, "network retries exhausted");
                        self.db.append_log(
                            user.id,
                            kind,
                            delivery_status::FAILED_NETWORK,
                            scheduled_at,
                            None,
                            Some(&detail),
                            attempt + 1,
                        )?;
                        Ok(false)
                    }
                }

                SendOutcome::Other(detail) => {
                    error!(user_id = user.id, %kind, detail, "transport error, not retrying");
                    self.db.append_log(
                        user.id,
                        kind,
                        delivery_status::FAILED_TRANSPORT,
                        scheduled_at,
                        None,
                        Some(&detail),
                        attempt,
                    )?;
                    Ok(false)
                }
            }
        })
    }

    fn record_unexpected(
        &self,
        user_id: i64,
        kind: NotificationKind,
        scheduled_at: Option<DateTime<Utc>>,
        detail: &str,
    ) {
        // best effort; the log write itself may be what failed
        let _ = self.db.append_log(
            user_id,
            kind,
            delivery_status::FAILED_UNEXPECTED,
            scheduled_at,
            None,
            Some(detail),
            0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FixedClock;
    use crate::transport::test_support::MockTransport;

    fn now() -> DateTime<Utc> {
        "2025-09-15T06:00:00Z".parse().unwrap()
    }

    fn sender_with(
        outcomes: Vec<SendOutcome>,
    ) -> (Arc<Db>, Arc<MockTransport>, DeliverySender, i64) {
        let db = Arc::new(Db::open_memory().unwrap());
        let user = db.upsert_user(1001, "UTC").unwrap();
        let transport = Arc::new(MockTransport::new(outcomes));
        let sender = DeliverySender::new(
            db.clone(),
            transport.clone(),
            Arc::new(FixedClock::new(now())),
        );
        (db, transport, sender, user.id)
    }

    #[tokio::test]
    async fn success_records_sent_with_timestamp() {
        let (db, transport, sender, user_id) = sender_with(vec![]);
        assert!(sender.deliver(user_id, NotificationKind::OvulationDay, Some(now())).await);

        assert_eq!(transport.call_count(), 1);
        let logs = db.recent_logs(user_id, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, delivery_status::SENT);
        assert_eq!(logs[0].sent_at, Some(now()));
        assert_eq!(logs[0].scheduled_at, Some(now()));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_rate_limit_stops_at_cap() {
        let outcomes = vec![
            SendOutcome::RateLimited { retry_after_secs: 7 };
            DEFAULT_MAX_ATTEMPTS as usize + 2
        ];
        let (db, transport, sender, user_id) = sender_with(outcomes);

        assert!(!sender.deliver(user_id, NotificationKind::PeriodStart, None).await);

        assert_eq!(transport.call_count(), DEFAULT_MAX_ATTEMPTS as usize);
        let logs = db.recent_logs(user_id, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, delivery_status::FAILED_RATE_LIMIT);
        assert_eq!(logs[0].retry_count, DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_back_off_then_succeed() {
        let (db, transport, sender, user_id) = sender_with(vec![
            SendOutcome::Network("reset".into()),
            SendOutcome::Network("reset".into()),
        ]);

        assert!(sender.deliver(user_id, NotificationKind::PeriodReminder, None).await);

        assert_eq!(transport.call_count(), 3);
        let logs = db.recent_logs(user_id, 10).unwrap();
        assert_eq!(logs[0].status, delivery_status::SENT);
    }

    #[tokio::test(start_paused = true)]
    async fn network_cap_matches_rate_limit_cap() {
        let outcomes = vec![SendOutcome::Network("reset".into()); DEFAULT_MAX_ATTEMPTS as usize];
        let (db, transport, sender, user_id) = sender_with(outcomes);

        assert!(!sender.deliver(user_id, NotificationKind::PeriodReminder, None).await);

        assert_eq!(transport.call_count(), DEFAULT_MAX_ATTEMPTS as usize);
        assert_eq!(
            db.recent_logs(user_id, 10).unwrap()[0].status,
            delivery_status::FAILED_NETWORK
        );
    }

    #[tokio::test]
    async fn blocked_recipient_is_deactivated_without_retry() {
        let (db, transport, sender, user_id) = sender_with(vec![SendOutcome::Blocked]);

        assert!(!sender.deliver(user_id, NotificationKind::SafePeriod, None).await);

        assert_eq!(transport.call_count(), 1);
        assert!(!db.get_user(user_id).unwrap().unwrap().is_active);
        assert_eq!(
            db.recent_logs(user_id, 10).unwrap()[0].status,
            delivery_status::BLOCKED
        );
    }

    #[tokio::test]
    async fn bad_request_is_terminal() {
        let (db, transport, sender, user_id) =
            sender_with(vec![SendOutcome::BadRequest("chat not found".into())]);

        assert!(!sender.deliver(user_id, NotificationKind::PeriodStart, None).await);

        assert_eq!(transport.call_count(), 1);
        let logs = db.recent_logs(user_id, 10).unwrap();
        assert_eq!(logs[0].status, delivery_status::FAILED_BAD_REQUEST);
        assert_eq!(logs[0].error.as_deref(), Some("chat not found"));
    }

    #[tokio::test]
    async fn other_transport_error_is_terminal() {
        let (db, transport, sender, user_id) =
            sender_with(vec![SendOutcome::Other("internal".into())]);

        assert!(!sender.deliver(user_id, NotificationKind::PeriodStart, None).await);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(
            db.recent_logs(user_id, 10).unwrap()[0].status,
            delivery_status::FAILED_TRANSPORT
        );
    }

    #[tokio::test]
    async fn inactive_recipient_is_skipped_silently() {
        let (db, transport, sender, user_id) = sender_with(vec![]);
        db.set_user_active(user_id, false).unwrap();

        assert!(!sender.deliver(user_id, NotificationKind::PeriodStart, None).await);
        assert_eq!(transport.call_count(), 0);
        assert!(db.recent_logs(user_id, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_recipient_is_dropped() {
        let (_db, transport, sender, _user_id) = sender_with(vec![]);
        assert!(!sender.deliver(9999, NotificationKind::PeriodStart, None).await);
        assert_eq!(transport.call_count(), 0);
    }
}
