//! Persistent one-shot notification scheduler.
//!
//! Jobs live in the `jobs` table, one per (user, kind), and survive
//! restarts. The firing path is a polling loop: every tick it claims due
//! jobs by deleting their exact row, so a job superseded between being
//! read and being fired loses the claim and never sends a stale instant.
//! Late fires inside the misfire grace window are coalesced into a single
//! execution; beyond it they are dropped.
//!
//! Scheduling is best-effort relative to the interactive path: every
//! operation here logs failures instead of surfacing them to the chat
//! flow.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::notify::catalog::NotificationKind;
use crate::notify::resolver;
use crate::notify::sender::DeliverySender;
use crate::storage::{Db, ScheduledJob, SchedulerConfig};

/// Live job counts, for introspection.
#[derive(Debug, Clone, Default)]
pub struct JobStats {
    pub total: usize,
    pub by_kind: Vec<(NotificationKind, usize)>,
}

/// The scheduling engine: job store access, the firing loop, and the
/// rescheduling orchestration invoked after cycle or preference edits.
pub struct NotificationScheduler {
    db: Arc<Db>,
    sender: Arc<DeliverySender>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl NotificationScheduler {
    pub fn new(
        db: Arc<Db>,
        sender: Arc<DeliverySender>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            db,
            sender,
            clock,
            config,
        }
    }

    // === Job store operations ===

    /// Insert or replace the job for `(user_id, kind)`.
    ///
    /// Instants not strictly in the future are rejected as a no-op.
    /// Re-scheduling the identical instant is also a no-op; a different
    /// instant supersedes the old job atomically.
    pub fn schedule(
        &self,
        user_id: i64,
        kind: NotificationKind,
        send_at: DateTime<Utc>,
    ) -> Result<bool> {
        if send_at <= self.clock.now_utc() {
            warn!(user_id, %kind, %send_at, "refusing to schedule job in the past");
            return Ok(false);
        }
        self.db.put_job(user_id, kind, send_at)?;
        debug!(user_id, %kind, %send_at, "job scheduled");
        Ok(true)
    }

    /// Remove the job if present; absence is not an error.
    pub fn cancel(&self, user_id: i64, kind: NotificationKind) -> Result<bool> {
        let removed = self.db.delete_job(user_id, kind)?;
        if removed {
            debug!(user_id, %kind, "job cancelled");
        }
        Ok(removed)
    }

    /// Remove every job for a user; returns the count removed.
    pub fn cancel_all(&self, user_id: i64) -> Result<usize> {
        let removed = self.db.delete_user_jobs(user_id)?;
        info!(user_id, removed, "cancelled user jobs");
        Ok(removed)
    }

    /// All live jobs for a user, soonest first.
    pub fn get_pending(&self, user_id: i64) -> Result<Vec<ScheduledJob>> {
        Ok(self.db.list_user_jobs(user_id)?)
    }

    /// Live job counts by kind.
    pub fn job_stats(&self) -> Result<JobStats> {
        let by_kind = self.db.job_counts_by_kind()?;
        Ok(JobStats {
            total: by_kind.iter().map(|(_, n)| n).sum(),
            by_kind,
        })
    }

    // === Rescheduling orchestration ===

    /// Replace all of a user's jobs with ones derived from the given
    /// cycle. Called after cycle creation or edit.
    ///
    /// Old jobs are cancelled before the fresh schedule lands; the
    /// per-key replace makes the swap safe against a concurrent fire.
    pub fn schedule_for_cycle(&self, user_id: i64, cycle_id: i64) -> Result<usize> {
        let Some(cycle) = self.db.get_cycle(cycle_id)? else {
            warn!(user_id, cycle_id, "cycle not found, nothing to schedule");
            return Ok(0);
        };
        let Some(user) = self.db.get_user(user_id)? else {
            warn!(user_id, "user not found, nothing to schedule");
            return Ok(0);
        };

        self.cancel_all(user_id)?;

        let preferences = self.db.get_preferences(user_id)?;
        let resolved =
            resolver::resolve_all(&cycle, &user.timezone, &preferences, self.clock.now_utc());

        let mut created = 0;
        for (kind, send_at) in resolved {
            if self.schedule(user_id, kind, send_at)? {
                created += 1;
            }
        }
        info!(user_id, cycle_id, created, "scheduled cycle notifications");
        Ok(created)
    }

    /// Recompute all jobs from the user's current cycle. Called after any
    /// preference toggle.
    pub fn reschedule_for_user(&self, user_id: i64) -> Result<usize> {
        let Some(cycle) = self.db.get_current_cycle(user_id)? else {
            let removed = self.cancel_all(user_id)?;
            debug!(user_id, removed, "no current cycle, jobs cleared");
            return Ok(0);
        };
        self.schedule_for_cycle(user_id, cycle.id)
    }

    /// Purge every job for a user. Called before user deletion.
    pub fn remove_all_for_user(&self, user_id: i64) -> Result<usize> {
        self.cancel_all(user_id)
    }

    /// Rebuild the job store after a restart.
    ///
    /// Instants are always recomputed from the current cycles and
    /// preferences rather than trusted from the persisted rows, so a long
    /// downtime cannot leave stale in-the-past jobs; whatever remains past
    /// is purged. Returns the number of jobs restored.
    pub fn restore_all(&self) -> Result<usize> {
        info!("restoring notification jobs");
        let mut restored = 0;

        let active = self.db.list_active_users()?;

        // sweep jobs left behind by deactivated or deleted users
        for user_id in self.db.list_job_user_ids()? {
            if !active.iter().any(|u| u.id == user_id) {
                let removed = self.db.delete_user_jobs(user_id)?;
                warn!(user_id, removed, "dropped jobs for non-active user");
            }
        }

        for user in active {
            match self.reschedule_for_user(user.id) {
                Ok(count) => restored += count,
                Err(e) => {
                    // one bad user must not block the rest
                    error!(user_id = user.id, error = %e, "failed to restore jobs");
                }
            }
        }

        let purged = self.db.purge_jobs_before(self.clock.now_utc())?;
        if purged > 0 {
            warn!(purged, "dropped stale jobs during restore");
        }
        info!(restored, "notification jobs restored");
        Ok(restored)
    }

    // === Firing path ===

    /// Run the firing loop until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            misfire_grace_secs = self.config.misfire_grace_secs,
            "scheduler loop started"
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            // handles dropped: deliveries run detached
            self.tick();
        }
    }

    /// One pass over due jobs: claim, then hand off to delivery.
    ///
    /// Claiming deletes the job row keyed by its exact instant, so a
    /// concurrent replace or a second trigger gets zero rows and skips —
    /// each job fires at most once. Jobs later than the grace window are
    /// claimed but not delivered.
    ///
    /// Deliveries are spawned, not awaited: one recipient's retry sleeps
    /// must never delay the next poll or another user's due job. The
    /// sender records its own outcome, so the firing loop drops the
    /// returned handles; they exist for callers that need to wait on
    /// delivery completion.
    pub fn tick(&self) -> Vec<tokio::task::JoinHandle<bool>> {
        let now = self.clock.now_utc();
        let due = match self.db.due_jobs(now) {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "failed to load due jobs");
                return Vec::new();
            }
        };

        let grace = chrono::Duration::seconds(self.config.misfire_grace_secs as i64);
        let mut handles = Vec::new();

        for job in due {
            let claimed = match self.db.claim_job(job.user_id, job.kind, job.send_at) {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(user_id = job.user_id, kind = %job.kind, error = %e, "claim failed");
                    continue;
                }
            };
            if !claimed {
                debug!(user_id = job.user_id, kind = %job.kind, "job superseded, skipping");
                continue;
            }

            if now - job.send_at > grace {
                warn!(
                    user_id = job.user_id,
                    kind = %job.kind,
                    send_at = %job.send_at,
                    "job missed beyond grace window, dropping"
                );
                continue;
            }

            let sender = self.sender.clone();
            handles.push(tokio::spawn(async move {
                sender
                    .deliver(job.user_id, job.kind, Some(job.send_at))
                    .await
            }));
        }

        handles
    }
}
