//! SQLite-based storage for users, cycles, preferences, jobs, and the
//! delivery log.
//!
//! The `jobs` table is the persistent job store: one row per
//! `(user_id, kind)` key, so a replacement schedule is a single
//! `INSERT OR REPLACE` and firing claims a row by deleting it with its
//! exact instant. Date columns are `%Y-%m-%d` text, timestamps RFC3339.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::data_dir;
use crate::cycle::{Cycle, CYCLE_LENGTH_RANGE, PERIOD_LENGTH_RANGE};
use crate::error::{CoreError, DatabaseError, ValidationError};
use crate::notify::{DeliveryRecord, NotificationKind, NotificationPreference};

/// A chat user known to the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Chat transport recipient reference.
    pub chat_id: i64,
    /// IANA timezone name; resolver falls back on unknown values.
    pub timezone: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A persisted (user, kind) -> send-instant binding awaiting one-shot
/// execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub send_at: DateTime<Utc>,
}

// === Helper Functions ===

/// Parse a date from `%Y-%m-%d` with fallback to today
fn parse_date_fallback(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap_or_else(|_| Utc::now().date_naive())
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse notification kind from database string, defaulting to the
/// period reminder for unknown values
fn parse_kind_fallback(kind_str: &str) -> NotificationKind {
    NotificationKind::parse(kind_str).unwrap_or(NotificationKind::PeriodReminder)
}

fn row_to_user(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
    let created_at: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        timezone: row.get(2)?,
        is_active: row.get(3)?,
        created_at: parse_datetime_fallback(&created_at),
    })
}

fn row_to_cycle(row: &rusqlite::Row) -> Result<Cycle, rusqlite::Error> {
    let start_date: String = row.get(2)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(Cycle {
        id: row.get(0)?,
        user_id: row.get(1)?,
        start_date: parse_date_fallback(&start_date),
        cycle_length: row.get(3)?,
        period_length: row.get(4)?,
        is_current: row.get(5)?,
        notes: row.get(6)?,
        created_at: parse_datetime_fallback(&created_at),
        updated_at: parse_datetime_fallback(&updated_at),
    })
}

fn row_to_job(row: &rusqlite::Row) -> Result<ScheduledJob, rusqlite::Error> {
    let kind: String = row.get(1)?;
    let send_at: String = row.get(2)?;
    Ok(ScheduledJob {
        user_id: row.get(0)?,
        kind: parse_kind_fallback(&kind),
        send_at: parse_datetime_fallback(&send_at),
    })
}

fn row_to_preference(row: &rusqlite::Row) -> Result<NotificationPreference, rusqlite::Error> {
    let kind: String = row.get(1)?;
    let time_offset: Option<i64> = row.get(3)?;
    Ok(NotificationPreference {
        user_id: row.get(0)?,
        kind: parse_kind_fallback(&kind),
        is_enabled: row.get(2)?,
        time_offset: time_offset.map(|m| m.clamp(0, 24 * 60 - 1) as u32),
    })
}

fn row_to_delivery_record(row: &rusqlite::Row) -> Result<DeliveryRecord, rusqlite::Error> {
    let kind: String = row.get(2)?;
    let scheduled_at: Option<String> = row.get(4)?;
    let sent_at: Option<String> = row.get(5)?;
    let created_at: String = row.get(8)?;
    Ok(DeliveryRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: parse_kind_fallback(&kind),
        status: row.get(3)?,
        scheduled_at: scheduled_at.as_deref().map(parse_datetime_fallback),
        sent_at: sent_at.as_deref().map(parse_datetime_fallback),
        error: row.get(6)?,
        retry_count: row.get(7)?,
        created_at: parse_datetime_fallback(&created_at),
    })
}

/// SQLite database behind every store the engine consumes.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open the database at `~/.config/lunara/lunara.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_default() -> Result<Self, CoreError> {
        let path = data_dir()?.join("lunara.db");
        Self::open(&path)
    }

    /// Open the database at an explicit path.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    #[cfg(test)]
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute_batch(
                "PRAGMA foreign_keys = ON;

                CREATE TABLE IF NOT EXISTS users (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    chat_id    INTEGER NOT NULL UNIQUE,
                    timezone   TEXT NOT NULL DEFAULT 'Europe/Moscow',
                    is_active  INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS cycles (
                    id            INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    start_date    TEXT NOT NULL,
                    cycle_length  INTEGER NOT NULL CHECK (cycle_length BETWEEN 21 AND 40),
                    period_length INTEGER NOT NULL CHECK (period_length BETWEEN 1 AND 10),
                    is_current    INTEGER NOT NULL DEFAULT 0,
                    notes         TEXT,
                    created_at    TEXT NOT NULL,
                    updated_at    TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS notification_settings (
                    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    kind        TEXT NOT NULL,
                    is_enabled  INTEGER NOT NULL DEFAULT 1,
                    time_offset INTEGER,
                    PRIMARY KEY (user_id, kind)
                );

                CREATE TABLE IF NOT EXISTS jobs (
                    user_id  INTEGER NOT NULL,
                    kind     TEXT NOT NULL,
                    send_at  TEXT NOT NULL,
                    PRIMARY KEY (user_id, kind)
                );

                CREATE TABLE IF NOT EXISTS notification_log (
                    id           INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id      INTEGER NOT NULL,
                    kind         TEXT NOT NULL,
                    status       TEXT NOT NULL,
                    scheduled_at TEXT,
                    sent_at      TEXT,
                    error        TEXT,
                    retry_count  INTEGER NOT NULL DEFAULT 0,
                    created_at   TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_cycles_user_current ON cycles(user_id, is_current);
                CREATE INDEX IF NOT EXISTS idx_jobs_send_at ON jobs(send_at);
                CREATE INDEX IF NOT EXISTS idx_log_user ON notification_log(user_id, created_at);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    // === Users ===

    /// Insert a user or reactivate/update the existing row for `chat_id`.
    pub fn upsert_user(&self, chat_id: i64, timezone: &str) -> Result<User, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (chat_id, timezone, is_active, created_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(chat_id) DO UPDATE SET timezone = excluded.timezone, is_active = 1",
            params![chat_id, timezone, Utc::now().to_rfc3339()],
        )?;
        let user = conn.query_row(
            "SELECT id, chat_id, timezone, is_active, created_at FROM users WHERE chat_id = ?1",
            params![chat_id],
            row_to_user,
        )?;
        Ok(user)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        let conn = self.conn();
        let user = conn
            .query_row(
                "SELECT id, chat_id, timezone, is_active, created_at FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn set_user_active(&self, id: i64, is_active: bool) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE users SET is_active = ?2 WHERE id = ?1",
            params![id, is_active],
        )?;
        Ok(())
    }

    pub fn set_user_timezone(&self, id: i64, timezone: &str) -> Result<(), DatabaseError> {
        self.conn().execute(
            "UPDATE users SET timezone = ?2 WHERE id = ?1",
            params![id, timezone],
        )?;
        Ok(())
    }

    pub fn list_active_users(&self) -> Result<Vec<User>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, timezone, is_active, created_at
             FROM users WHERE is_active = 1 ORDER BY id",
        )?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Delete a user and everything owned by or referencing them.
    ///
    /// Cycles and preferences go via the foreign-key cascade; jobs and the
    /// delivery log reference the user weakly and are purged explicitly.
    pub fn delete_user(&self, id: i64) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute("DELETE FROM jobs WHERE user_id = ?1", params![id])?;
        conn.execute(
            "DELETE FROM notification_log WHERE user_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        info!(user_id = id, "deleted user and associated data");
        Ok(())
    }

    // === Cycles ===

    /// Record a new cycle and make it the user's current one.
    ///
    /// Validates length bounds at this boundary; the previous current
    /// cycle is un-set in the same transaction, so at most one cycle per
    /// user is ever current.
    pub fn create_cycle(
        &self,
        user_id: i64,
        start_date: NaiveDate,
        cycle_length: i64,
        period_length: i64,
        notes: Option<&str>,
    ) -> Result<Cycle, CoreError> {
        if !CYCLE_LENGTH_RANGE.contains(&cycle_length) {
            return Err(ValidationError::OutOfRange {
                field: "cycle_length",
                value: cycle_length,
                min: *CYCLE_LENGTH_RANGE.start(),
                max: *CYCLE_LENGTH_RANGE.end(),
            }
            .into());
        }
        if !PERIOD_LENGTH_RANGE.contains(&period_length) {
            return Err(ValidationError::OutOfRange {
                field: "period_length",
                value: period_length,
                min: *PERIOD_LENGTH_RANGE.start(),
                max: *PERIOD_LENGTH_RANGE.end(),
            }
            .into());
        }

        let mut conn = self.conn();
        let tx = conn.transaction().map_err(DatabaseError::from)?;
        tx.execute(
            "UPDATE cycles SET is_current = 0 WHERE user_id = ?1 AND is_current = 1",
            params![user_id],
        )
        .map_err(DatabaseError::from)?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO cycles (user_id, start_date, cycle_length, period_length,
                                 is_current, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?6)",
            params![
                user_id,
                start_date.format("%Y-%m-%d").to_string(),
                cycle_length,
                period_length,
                notes,
                now,
            ],
        )
        .map_err(DatabaseError::from)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(DatabaseError::from)?;
        drop(conn);

        let cycle = self
            .get_cycle(id)?
            .ok_or_else(|| DatabaseError::NotFound(format!("cycle {id}")))?;
        info!(user_id, cycle_id = id, %start_date, "recorded new current cycle");
        Ok(cycle)
    }

    pub fn get_cycle(&self, id: i64) -> Result<Option<Cycle>, DatabaseError> {
        let conn = self.conn();
        let cycle = conn
            .query_row(
                "SELECT id, user_id, start_date, cycle_length, period_length,
                        is_current, notes, created_at, updated_at
                 FROM cycles WHERE id = ?1",
                params![id],
                row_to_cycle,
            )
            .optional()?;
        Ok(cycle)
    }

    pub fn get_current_cycle(&self, user_id: i64) -> Result<Option<Cycle>, DatabaseError> {
        let conn = self.conn();
        let cycle = conn
            .query_row(
                "SELECT id, user_id, start_date, cycle_length, period_length,
                        is_current, notes, created_at, updated_at
                 FROM cycles WHERE user_id = ?1 AND is_current = 1",
                params![user_id],
                row_to_cycle,
            )
            .optional()?;
        Ok(cycle)
    }

    /// All cycles for a user, newest first (history display).
    pub fn list_cycles(&self, user_id: i64) -> Result<Vec<Cycle>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, start_date, cycle_length, period_length,
                    is_current, notes, created_at, updated_at
             FROM cycles WHERE user_id = ?1 ORDER BY start_date DESC",
        )?;
        let cycles = stmt
            .query_map(params![user_id], row_to_cycle)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cycles)
    }

    // === Notification preferences ===

    /// Insert or update the preference row for `(user_id, kind)`.
    pub fn upsert_preference(
        &self,
        user_id: i64,
        kind: NotificationKind,
        is_enabled: bool,
        time_offset: Option<u32>,
    ) -> Result<NotificationPreference, DatabaseError> {
        self.conn().execute(
            "INSERT INTO notification_settings (user_id, kind, is_enabled, time_offset)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, kind) DO UPDATE SET
                 is_enabled = excluded.is_enabled,
                 time_offset = excluded.time_offset",
            params![user_id, kind.as_str(), is_enabled, time_offset],
        )?;
        Ok(NotificationPreference {
            user_id,
            kind,
            is_enabled,
            time_offset,
        })
    }

    pub fn get_preferences(&self, user_id: i64) -> Result<Vec<NotificationPreference>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, kind, is_enabled, time_offset
             FROM notification_settings WHERE user_id = ?1",
        )?;
        let prefs = stmt
            .query_map(params![user_id], row_to_preference)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(prefs)
    }

    // === Jobs ===

    /// Insert or atomically replace the job for `(user_id, kind)`.
    pub fn put_job(
        &self,
        user_id: i64,
        kind: NotificationKind,
        send_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO jobs (user_id, kind, send_at) VALUES (?1, ?2, ?3)",
            params![user_id, kind.as_str(), send_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_job(
        &self,
        user_id: i64,
        kind: NotificationKind,
    ) -> Result<Option<ScheduledJob>, DatabaseError> {
        let conn = self.conn();
        let job = conn
            .query_row(
                "SELECT user_id, kind, send_at FROM jobs WHERE user_id = ?1 AND kind = ?2",
                params![user_id, kind.as_str()],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Remove the job if present. Absence is not an error.
    pub fn delete_job(&self, user_id: i64, kind: NotificationKind) -> Result<bool, DatabaseError> {
        let removed = self.conn().execute(
            "DELETE FROM jobs WHERE user_id = ?1 AND kind = ?2",
            params![user_id, kind.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// Remove every job for a user; returns the count removed.
    pub fn delete_user_jobs(&self, user_id: i64) -> Result<usize, DatabaseError> {
        let removed = self
            .conn()
            .execute("DELETE FROM jobs WHERE user_id = ?1", params![user_id])?;
        Ok(removed)
    }

    /// Claim a job for firing by removing its exact row.
    ///
    /// Returns false when the row is gone or holds a different instant,
    /// i.e. the job was superseded or already claimed; the caller must
    /// not fire in that case.
    pub fn claim_job(
        &self,
        user_id: i64,
        kind: NotificationKind,
        send_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let removed = self.conn().execute(
            "DELETE FROM jobs WHERE user_id = ?1 AND kind = ?2 AND send_at = ?3",
            params![user_id, kind.as_str(), send_at.to_rfc3339()],
        )?;
        Ok(removed > 0)
    }

    /// All live jobs for a user, soonest first.
    pub fn list_user_jobs(&self, user_id: i64) -> Result<Vec<ScheduledJob>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, kind, send_at FROM jobs WHERE user_id = ?1 ORDER BY send_at",
        )?;
        let jobs = stmt
            .query_map(params![user_id], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Jobs whose instant has been reached.
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, kind, send_at FROM jobs WHERE send_at <= ?1 ORDER BY send_at",
        )?;
        let jobs = stmt
            .query_map(params![now.to_rfc3339()], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Distinct user ids holding at least one live job.
    pub fn list_job_user_ids(&self) -> Result<Vec<i64>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM jobs ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Drop jobs whose instant is already past `cutoff`; returns the count.
    pub fn purge_jobs_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let removed = self.conn().execute(
            "DELETE FROM jobs WHERE send_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }

    /// Live job counts by kind, for introspection.
    pub fn job_counts_by_kind(&self) -> Result<Vec<(NotificationKind, usize)>, DatabaseError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT kind, COUNT(*) FROM jobs GROUP BY kind ORDER BY kind")?;
        let counts = stmt
            .query_map([], |row| {
                let kind: String = row.get(0)?;
                let count: usize = row.get(1)?;
                Ok((parse_kind_fallback(&kind), count))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    // === Delivery log ===

    /// Append a delivery-history record; returns its id.
    #[allow(clippy::too_many_arguments)]
    pub fn append_log(
        &self,
        user_id: i64,
        kind: NotificationKind,
        status: &str,
        scheduled_at: Option<DateTime<Utc>>,
        sent_at: Option<DateTime<Utc>>,
        error: Option<&str>,
        retry_count: u32,
    ) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO notification_log
                 (user_id, kind, status, scheduled_at, sent_at, error, retry_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user_id,
                kind.as_str(),
                status,
                scheduled_at.map(|dt| dt.to_rfc3339()),
                sent_at.map(|dt| dt.to_rfc3339()),
                error,
                retry_count,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent delivery records for a user.
    pub fn recent_logs(&self, user_id: i64, limit: usize) -> Result<Vec<DeliveryRecord>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, status, scheduled_at, sent_at, error, retry_count, created_at
             FROM notification_log WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let records = stmt
            .query_map(params![user_id, limit], row_to_delivery_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn seed_user(db: &Db) -> User {
        db.upsert_user(1001, "Europe/Moscow").unwrap()
    }

    #[test]
    fn upsert_user_is_idempotent() {
        let db = Db::open_memory().unwrap();
        let first = db.upsert_user(1001, "Europe/Moscow").unwrap();
        let second = db.upsert_user(1001, "America/New_York").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.timezone, "America/New_York");
        assert_eq!(db.list_active_users().unwrap().len(), 1);
    }

    #[test]
    fn deactivated_user_leaves_active_listing() {
        let db = Db::open_memory().unwrap();
        let user = seed_user(&db);
        db.set_user_active(user.id, false).unwrap();
        assert!(db.list_active_users().unwrap().is_empty());
        assert!(!db.get_user(user.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn at_most_one_current_cycle_per_user() {
        let db = Db::open_memory().unwrap();
        let user = seed_user(&db);
        let first = db
            .create_cycle(user.id, d(2025, 8, 1), 28, 5, None)
            .unwrap();
        let second = db
            .create_cycle(user.id, d(2025, 9, 1), 30, 4, Some("late"))
            .unwrap();

        assert!(!db.get_cycle(first.id).unwrap().unwrap().is_current);
        assert!(second.is_current);
        assert_eq!(db.get_current_cycle(user.id).unwrap().unwrap().id, second.id);
        // history keeps both
        assert_eq!(db.list_cycles(user.id).unwrap().len(), 2);
    }

    #[test]
    fn cycle_validation_rejects_out_of_range() {
        let db = Db::open_memory().unwrap();
        let user = seed_user(&db);
        assert!(matches!(
            db.create_cycle(user.id, d(2025, 9, 1), 20, 5, None),
            Err(CoreError::Validation(ValidationError::OutOfRange { field: "cycle_length", .. }))
        ));
        assert!(matches!(
            db.create_cycle(user.id, d(2025, 9, 1), 28, 11, None),
            Err(CoreError::Validation(ValidationError::OutOfRange { field: "period_length", .. }))
        ));
        assert!(db.get_current_cycle(user.id).unwrap().is_none());
    }

    #[test]
    fn preference_upsert_keeps_one_row_per_kind() {
        let db = Db::open_memory().unwrap();
        let user = seed_user(&db);
        db.upsert_preference(user.id, NotificationKind::OvulationDay, true, None)
            .unwrap();
        db.upsert_preference(user.id, NotificationKind::OvulationDay, false, Some(600))
            .unwrap();

        let prefs = db.get_preferences(user.id).unwrap();
        assert_eq!(prefs.len(), 1);
        assert!(!prefs[0].is_enabled);
        assert_eq!(prefs[0].time_offset, Some(600));
    }

    #[test]
    fn put_job_replaces_by_key() {
        let db = Db::open_memory().unwrap();
        let t1: DateTime<Utc> = "2025-09-27T06:00:00Z".parse().unwrap();
        let t2: DateTime<Utc> = "2025-09-29T06:00:00Z".parse().unwrap();

        db.put_job(1, NotificationKind::PeriodStart, t1).unwrap();
        db.put_job(1, NotificationKind::PeriodStart, t1).unwrap();
        db.put_job(1, NotificationKind::PeriodStart, t2).unwrap();

        let jobs = db.list_user_jobs(1).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].send_at, t2);
    }

    #[test]
    fn claim_job_requires_exact_instant() {
        let db = Db::open_memory().unwrap();
        let t1: DateTime<Utc> = "2025-09-27T06:00:00Z".parse().unwrap();
        let t2: DateTime<Utc> = "2025-09-29T06:00:00Z".parse().unwrap();

        db.put_job(1, NotificationKind::PeriodStart, t1).unwrap();
        // superseded before firing
        db.put_job(1, NotificationKind::PeriodStart, t2).unwrap();

        assert!(!db.claim_job(1, NotificationKind::PeriodStart, t1).unwrap());
        assert!(db.claim_job(1, NotificationKind::PeriodStart, t2).unwrap());
        // second claim loses
        assert!(!db.claim_job(1, NotificationKind::PeriodStart, t2).unwrap());
    }

    #[test]
    fn due_and_purge_respect_cutoffs() {
        let db = Db::open_memory().unwrap();
        let past: DateTime<Utc> = "2025-09-01T06:00:00Z".parse().unwrap();
        let future: DateTime<Utc> = "2025-09-29T06:00:00Z".parse().unwrap();
        let now: DateTime<Utc> = "2025-09-10T00:00:00Z".parse().unwrap();

        db.put_job(1, NotificationKind::PeriodStart, past).unwrap();
        db.put_job(1, NotificationKind::OvulationDay, future).unwrap();

        let due = db.due_jobs(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, NotificationKind::PeriodStart);

        assert_eq!(db.purge_jobs_before(now).unwrap(), 1);
        assert_eq!(db.list_user_jobs(1).unwrap().len(), 1);
    }

    #[test]
    fn delete_user_purges_everything() {
        let db = Db::open_memory().unwrap();
        let user = seed_user(&db);
        db.create_cycle(user.id, d(2025, 9, 1), 28, 5, None).unwrap();
        db.upsert_preference(user.id, NotificationKind::PeriodStart, true, None)
            .unwrap();
        db.put_job(user.id, NotificationKind::PeriodStart, Utc::now())
            .unwrap();
        db.append_log(user.id, NotificationKind::PeriodStart, "sent", None, None, None, 0)
            .unwrap();

        db.delete_user(user.id).unwrap();

        assert!(db.get_user(user.id).unwrap().is_none());
        assert!(db.get_current_cycle(user.id).unwrap().is_none());
        assert!(db.get_preferences(user.id).unwrap().is_empty());
        assert!(db.list_user_jobs(user.id).unwrap().is_empty());
        assert!(db.recent_logs(user.id, 10).unwrap().is_empty());
    }

    #[test]
    fn delivery_log_round_trip() {
        let db = Db::open_memory().unwrap();
        let scheduled: DateTime<Utc> = "2025-09-27T06:00:00Z".parse().unwrap();
        db.append_log(
            7,
            NotificationKind::PeriodReminder,
            "failed_network",
            Some(scheduled),
            None,
            Some("connection reset"),
            3,
        )
        .unwrap();

        let logs = db.recent_logs(7, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, "failed_network");
        assert_eq!(logs[0].scheduled_at, Some(scheduled));
        assert_eq!(logs[0].retry_count, 3);
        assert_eq!(logs[0].error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn jobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lunara.db");
        let t: DateTime<Utc> = "2025-09-27T06:00:00Z".parse().unwrap();
        {
            let db = Db::open(&path).unwrap();
            db.put_job(1, NotificationKind::PeriodStart, t).unwrap();
        }
        let db = Db::open(&path).unwrap();
        let jobs = db.list_user_jobs(1).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].send_at, t);
    }

    #[test]
    fn job_counts_group_by_kind() {
        let db = Db::open_memory().unwrap();
        let t: DateTime<Utc> = "2025-09-27T06:00:00Z".parse().unwrap();
        db.put_job(1, NotificationKind::PeriodStart, t).unwrap();
        db.put_job(2, NotificationKind::PeriodStart, t).unwrap();
        db.put_job(2, NotificationKind::OvulationDay, t).unwrap();

        let counts = db.job_counts_by_kind().unwrap();
        let total: usize = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 3);
        assert!(counts.contains(&(NotificationKind::PeriodStart, 2)));
    }
}
