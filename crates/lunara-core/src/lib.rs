//! # Lunara Core Library
//!
//! Core business logic for Lunara, a chat-delivered menstrual-cycle
//! tracking assistant. The heart of the crate is the notification
//! scheduling engine: it derives cycle dates (ovulation, fertile window,
//! safe periods, next period) with calendar-method arithmetic, resolves
//! per-user timezone-aware send instants, and keeps a persistent
//! at-most-one-per-key job store that survives restarts and fires each
//! job exactly once.
//!
//! ## Key Components
//!
//! - [`cycle::calculator`]: pure cycle date arithmetic
//! - [`NotificationKind`]: the closed catalog of notification kinds
//! - [`notify::resolver`]: timezone-aware send-instant resolution
//! - [`NotificationScheduler`]: persistent job store + firing loop
//! - [`DeliverySender`]: transport delivery with bounded retries
//! - [`Db`]: SQLite persistence for users, cycles, preferences, jobs,
//!   and the delivery log

pub mod clock;
pub mod cycle;
pub mod error;
pub mod notify;
pub mod scheduler;
pub mod storage;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use cycle::{Cycle, CycleDates, CyclePhase, DateRange, PhaseInfo};
pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use notify::sender::DeliverySender;
pub use notify::{NotificationKind, NotificationPreference};
pub use scheduler::{JobStats, NotificationScheduler};
pub use storage::{Config, Db, ScheduledJob, SchedulerConfig, User};
pub use transport::{MessageTransport, SendOutcome, TelegramTransport};
