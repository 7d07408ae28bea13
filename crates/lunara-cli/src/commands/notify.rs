use chrono::Utc;
use clap::Subcommand;
use lunara_core::notify::resolver;
use lunara_core::NotificationKind;

use crate::common::build_engine;

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Show notification preferences and the next upcoming notification
    List { user_id: i64 },
    /// Change a preference for one notification kind
    Set {
        user_id: i64,
        /// Kind name, e.g. period_reminder or ovulation_day
        kind: String,
        #[arg(long)]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Send time as HH:MM in the user's timezone
        #[arg(long)]
        time: Option<String>,
    },
    /// Show pending scheduled jobs for a user
    Pending { user_id: i64 },
    /// Show live job counts across all users
    Stats,
    /// Show recent delivery history
    History {
        user_id: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Send one notification kind to a user right now, marked as a test
    Test {
        user_id: i64,
        /// Kind name, e.g. period_reminder or ovulation_day
        kind: String,
    },
}

fn parse_minute_of_day(s: &str) -> Result<u32, String> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| format!("expected HH:MM, got {s:?}"))?;
    let h: u32 = h.parse().map_err(|_| format!("bad hour in {s:?}"))?;
    let m: u32 = m.parse().map_err(|_| format!("bad minute in {s:?}"))?;
    if h > 23 || m > 59 {
        return Err(format!("{s:?} is not a valid time of day"));
    }
    Ok(h * 60 + m)
}

fn fmt_minute(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// The kind's real template behind an explicit test marker, so a test
/// send is never mistaken for a scheduled one.
fn test_message(kind: NotificationKind) -> String {
    format!("⚠️ TEST NOTIFICATION\n\n{}", kind.message())
}

pub async fn run(action: NotifyAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine()?;
    match action {
        NotifyAction::List { user_id } => {
            let prefs = engine.db.get_preferences(user_id)?;
            for kind in NotificationKind::ALL {
                let pref = prefs.iter().find(|p| p.kind == kind);
                let enabled = pref.map(|p| p.is_enabled).unwrap_or(true);
                let time = pref
                    .and_then(|p| p.time_offset)
                    .map(fmt_minute)
                    .unwrap_or_else(|| "default".to_string());
                println!(
                    "{}\t{}\t{}",
                    kind.display_name(),
                    if enabled { "on" } else { "off" },
                    time
                );
            }
            if let (Some(user), Some(cycle)) = (
                engine.db.get_user(user_id)?,
                engine.db.get_current_cycle(user_id)?,
            ) {
                match resolver::next_notification(&cycle, &user.timezone, &prefs, Utc::now()) {
                    Some((kind, at)) => println!("next: {} at {}", kind.display_name(), at),
                    None => println!("next: nothing upcoming in this cycle"),
                }
            }
        }
        NotifyAction::Set {
            user_id,
            kind,
            enable,
            disable,
            time,
        } => {
            let kind = NotificationKind::parse(&kind)
                .ok_or_else(|| format!("unknown notification kind {kind:?}"))?;
            if enable && disable {
                return Err("--enable and --disable are mutually exclusive".into());
            }
            let prefs = engine.db.get_preferences(user_id)?;
            let existing = prefs.iter().find(|p| p.kind == kind);
            let is_enabled = if enable {
                true
            } else if disable {
                false
            } else {
                existing.map(|p| p.is_enabled).unwrap_or(true)
            };
            let time_offset = match time {
                Some(t) => Some(parse_minute_of_day(&t)?),
                None => existing.and_then(|p| p.time_offset),
            };
            engine
                .db
                .upsert_preference(user_id, kind, is_enabled, time_offset)?;
            println!(
                "{}: {}, send at {}",
                kind.display_name(),
                if is_enabled { "on" } else { "off" },
                time_offset.map(fmt_minute).unwrap_or_else(|| "default".to_string())
            );
            let rescheduled = engine.scheduler.reschedule_for_user(user_id)?;
            println!("{rescheduled} notifications rescheduled");
        }
        NotifyAction::Pending { user_id } => {
            for job in engine.scheduler.get_pending(user_id)? {
                println!("{}\t{}", job.kind.display_name(), job.send_at);
            }
        }
        NotifyAction::Stats => {
            let stats = engine.scheduler.job_stats()?;
            println!("total pending: {}", stats.total);
            for (kind, count) in stats.by_kind {
                println!("{}\t{}", kind.display_name(), count);
            }
        }
        NotifyAction::History { user_id, limit } => {
            for record in engine.db.recent_logs(user_id, limit)? {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.created_at,
                    record.kind.display_name(),
                    record.status,
                    record.error.as_deref().unwrap_or("")
                );
            }
        }
        NotifyAction::Test { user_id, kind } => {
            let kind = NotificationKind::parse(&kind)
                .ok_or_else(|| format!("unknown notification kind {kind:?}"))?;
            let user = engine
                .db
                .get_user(user_id)?
                .ok_or_else(|| format!("no user {user_id}"))?;
            let outcome = engine.transport.send(user.chat_id, &test_message(kind)).await;
            println!("send to chat {}: {:?}", user.chat_id, outcome);
        }
    }
    Ok(())
}
