use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use lunara_core::cycle::calculator;

use crate::common::build_engine;

#[derive(Subcommand)]
pub enum CycleAction {
    /// Record a new cycle and reschedule notifications
    Log {
        user_id: i64,
        /// Start date of the last period, YYYY-MM-DD
        start_date: String,
        #[arg(long, default_value_t = 28)]
        cycle_length: i64,
        #[arg(long, default_value_t = 5)]
        period_length: i64,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show derived dates and the current phase
    Status { user_id: i64 },
    /// List recorded cycles, newest first
    History { user_id: i64 },
}

pub fn run(action: CycleAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine()?;
    match action {
        CycleAction::Log {
            user_id,
            start_date,
            cycle_length,
            period_length,
            notes,
        } => {
            let start = NaiveDate::parse_from_str(&start_date, "%Y-%m-%d")?;
            let cycle = engine.db.create_cycle(
                user_id,
                start,
                cycle_length,
                period_length,
                notes.as_deref(),
            )?;
            println!("cycle {} recorded, starting {}", cycle.id, cycle.start_date);

            // best-effort: the cycle edit stands even if scheduling fails
            match engine.scheduler.schedule_for_cycle(user_id, cycle.id) {
                Ok(created) => println!("{created} notifications scheduled"),
                Err(e) => eprintln!("warning: failed to schedule notifications: {e}"),
            }
        }
        CycleAction::Status { user_id } => {
            let Some(cycle) = engine.db.get_current_cycle(user_id)? else {
                println!("no current cycle for user {user_id}");
                return Ok(());
            };
            let dates = calculator::cycle_dates(&cycle, Utc::now().date_naive());
            let phase = &dates.current_phase;
            println!(
                "day {} of {}: {} ({})",
                phase.day,
                dates.cycle_length,
                phase.phase,
                phase.phase.description()
            );
            println!("ovulation:      {}", dates.ovulation_date);
            println!(
                "fertile window: {} .. {}",
                dates.fertile_window.start, dates.fertile_window.end
            );
            if let Some(safe) = dates.first_safe_period {
                println!("safe period:    {} .. {}", safe.start, safe.end);
            }
            if let Some(safe) = dates.second_safe_period {
                println!("safe period:    {} .. {}", safe.start, safe.end);
            }
            println!("next period:    {}", dates.next_period);
            println!(
                "fertile today: {}, safe today: {}, days until period: {}",
                phase.is_fertile, phase.is_safe, phase.days_until_period
            );
        }
        CycleAction::History { user_id } => {
            for cycle in engine.db.list_cycles(user_id)? {
                println!(
                    "{}\t{}\tlength {}\tperiod {}\t{}",
                    cycle.id,
                    cycle.start_date,
                    cycle.cycle_length,
                    cycle.period_length,
                    if cycle.is_current { "current" } else { "" }
                );
            }
        }
    }
    Ok(())
}
