//! Static catalog of notification kinds.
//!
//! Each kind carries a message template, a signed day offset relative to
//! its cycle anchor event, and shares a default send time of 09:00 local.
//! Preferences may override the minute-of-day, never the day offset.

use serde::{Deserialize, Serialize};

/// Default send time: 09:00 local, expressed as minute-of-day.
pub const DEFAULT_SEND_MINUTE_OF_DAY: u32 = 9 * 60;

/// Closed set of notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Heads-up two days before the next expected period.
    PeriodReminder,
    /// Expected first day of the next period.
    PeriodStart,
    /// First day of the fertile window.
    FertileWindowStart,
    /// Estimated ovulation day.
    OvulationDay,
    /// Day after the fertile window closes.
    SafePeriod,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 5] = [
        NotificationKind::PeriodReminder,
        NotificationKind::PeriodStart,
        NotificationKind::FertileWindowStart,
        NotificationKind::OvulationDay,
        NotificationKind::SafePeriod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PeriodReminder => "period_reminder",
            NotificationKind::PeriodStart => "period_start",
            NotificationKind::FertileWindowStart => "fertile_window_start",
            NotificationKind::OvulationDay => "ovulation_day",
            NotificationKind::SafePeriod => "safe_period",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == s)
    }

    /// Signed day offset from the kind's anchor event.
    pub fn offset_days(&self) -> i64 {
        match self {
            NotificationKind::PeriodReminder => -2,
            NotificationKind::PeriodStart => 0,
            NotificationKind::FertileWindowStart => 0,
            NotificationKind::OvulationDay => 0,
            NotificationKind::SafePeriod => 1,
        }
    }

    /// Human-readable name for settings surfaces.
    pub fn display_name(&self) -> &'static str {
        match self {
            NotificationKind::PeriodReminder => "Period reminder (2 days ahead)",
            NotificationKind::PeriodStart => "Period start",
            NotificationKind::FertileWindowStart => "Fertile window start",
            NotificationKind::OvulationDay => "Ovulation day",
            NotificationKind::SafePeriod => "Safe period start",
        }
    }

    /// Message template sent to the recipient.
    pub fn message(&self) -> &'static str {
        match self {
            NotificationKind::PeriodReminder => {
                "🔔 Reminder\n\n\
                 Your period is expected to start in 2 days.\n\
                 Make sure you have everything you need.\n\n\
                 💊 If you notice premenstrual symptoms, this is a good \
                 moment to take care of yourself."
            }
            NotificationKind::PeriodStart => {
                "🩸 Period start\n\n\
                 Today is the expected first day of your period.\n\
                 Log the actual start date if it differs.\n\n\
                 💙 Listen to your body and rest when you need to."
            }
            NotificationKind::FertileWindowStart => {
                "🌸 Fertile window\n\n\
                 Your fertile window starts today.\n\
                 The next 6-7 days are the most likely for conception.\n\n\
                 📊 The probability of pregnancy peaks during these days."
            }
            NotificationKind::OvulationDay => {
                "🎯 Ovulation day\n\n\
                 Today is your estimated ovulation day, the peak of \
                 fertility in this cycle.\n\n\
                 🌡️ Possible signs: basal temperature shift, changes in \
                 cervical mucus, mild lower abdominal pain."
            }
            NotificationKind::SafePeriod => {
                "✅ Safe period\n\n\
                 The fertile window has closed.\n\
                 The probability of conception over the coming days is low.\n\n\
                 📝 These are calendar estimates only; use additional \
                 methods for reliable contraception."
            }
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
