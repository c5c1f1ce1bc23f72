//! Alert levels with severity ordering
//!
//! Levels form a total order `Info < Warning < Urgent < Critical`, so the
//! worst level of a set can be taken with `max()`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum_macros::{Display, EnumString};

/// Days an obligation may be due within before escalating to `warning`
pub const WARNING_WINDOW_DAYS: i64 = 30;

/// Days an obligation may be due within before escalating to `urgent`
pub const URGENT_WINDOW_DAYS: i64 = 3;

/// Alert severity - ordered from lowest to highest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info = 1,
    Warning = 2,
    Urgent = 3,
    Critical = 4,
}

impl PartialOrd for AlertLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AlertLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl Default for AlertLevel {
    fn default() -> Self {
        AlertLevel::Info
    }
}

/// Signed number of days between today and the due date.
///
/// Negative once the due date has passed.
pub fn days_until_due(due_date: NaiveDate, today: NaiveDate) -> i64 {
    (due_date - today).num_days()
}

/// True when the due date has passed and the obligation is not settled.
///
/// `settled` covers paid and cancelled obligations: neither can be overdue.
pub fn is_overdue(due_date: NaiveDate, settled: bool, today: NaiveDate) -> bool {
    !settled && days_until_due(due_date, today) < 0
}

/// Compute the alert level for an obligation.
///
/// Settled obligations are always `info`. For open obligations the level
/// is monotonic: it never decreases as the due date approaches.
pub fn alert_level(due_date: NaiveDate, settled: bool, today: NaiveDate) -> AlertLevel {
    if settled {
        return AlertLevel::Info;
    }

    let days = days_until_due(due_date, today);
    if days < 0 {
        AlertLevel::Critical
    } else if days <= URGENT_WINDOW_DAYS {
        AlertLevel::Urgent
    } else if days <= WARNING_WINDOW_DAYS {
        AlertLevel::Warning
    } else {
        AlertLevel::Info
    }
}
