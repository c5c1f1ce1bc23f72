//! Fisca Alerts - Due-date escalation calculator
//!
//! Pure functions of `(due_date, settled, today)`. The reference date is
//! always an explicit parameter, never an ambient clock, so results are
//! reproducible and testable.
//!
//! Escalation ladder (severity ordered):
//! - `info`: more than 30 days out, or the obligation is settled
//! - `warning`: due within 30 days
//! - `urgent`: due within 3 days
//! - `critical`: past due and not settled

pub mod level;
pub mod summary;

pub use level::{alert_level, days_until_due, is_overdue, AlertLevel};
pub use summary::{AlertBucket, AlertsSummary};
