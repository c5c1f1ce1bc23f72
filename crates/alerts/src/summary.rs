//! Alerts summary - counts and totals per escalation bucket

use crate::level::{days_until_due, is_overdue, URGENT_WINDOW_DAYS, WARNING_WINDOW_DAYS};
use chrono::NaiveDate;
use fisca_core::Amount;
use serde::{Deserialize, Serialize};

/// One bucket of the summary: how many obligations and how much money
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertBucket {
    pub count: usize,
    pub total_amount: Amount,
}

impl AlertBucket {
    fn record(&mut self, amount: Amount) {
        self.count += 1;
        self.total_amount = self
            .total_amount
            .checked_add(&amount)
            .unwrap_or(self.total_amount);
    }
}

/// Dashboard view over open obligations: overdue, due within 3 days,
/// due within 30 days. Buckets are disjoint; settled obligations are
/// never counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertsSummary {
    pub overdue: AlertBucket,
    pub urgent: AlertBucket,
    pub upcoming: AlertBucket,
}

impl AlertsSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one obligation into the summary
    pub fn record(&mut self, due_date: NaiveDate, settled: bool, amount: Amount, today: NaiveDate) {
        if settled {
            return;
        }

        if is_overdue(due_date, settled, today) {
            self.overdue.record(amount);
            return;
        }

        let days = days_until_due(due_date, today);
        if days <= URGENT_WINDOW_DAYS {
            self.urgent.record(amount);
        } else if days <= WARNING_WINDOW_DAYS {
            self.upcoming.record(amount);
        }
    }

    /// Total number of obligations needing attention
    pub fn total_count(&self) -> usize {
        self.overdue.count + self.urgent.count + self.upcoming.count
    }
}
