//! Payment-behavior statistics over a client's obligation history

use chrono::{Months, NaiveDate};
use fisca_core::Amount;
use fisca_registry::{Obligation, ObligationState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregates the scoring formula consumes.
///
/// Late counts look at the present (overdue and unsettled today).
/// Delay and compliance statistics cover one trailing window: paid
/// obligations selected by `payment_date`, plus every currently-late
/// obligation with its lateness counted as payment delay accrued so
/// far. Cancelled obligations are invisible here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceStats {
    pub late_count: usize,
    pub late_amount: Amount,
    pub total_penalties: Amount,
    /// Mean effective delay in days; 0 when nothing is in the window
    pub average_delay_days: Decimal,
    /// On-time share in percent; 100 when nothing is in the window
    pub compliance_rate: Decimal,
}

impl ComplianceStats {
    pub fn compute(obligations: &[Obligation], today: NaiveDate, window_months: u32) -> Self {
        let window_start = today
            .checked_sub_months(Months::new(window_months))
            .unwrap_or(NaiveDate::MIN);

        let mut late_count = 0usize;
        let mut late_amount = Amount::ZERO;
        let mut total_penalties = Amount::ZERO;
        let mut delay_sum = Decimal::ZERO;
        let mut samples = 0u64;
        let mut on_time = 0u64;

        for obligation in obligations {
            if obligation.state == ObligationState::Cancelled {
                continue;
            }

            total_penalties = total_penalties
                .checked_add(&obligation.penalty_amount)
                .unwrap_or(total_penalties);

            match (obligation.state, obligation.payment_date) {
                (ObligationState::Paid, Some(paid)) => {
                    if paid >= window_start {
                        let delay = (paid - obligation.due_date).num_days().max(0);
                        delay_sum += Decimal::from(delay);
                        samples += 1;
                        if delay == 0 {
                            on_time += 1;
                        }
                    }
                }
                (ObligationState::Paid, None) => {}
                _ => {
                    if obligation.is_overdue(today) {
                        late_count += 1;
                        late_amount = late_amount
                            .checked_add(&obligation.total_amount())
                            .unwrap_or(late_amount);

                        let open_delay = (today - obligation.due_date).num_days();
                        delay_sum += Decimal::from(open_delay);
                        samples += 1;
                    }
                }
            }
        }

        let (average_delay_days, compliance_rate) = if samples == 0 {
            (Decimal::ZERO, Decimal::ONE_HUNDRED)
        } else {
            (
                delay_sum / Decimal::from(samples),
                Decimal::from(on_time) * Decimal::ONE_HUNDRED / Decimal::from(samples),
            )
        };

        Self {
            late_count,
            late_amount,
            total_penalties,
            average_delay_days,
            compliance_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fisca_registry::NewObligation;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn amount(val: i64) -> Amount {
        Amount::new(Decimal::new(val, 0)).unwrap()
    }

    fn open(due: NaiveDate, base: i64, penalty: i64) -> Obligation {
        let mut obligation = NewObligation {
            type_code: "tva".into(),
            client_id: "CL-001".into(),
            due_date: Some(due),
            base_amount: amount(base),
            penalty_amount: amount(penalty),
            ..Default::default()
        }
        .into_obligation(due, Utc::now());
        obligation.state = ObligationState::Todo;
        obligation
    }

    fn paid(due: NaiveDate, paid_on: NaiveDate, base: i64) -> Obligation {
        let mut obligation = open(due, base, 0);
        obligation.state = ObligationState::Paid;
        obligation.payment_date = Some(paid_on);
        obligation
    }

    #[test]
    fn test_empty_history() {
        let stats = ComplianceStats::compute(&[], date(2025, 6, 15), 12);

        assert_eq!(stats.late_count, 0);
        assert_eq!(stats.average_delay_days, Decimal::ZERO);
        assert_eq!(stats.compliance_rate, dec!(100));
    }

    #[test]
    fn test_mixed_history() {
        let today = date(2025, 6, 15);
        let obligations = vec![
            // Overdue by 14 days, 1100 total outstanding
            open(date(2025, 6, 1), 1000, 100),
            // Paid on time, in window
            paid(date(2025, 5, 10), date(2025, 5, 10), 500),
            // Paid 10 days late, in window
            paid(date(2025, 4, 30), date(2025, 5, 10), 800),
        ];

        let stats = ComplianceStats::compute(&obligations, today, 12);

        assert_eq!(stats.late_count, 1);
        assert_eq!(stats.late_amount.value(), dec!(1100));
        assert_eq!(stats.total_penalties.value(), dec!(100));
        // Delays: 14 (open), 0, 10 -> avg 8
        assert_eq!(stats.average_delay_days, dec!(8));
        // 1 on-time out of 3 samples
        assert_eq!(stats.compliance_rate.round_dp(2), dec!(33.33));
    }

    #[test]
    fn test_cancelled_is_invisible() {
        let today = date(2025, 6, 15);
        let mut cancelled = open(date(2025, 6, 1), 1000, 50);
        cancelled.state = ObligationState::Cancelled;

        let stats = ComplianceStats::compute(&[cancelled], today, 12);

        assert_eq!(stats.late_count, 0);
        assert_eq!(stats.total_penalties, Amount::ZERO);
        assert_eq!(stats.compliance_rate, dec!(100));
    }

    #[test]
    fn test_window_excludes_old_payments() {
        let today = date(2025, 6, 15);
        let obligations = vec![
            // Paid 30 days late, but two years ago
            paid(date(2023, 5, 1), date(2023, 5, 31), 500),
            // Paid on time last month
            paid(date(2025, 5, 10), date(2025, 5, 10), 500),
        ];

        let stats = ComplianceStats::compute(&obligations, today, 12);

        assert_eq!(stats.average_delay_days, Decimal::ZERO);
        assert_eq!(stats.compliance_rate, dec!(100));
    }

    #[test]
    fn test_early_payment_is_zero_delay() {
        let today = date(2025, 6, 15);
        let obligations = vec![paid(date(2025, 5, 10), date(2025, 5, 1), 500)];

        let stats = ComplianceStats::compute(&obligations, today, 12);

        assert_eq!(stats.average_delay_days, Decimal::ZERO);
        assert_eq!(stats.compliance_rate, dec!(100));
    }

    #[test]
    fn test_future_due_not_late() {
        let today = date(2025, 6, 15);
        let obligations = vec![open(date(2025, 7, 1), 1000, 0)];

        let stats = ComplianceStats::compute(&obligations, today, 12);

        assert_eq!(stats.late_count, 0);
        assert_eq!(stats.compliance_rate, dec!(100));
    }
}
