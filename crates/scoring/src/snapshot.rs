//! Risk score snapshot: the persisted result of one scoring run

use crate::config::ScoringConfig;
use crate::level::RiskLevel;
use crate::stats::ComplianceStats;
use chrono::{DateTime, NaiveDate, Utc};
use fisca_core::Amount;
use fisca_registry::Obligation;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Snapshot of a client's compliance risk at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScoreSnapshot {
    pub client_id: String,

    /// 0 (critical) to 100 (spotless)
    pub score: u8,
    pub level: RiskLevel,

    pub late_obligations_count: usize,
    pub late_obligations_amount: Amount,
    pub total_penalties_amount: Amount,
    pub average_payment_delay_days: Decimal,
    pub compliance_rate: Decimal,

    /// Statistics window used for this run, in months
    pub window_months: u32,
    pub computed_at: DateTime<Utc>,
}

impl RiskScoreSnapshot {
    /// Score a client from their full obligation history.
    ///
    /// Deterministic: identical obligations, config and dates produce
    /// the identical snapshot.
    pub fn compute(
        client_id: &str,
        obligations: &[Obligation],
        config: &ScoringConfig,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        let stats = ComplianceStats::compute(obligations, today, config.window_months);

        let raw = Decimal::ONE_HUNDRED
            - config.late_count_weight * Decimal::from(stats.late_count as u64)
            - config.delay_weight * stats.average_delay_days
            - config.compliance_weight * (Decimal::ONE_HUNDRED - stats.compliance_rate);

        let clamped = raw.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        let score = clamped.round().to_u8().unwrap_or(0);

        Self {
            client_id: client_id.to_string(),
            score,
            level: RiskLevel::from_score(score),
            late_obligations_count: stats.late_count,
            late_obligations_amount: stats.late_amount,
            total_penalties_amount: stats.total_penalties,
            average_payment_delay_days: stats.average_delay_days,
            compliance_rate: stats.compliance_rate,
            window_months: config.window_months,
            computed_at: now,
        }
    }
}
