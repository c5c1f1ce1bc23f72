//! Risk level bands over the 0-100 score

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Risk band a score falls into. Ordered by severity: `Low < Medium <
/// High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl PartialOrd for RiskLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl RiskLevel {
    /// Band boundaries: >= 80 low, >= 60 medium, >= 40 high, else critical
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => RiskLevel::Low,
            60..=79 => RiskLevel::Medium,
            40..=59 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}
