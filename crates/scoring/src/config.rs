//! Scoring configuration
//!
//! Weights and the statistics window are configurable via file, not
//! hardcoded, so scoring can be tuned without recompilation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for the risk scoring engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Points lost per currently-late obligation (w1)
    #[serde(default = "default_late_count_weight")]
    pub late_count_weight: Decimal,

    /// Points lost per day of average payment delay (w2)
    #[serde(default = "default_delay_weight")]
    pub delay_weight: Decimal,

    /// Points lost per percentage point under full compliance (w3)
    #[serde(default = "default_compliance_weight")]
    pub compliance_weight: Decimal,

    /// Trailing window for payment-behavior statistics, in months
    #[serde(default = "default_window_months")]
    pub window_months: u32,
}

// Default value functions for serde
fn default_late_count_weight() -> Decimal {
    Decimal::new(5, 0)
}

fn default_delay_weight() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_compliance_weight() -> Decimal {
    Decimal::new(4, 1) // 0.4
}

fn default_window_months() -> u32 {
    12
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            late_count_weight: default_late_count_weight(),
            delay_weight: default_delay_weight(),
            compliance_weight: default_compliance_weight(),
            window_months: default_window_months(),
        }
    }
}

impl ScoringConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = ScoringConfig::default();

        assert_eq!(config.late_count_weight, dec!(5));
        assert_eq!(config.delay_weight, dec!(0.5));
        assert_eq!(config.compliance_weight, dec!(0.4));
        assert_eq!(config.window_months, 12);
    }

    #[test]
    fn test_config_partial_json() {
        // Missing fields fall back to defaults
        let json = r#"{ "window_months": 6 }"#;
        let config: ScoringConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.window_months, 6);
        assert_eq!(config.late_count_weight, dec!(5));
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scoring.json");
        std::fs::write(&path, r#"{ "late_count_weight": "10" }"#).unwrap();

        let config = ScoringConfig::from_file(&path).unwrap();
        assert_eq!(config.late_count_weight, dec!(10));
        assert_eq!(config.delay_weight, dec!(0.5));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = ScoringConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: ScoringConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.window_months, config.window_months);
        assert_eq!(parsed.delay_weight, config.delay_weight);
    }
}
