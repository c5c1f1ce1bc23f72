//! # Fisca Risk Scoring
//!
//! Compliance risk scoring per client: 0 (critical) to 100 (spotless).
//!
//! The score is computed from the client's full obligation history:
//!
//! ```text
//! score = clamp(100 - w1 * late_count
//!                   - w2 * average_delay_days
//!                   - w3 * (100 - compliance_rate), 0, 100)
//! ```
//!
//! Payment-behavior statistics use a trailing window (12 months by
//! default). Currently-late obligations count into the delay average
//! and the compliance rate, so settling an overdue obligation can only
//! move the score up.
//!
//! Snapshots are stored one-per-client and overwritten on recompute, so
//! repeated sweeps are idempotent.

mod config;
mod level;
mod snapshot;
mod stats;
mod store;

pub use config::ScoringConfig;
pub use level::RiskLevel;
pub use snapshot::RiskScoreSnapshot;
pub use stats::ComplianceStats;
pub use store::{ScoringError, SnapshotStore};
