//! Snapshot store: latest risk score per client, on SQLite

use crate::level::RiskLevel;
use crate::snapshot::RiskScoreSnapshot;
use chrono::{DateTime, Utc};
use fisca_core::Amount;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persisted snapshots, one row per client. Recomputing a client
/// overwrites their row, so repeated sweeps converge on the same state.
pub struct SnapshotStore {
    pool: SqlitePool,
}

impl SnapshotStore {
    /// Open (or create) the snapshot database at the given path
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, ScoringError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePool::connect(&db_url).await?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    async fn init(&self) -> Result<(), ScoringError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_snapshots (
                client_id TEXT PRIMARY KEY,
                score INTEGER NOT NULL,
                level TEXT NOT NULL,
                late_count INTEGER NOT NULL,
                late_amount TEXT NOT NULL,
                total_penalties TEXT NOT NULL,
                average_delay TEXT NOT NULL,
                compliance_rate TEXT NOT NULL,
                window_months INTEGER NOT NULL,
                computed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or overwrite the snapshot for a client
    pub async fn upsert(&self, snapshot: &RiskScoreSnapshot) -> Result<(), ScoringError> {
        sqlx::query(
            r#"
            INSERT INTO risk_snapshots
                (client_id, score, level, late_count, late_amount,
                 total_penalties, average_delay, compliance_rate,
                 window_months, computed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(client_id) DO UPDATE SET
                score = excluded.score,
                level = excluded.level,
                late_count = excluded.late_count,
                late_amount = excluded.late_amount,
                total_penalties = excluded.total_penalties,
                average_delay = excluded.average_delay,
                compliance_rate = excluded.compliance_rate,
                window_months = excluded.window_months,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(&snapshot.client_id)
        .bind(snapshot.score as i64)
        .bind(snapshot.level.to_string())
        .bind(snapshot.late_obligations_count as i64)
        .bind(snapshot.late_obligations_amount.value().to_string())
        .bind(snapshot.total_penalties_amount.value().to_string())
        .bind(snapshot.average_payment_delay_days.to_string())
        .bind(snapshot.compliance_rate.to_string())
        .bind(snapshot.window_months as i64)
        .bind(snapshot.computed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Latest snapshot for one client
    pub async fn get(&self, client_id: &str) -> Result<Option<RiskScoreSnapshot>, ScoringError> {
        let row = sqlx::query(
            "SELECT client_id, score, level, late_count, late_amount,
                    total_penalties, average_delay, compliance_rate,
                    window_months, computed_at
             FROM risk_snapshots WHERE client_id = ?",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_snapshot(&r)))
    }

    /// All snapshots, riskiest clients first
    pub async fn list(&self) -> Result<Vec<RiskScoreSnapshot>, ScoringError> {
        let rows = sqlx::query(
            "SELECT client_id, score, level, late_count, late_amount,
                    total_penalties, average_delay, compliance_rate,
                    window_months, computed_at
             FROM risk_snapshots ORDER BY score, client_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_snapshot).collect())
    }
}

fn row_to_snapshot(row: &SqliteRow) -> RiskScoreSnapshot {
    let score = row.get::<i64, _>("score").clamp(0, 100) as u8;
    let level_str: String = row.get("level");
    let computed_at_str: String = row.get("computed_at");

    RiskScoreSnapshot {
        client_id: row.get("client_id"),
        score,
        // Unreadable rows degrade to values derivable from the score
        level: level_str.parse().unwrap_or(RiskLevel::from_score(score)),
        late_obligations_count: row.get::<i64, _>("late_count").max(0) as usize,
        late_obligations_amount: parse_amount(row.get("late_amount")),
        total_penalties_amount: parse_amount(row.get("total_penalties")),
        average_payment_delay_days: parse_decimal(row.get("average_delay")),
        compliance_rate: parse_decimal(row.get("compliance_rate")),
        window_months: row.get::<i64, _>("window_months").max(0) as u32,
        computed_at: DateTime::parse_from_rfc3339(&computed_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    }
}

fn parse_decimal(s: String) -> Decimal {
    s.parse().unwrap_or(Decimal::ZERO)
}

fn parse_amount(s: String) -> Amount {
    Amount::new(parse_decimal(s)).unwrap_or(Amount::ZERO)
}
