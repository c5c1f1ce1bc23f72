//! SQLite storage for obligations

use crate::obligation::{Obligation, ObligationState, Priority};
use chrono::{DateTime, NaiveDate, Utc};
use fisca_core::Amount;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use thiserror::Error;

/// Errors from the obligation store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Obligation not found: {0}")]
    NotFound(String),

    #[error("Corrupted row {id}: {field}")]
    Corrupted { id: String, field: &'static str },
}

/// Storage-level filter; date-dependent criteria (overdue, alert level)
/// are applied by the registry on top of this.
#[derive(Debug, Clone, Default)]
pub struct StoreFilter {
    pub client_id: Option<String>,
    pub type_code: Option<String>,
    /// Restrict to these type codes (periodicity expansion)
    pub type_codes: Option<Vec<String>>,
    pub state: Option<ObligationState>,
}

/// SQLite storage for obligations
pub struct ObligationStore {
    conn: Connection,
}

impl ObligationStore {
    /// Open (or create) a store at the given database path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS obligations (
                id TEXT PRIMARY KEY,
                type_code TEXT NOT NULL,
                client_id TEXT NOT NULL,
                due_date TEXT NOT NULL,
                state TEXT NOT NULL,
                priority TEXT NOT NULL,
                base_amount TEXT NOT NULL,
                penalty_amount TEXT NOT NULL,
                payment_method TEXT,
                paid_by TEXT,
                payment_date TEXT,
                payment_reference TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_obligations_client
             ON obligations(client_id)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_obligations_state
             ON obligations(state)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_obligations_due
             ON obligations(due_date)",
            [],
        )?;

        Ok(())
    }

    /// Insert a freshly created obligation
    pub fn insert(&self, obligation: &Obligation) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO obligations
             (id, type_code, client_id, due_date, state, priority,
              base_amount, penalty_amount, payment_method, paid_by,
              payment_date, payment_reference, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                obligation.id,
                obligation.type_code,
                obligation.client_id,
                obligation.due_date.format("%Y-%m-%d").to_string(),
                obligation.state.to_string(),
                obligation.priority.to_string(),
                obligation.base_amount.value().to_string(),
                obligation.penalty_amount.value().to_string(),
                obligation.payment_method.map(|m| m.to_string()),
                obligation.paid_by.map(|p| p.to_string()),
                obligation
                    .payment_date
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                obligation.payment_reference,
                obligation.notes,
                obligation.created_at.to_rfc3339(),
                obligation.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Persist a mutated obligation (full row update)
    pub fn update(&self, obligation: &Obligation) -> Result<(), StoreError> {
        let rows = self.conn.execute(
            "UPDATE obligations SET
                type_code = ?2, client_id = ?3, due_date = ?4, state = ?5,
                priority = ?6, base_amount = ?7, penalty_amount = ?8,
                payment_method = ?9, paid_by = ?10, payment_date = ?11,
                payment_reference = ?12, notes = ?13, updated_at = ?14
             WHERE id = ?1",
            params![
                obligation.id,
                obligation.type_code,
                obligation.client_id,
                obligation.due_date.format("%Y-%m-%d").to_string(),
                obligation.state.to_string(),
                obligation.priority.to_string(),
                obligation.base_amount.value().to_string(),
                obligation.penalty_amount.value().to_string(),
                obligation.payment_method.map(|m| m.to_string()),
                obligation.paid_by.map(|p| p.to_string()),
                obligation
                    .payment_date
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                obligation.payment_reference,
                obligation.notes,
                obligation.updated_at.to_rfc3339(),
            ],
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound(obligation.id.clone()));
        }

        Ok(())
    }

    /// Get an obligation by id
    pub fn get(&self, id: &str) -> Result<Obligation, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, type_code, client_id, due_date, state, priority,
                    base_amount, penalty_amount, payment_method, paid_by,
                    payment_date, payment_reference, notes, created_at, updated_at
             FROM obligations WHERE id = ?1",
        )?;

        let raw = stmt
            .query_row(params![id], read_raw_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id.to_string()),
                other => StoreError::Database(other),
            })?;

        parse_row(raw)
    }

    /// List obligations matching the filter, ordered by (due_date, id)
    pub fn list(&self, filter: &StoreFilter) -> Result<Vec<Obligation>, StoreError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(ref client_id) = filter.client_id {
            conditions.push(format!("client_id = ?{}", values.len() + 1));
            values.push(Value::Text(client_id.clone()));
        }
        if let Some(ref type_code) = filter.type_code {
            conditions.push(format!("type_code = ?{}", values.len() + 1));
            values.push(Value::Text(type_code.clone()));
        }
        if let Some(ref state) = filter.state {
            conditions.push(format!("state = ?{}", values.len() + 1));
            values.push(Value::Text(state.to_string()));
        }
        if let Some(ref codes) = filter.type_codes {
            // Empty set matches nothing
            if codes.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = codes
                .iter()
                .map(|code| {
                    values.push(Value::Text(code.clone()));
                    format!("?{}", values.len())
                })
                .collect();
            conditions.push(format!("type_code IN ({})", placeholders.join(", ")));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT id, type_code, client_id, due_date, state, priority,
                    base_amount, penalty_amount, payment_method, paid_by,
                    payment_date, payment_reference, notes, created_at, updated_at
             FROM obligations{}
             ORDER BY due_date, id",
            where_clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let raws: Vec<RawRow> = stmt
            .query_map(params_from_iter(values.iter()), read_raw_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(parse_row).collect()
    }

    /// Distinct client ids with at least one obligation
    pub fn client_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT client_id FROM obligations ORDER BY client_id")?;

        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ids)
    }

    /// Count all obligations (any state)
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM obligations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

type RawRow = (
    String,         // id
    String,         // type_code
    String,         // client_id
    String,         // due_date
    String,         // state
    String,         // priority
    String,         // base_amount
    String,         // penalty_amount
    Option<String>, // payment_method
    Option<String>, // paid_by
    Option<String>, // payment_date
    Option<String>, // payment_reference
    Option<String>, // notes
    String,         // created_at
    String,         // updated_at
);

fn read_raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
    ))
}

fn parse_row(raw: RawRow) -> Result<Obligation, StoreError> {
    let id = raw.0;

    let due_date = parse_date(&raw.3, &id, "due_date")?;
    let state: ObligationState = raw.4.parse().map_err(|_| StoreError::Corrupted {
        id: id.clone(),
        field: "state",
    })?;
    let priority: Priority = raw.5.parse().map_err(|_| StoreError::Corrupted {
        id: id.clone(),
        field: "priority",
    })?;
    let base_amount = parse_amount(&raw.6, &id, "base_amount")?;
    let penalty_amount = parse_amount(&raw.7, &id, "penalty_amount")?;
    let payment_method = raw
        .8
        .map(|s| {
            s.parse().map_err(|_| StoreError::Corrupted {
                id: id.clone(),
                field: "payment_method",
            })
        })
        .transpose()?;
    let paid_by = raw
        .9
        .map(|s| {
            s.parse().map_err(|_| StoreError::Corrupted {
                id: id.clone(),
                field: "paid_by",
            })
        })
        .transpose()?;
    let payment_date = raw
        .10
        .map(|s| parse_date(&s, &id, "payment_date"))
        .transpose()?;
    let created_at = parse_timestamp(&raw.13, &id, "created_at")?;
    let updated_at = parse_timestamp(&raw.14, &id, "updated_at")?;

    Ok(Obligation {
        id,
        type_code: raw.1,
        client_id: raw.2,
        due_date,
        state,
        priority,
        base_amount,
        penalty_amount,
        payment_method,
        paid_by,
        payment_date,
        payment_reference: raw.11,
        notes: raw.12,
        created_at,
        updated_at,
    })
}

fn parse_date(s: &str, id: &str, field: &'static str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| StoreError::Corrupted {
        id: id.to_string(),
        field,
    })
}

fn parse_timestamp(s: &str, id: &str, field: &'static str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupted {
            id: id.to_string(),
            field,
        })
}

fn parse_amount(s: &str, id: &str, field: &'static str) -> Result<Amount, StoreError> {
    let value = s.parse().map_err(|_| StoreError::Corrupted {
        id: id.to_string(),
        field,
    })?;
    Amount::new(value).map_err(|_| StoreError::Corrupted {
        id: id.to_string(),
        field,
    })
}
