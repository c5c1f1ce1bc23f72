//! SQLite storage for delegations, with optimistic version checks

use crate::delegation::{DelegationState, PaymentDelegation, SignatureRecord};
use crate::limit::SpendingLimit;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::path::Path;
use thiserror::Error;

/// Errors from the delegation store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delegation not found: {0}")]
    NotFound(String),

    #[error("Delegation {0} was modified concurrently")]
    VersionConflict(String),

    #[error("Corrupted row {id}: {field}")]
    Corrupted { id: String, field: &'static str },
}

/// SQLite storage for delegations
pub struct DelegationStore {
    conn: Connection,
}

impl DelegationStore {
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
            "CREATE TABLE IF NOT EXISTS delegations (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                delegated_types TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT,
                max_per_payment TEXT NOT NULL,
                max_per_month TEXT NOT NULL,
                payment_method TEXT,
                require_validation INTEGER NOT NULL,
                validation_delay_hours INTEGER NOT NULL,
                state TEXT NOT NULL,
                signed_by_client TEXT,
                signed_by_accountant TEXT,
                terms_hash TEXT,
                version INTEGER NOT NULL,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_delegations_state
             ON delegations(state)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_delegations_client
             ON delegations(client_id)",
            [],
        )?;

        Ok(())
    }

    /// Insert a freshly created delegation
    pub fn insert(&self, delegation: &PaymentDelegation) -> Result<(), StoreError> {
        let types_json = serde_json::to_string(&delegation.delegated_types)?;
        let client_sig = signature_json(&delegation.signed_by_client)?;
        let accountant_sig = signature_json(&delegation.signed_by_accountant)?;

        self.conn.execute(
            "INSERT INTO delegations
             (id, client_id, delegated_types, start_date, end_date,
              max_per_payment, max_per_month, payment_method,
              require_validation, validation_delay_hours, state,
              signed_by_client, signed_by_accountant, terms_hash,
              version, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                delegation.id,
                delegation.client_id,
                types_json,
                delegation.start_date.format("%Y-%m-%d").to_string(),
                delegation
                    .end_date
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                Decimal::from(delegation.max_amount_per_payment).to_string(),
                Decimal::from(delegation.max_amount_per_month).to_string(),
                delegation.payment_method.map(|m| m.to_string()),
                delegation.require_client_validation,
                delegation.validation_delay_hours,
                delegation.state.to_string(),
                client_sig,
                accountant_sig,
                delegation.terms_hash,
                delegation.version as i64,
                delegation.notes,
                delegation.created_at.to_rfc3339(),
                delegation.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Persist a mutated delegation.
    ///
    /// The row is written only if its stored version still equals
    /// `expected_version`; a concurrent writer having moved it surfaces
    /// as `VersionConflict`.
    pub fn update(
        &self,
        delegation: &PaymentDelegation,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let types_json = serde_json::to_string(&delegation.delegated_types)?;
        let client_sig = signature_json(&delegation.signed_by_client)?;
        let accountant_sig = signature_json(&delegation.signed_by_accountant)?;

        let rows = self.conn.execute(
            "UPDATE delegations SET
                client_id = ?2, delegated_types = ?3, start_date = ?4,
                end_date = ?5, max_per_payment = ?6, max_per_month = ?7,
                payment_method = ?8, require_validation = ?9,
                validation_delay_hours = ?10, state = ?11,
                signed_by_client = ?12, signed_by_accountant = ?13,
                terms_hash = ?14, version = ?15, notes = ?16,
                updated_at = ?17
             WHERE id = ?1 AND version = ?18",
            params![
                delegation.id,
                delegation.client_id,
                types_json,
                delegation.start_date.format("%Y-%m-%d").to_string(),
                delegation
                    .end_date
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                Decimal::from(delegation.max_amount_per_payment).to_string(),
                Decimal::from(delegation.max_amount_per_month).to_string(),
                delegation.payment_method.map(|m| m.to_string()),
                delegation.require_client_validation,
                delegation.validation_delay_hours,
                delegation.state.to_string(),
                client_sig,
                accountant_sig,
                delegation.terms_hash,
                delegation.version as i64,
                delegation.notes,
                delegation.updated_at.to_rfc3339(),
                expected_version as i64,
            ],
        )?;

        if rows == 0 {
            // Either the row is gone or someone else wrote first
            return match self.exists(&delegation.id)? {
                true => Err(StoreError::VersionConflict(delegation.id.clone())),
                false => Err(StoreError::NotFound(delegation.id.clone())),
            };
        }

        Ok(())
    }

    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM delegations WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get a delegation by id
    pub fn get(&self, id: &str) -> Result<PaymentDelegation, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, delegated_types, start_date, end_date,
                    max_per_payment, max_per_month, payment_method,
                    require_validation, validation_delay_hours, state,
                    signed_by_client, signed_by_accountant, terms_hash,
                    version, notes, created_at, updated_at
             FROM delegations WHERE id = ?1",
        )?;

        let raw = stmt
            .query_row(params![id], read_raw_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id.to_string()),
                other => StoreError::Database(other),
            })?;

        parse_row(raw)
    }

    /// All delegations in one state, newest first
    pub fn list_by_state(
        &self,
        state: DelegationState,
    ) -> Result<Vec<PaymentDelegation>, StoreError> {
        self.list_where(
            "WHERE state = ?1",
            params![state.to_string()],
        )
    }

    /// All delegations of one client, newest first
    pub fn list_by_client(&self, client_id: &str) -> Result<Vec<PaymentDelegation>, StoreError> {
        self.list_where("WHERE client_id = ?1", params![client_id])
    }

    /// Every delegation, newest first
    pub fn list_all(&self) -> Result<Vec<PaymentDelegation>, StoreError> {
        self.list_where("", [])
    }

    fn list_where(
        &self,
        where_clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<PaymentDelegation>, StoreError> {
        let sql = format!(
            "SELECT id, client_id, delegated_types, start_date, end_date,
                    max_per_payment, max_per_month, payment_method,
                    require_validation, validation_delay_hours, state,
                    signed_by_client, signed_by_accountant, terms_hash,
                    version, notes, created_at, updated_at
             FROM delegations {} ORDER BY created_at DESC, id",
            where_clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let raws: Vec<RawRow> = stmt
            .query_map(params, read_raw_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(parse_row).collect()
    }
}

fn signature_json(signature: &Option<SignatureRecord>) -> Result<Option<String>, StoreError> {
    signature
        .as_ref()
        .map(|s| serde_json::to_string(s))
        .transpose()
        .map_err(StoreError::Serialization)
}

type RawRow = (
    String,         // id
    String,         // client_id
    String,         // delegated_types
    String,         // start_date
    Option<String>, // end_date
    String,         // max_per_payment
    String,         // max_per_month
    Option<String>, // payment_method
    bool,           // require_validation
    i64,            // validation_delay_hours
    String,         // state
    Option<String>, // signed_by_client
    Option<String>, // signed_by_accountant
    Option<String>, // terms_hash
    i64,            // version
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
        row.get(15)?,
        row.get(16)?,
        row.get(17)?,
    ))
}

fn parse_row(raw: RawRow) -> Result<PaymentDelegation, StoreError> {
    let id = raw.0;

    let delegated_types: Vec<String> = serde_json::from_str(&raw.2)?;
    let start_date = parse_date(&raw.3, &id, "start_date")?;
    let end_date = raw
        .4
        .map(|s| parse_date(&s, &id, "end_date"))
        .transpose()?;
    let max_amount_per_payment = parse_limit(&raw.5, &id, "max_per_payment")?;
    let max_amount_per_month = parse_limit(&raw.6, &id, "max_per_month")?;
    let payment_method = raw
        .7
        .map(|s| {
            s.parse().map_err(|_| StoreError::Corrupted {
                id: id.clone(),
                field: "payment_method",
            })
        })
        .transpose()?;
    let state: DelegationState = raw.10.parse().map_err(|_| StoreError::Corrupted {
        id: id.clone(),
        field: "state",
    })?;
    let signed_by_client = raw
        .11
        .map(|s| serde_json::from_str(&s))
        .transpose()?;
    let signed_by_accountant = raw
        .12
        .map(|s| serde_json::from_str(&s))
        .transpose()?;
    let created_at = parse_timestamp(&raw.16, &id, "created_at")?;
    let updated_at = parse_timestamp(&raw.17, &id, "updated_at")?;

    Ok(PaymentDelegation {
        id,
        client_id: raw.1,
        delegated_types,
        start_date,
        end_date,
        max_amount_per_payment,
        max_amount_per_month,
        payment_method,
        require_client_validation: raw.8,
        validation_delay_hours: raw.9,
        state,
        signed_by_client,
        signed_by_accountant,
        terms_hash: raw.13,
        version: raw.14.max(0) as u64,
        notes: raw.15,
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

fn parse_limit(s: &str, id: &str, field: &'static str) -> Result<SpendingLimit, StoreError> {
    let value: Decimal = s.parse().map_err(|_| StoreError::Corrupted {
        id: id.to_string(),
        field,
    })?;
    SpendingLimit::try_from(value).map_err(|_| StoreError::Corrupted {
        id: id.to_string(),
        field,
    })
}
