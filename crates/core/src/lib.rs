//! Fisca Core - Domain types
//!
//! This crate contains the fundamental types used across Fisca:
//! - `Amount`: Non-negative decimal wrapper for financial amounts
//! - `ObligationType` / `TypeCatalog`: Reference data for fiscal obligation types
//! - `Periodicity`, `PaymentMethod`, `PaidBy`: Shared coded enums
//! - `prefixed_id`: Entity id generation (`OBL-…`, `DLG-…`)

pub mod amount;
pub mod catalog;
pub mod id;
pub mod payment;

pub use amount::{Amount, AmountError};
pub use catalog::{CatalogError, ObligationType, Periodicity, TypeCatalog};
pub use id::prefixed_id;
pub use payment::{PaidBy, PaymentMethod};
