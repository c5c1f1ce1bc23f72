//! Entity id generation
//!
//! Ids follow the `PREFIX-XXXXXXXX` format: a short uppercase slice of a
//! v4 uuid, readable in logs and stable as a storage key.

/// Generate a prefixed entity id, e.g. `prefixed_id("OBL")` -> `OBL-9F3A21C4`
pub fn prefixed_id(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        uuid::Uuid::new_v4().to_string()[..8].to_uppercase()
    )
}
