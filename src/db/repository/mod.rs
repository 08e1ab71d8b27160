//! Repository layer: entity-scoped database operations.
//!
//! Discussions and messages are owned by the CRUD collaborators; the
//! functions here exist for the report store, startup recovery and tests.
//! Report columns live in `report` and are only written through the
//! guarded checkpoint functions.

mod discussion;
mod message;
mod report;

pub use discussion::*;
pub use message::*;
pub use report::*;

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::DatabaseError;

pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_datetime(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).unwrap_or_default()
}

pub(crate) fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}
