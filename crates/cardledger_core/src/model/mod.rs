//! Domain records persisted by CardLedger.
//!
//! # Responsibility
//! - Define the records stored through the application context.
//! - Compose audit metadata into records instead of inheriting it.
//!
//! # Invariants
//! - Every record is identified by a non-nil UUID.
//! - Deletion is represented by soft-delete flags, not hard delete.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod audit;
pub mod customer;
pub mod user;

/// Rejected record shape, raised before anything reaches storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityValidationError {
    NilId,
    EmptyField(&'static str),
    InvalidEmail(String),
    NegativeCreditLimit(i64),
}

impl Display for EntityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "id must not be nil"),
            Self::EmptyField(field) => write!(f, "{field} must not be empty"),
            Self::InvalidEmail(value) => write!(f, "invalid email address `{value}`"),
            Self::NegativeCreditLimit(value) => {
                write!(f, "credit limit must not be negative, got {value}")
            }
        }
    }
}

impl Error for EntityValidationError {}

pub(crate) fn require_non_empty(
    field: &'static str,
    value: &str,
) -> Result<(), EntityValidationError> {
    if value.trim().is_empty() {
        return Err(EntityValidationError::EmptyField(field));
    }
    Ok(())
}

pub(crate) fn require_email(value: &str) -> Result<(), EntityValidationError> {
    let trimmed = value.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(EntityValidationError::InvalidEmail(trimmed.to_string())),
    }
}
