//! Customer record.
//!
//! # Invariants
//! - `full_name` is never blank and `email` has a `local@domain.tld` shape.
//! - `credit_limit_cents` is a non-negative amount in minor currency units.

use super::audit::{AuditFields, Auditable};
use super::{require_email, require_non_empty, EntityValidationError};
use crate::context::entity::{parse_uuid, Entity, EntityId};
use crate::db::{DbError, DbResult};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: EntityId,
    pub full_name: String,
    pub email: String,
    pub credit_limit_cents: i64,
    #[serde(default, skip_deserializing)]
    audit: AuditFields,
}

impl Customer {
    /// Creates a validated customer with a generated ID and no credit line.
    pub fn new(
        full_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, EntityValidationError> {
        Self::with_id(Uuid::new_v4(), full_name, email)
    }

    /// Creates a validated customer with a caller-provided ID.
    pub fn with_id(
        id: EntityId,
        full_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, EntityValidationError> {
        let customer = Self {
            id,
            full_name: full_name.into(),
            email: email.into(),
            credit_limit_cents: 0,
            audit: AuditFields::default(),
        };
        customer.validate()?;
        Ok(customer)
    }

    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if self.id.is_nil() {
            return Err(EntityValidationError::NilId);
        }
        require_non_empty("full_name", &self.full_name)?;
        require_email(&self.email)?;
        if self.credit_limit_cents < 0 {
            return Err(EntityValidationError::NegativeCreditLimit(
                self.credit_limit_cents,
            ));
        }
        Ok(())
    }
}

impl Auditable for Customer {
    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

impl Entity for Customer {
    const TABLE: &'static str = "customers";
    const COLUMNS: &'static [&'static str] = &["full_name", "email", "credit_limit_cents"];
    const AUDITABLE: bool = true;

    fn id(&self) -> EntityId {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.full_name.clone()),
            Value::Text(self.email.clone()),
            Value::Integer(self.credit_limit_cents),
        ]
    }

    fn from_row(row: &Row<'_>) -> DbResult<Self> {
        let customer = Self {
            id: parse_uuid(Self::TABLE, "id", row)?,
            full_name: row.get("full_name")?,
            email: row.get("email")?,
            credit_limit_cents: row.get("credit_limit_cents")?,
            audit: AuditFields::from_row(Self::TABLE, row)?,
        };
        customer
            .validate()
            .map_err(|err| DbError::InvalidData(format!("customers.{}: {err}", customer.id)))?;
        Ok(customer)
    }

    fn as_auditable(&self) -> Option<&dyn Auditable> {
        Some(self)
    }

    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        Some(self)
    }
}
