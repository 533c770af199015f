//! Application user record.
//!
//! A user row is itself auditable: the `id` here is also what other records
//! reference in their `..._by` columns.

use super::audit::{AuditFields, Auditable};
use super::{require_email, require_non_empty, EntityValidationError};
use crate::context::entity::{parse_uuid, Entity, EntityId};
use crate::db::{DbError, DbResult};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub user_name: String,
    pub email: String,
    #[serde(default, skip_deserializing)]
    audit: AuditFields,
}

impl User {
    pub fn new(
        user_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, EntityValidationError> {
        Self::with_id(Uuid::new_v4(), user_name, email)
    }

    pub fn with_id(
        id: EntityId,
        user_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, EntityValidationError> {
        let user = Self {
            id,
            user_name: user_name.into(),
            email: email.into(),
            audit: AuditFields::default(),
        };
        user.validate()?;
        Ok(user)
    }

    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if self.id.is_nil() {
            return Err(EntityValidationError::NilId);
        }
        require_non_empty("user_name", &self.user_name)?;
        require_email(&self.email)
    }
}

impl Auditable for User {
    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &["user_name", "email"];
    const AUDITABLE: bool = true;

    fn id(&self) -> EntityId {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.user_name.clone()),
            Value::Text(self.email.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> DbResult<Self> {
        let user = Self {
            id: parse_uuid(Self::TABLE, "id", row)?,
            user_name: row.get("user_name")?,
            email: row.get("email")?,
            audit: AuditFields::from_row(Self::TABLE, row)?,
        };
        user.validate()
            .map_err(|err| DbError::InvalidData(format!("users.{}: {err}", user.id)))?;
        Ok(user)
    }

    fn as_auditable(&self) -> Option<&dyn Auditable> {
        Some(self)
    }

    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        Some(self)
    }
}
