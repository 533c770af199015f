//! Audit metadata shared by every auditable record.
//!
//! # Responsibility
//! - Hold who/when metadata for creation, last modification and deletion.
//! - Expose the `Auditable` capability that save interception keys on.
//!
//! # Invariants
//! - Fields are written only by the save interceptor (crate-private setters).
//! - Deletion is logical: `is_deleted` flips to `true` and stays there.
//! - Values are never cleared once stamped.

use crate::context::entity::{bool_to_int, int_to_bool, optional_uuid_to_db, parse_optional_uuid};
use crate::db::DbResult;
use crate::identity::UserId;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::Serialize;

/// Column names backing [`AuditFields`], in storage order.
pub const AUDIT_COLUMNS: &[&str] = &[
    "created_by",
    "creation_date",
    "last_modified_by",
    "last_modification_date",
    "is_deleted",
    "deleted_by",
    "deletion_date",
];

/// Embedded audit block. Compose it into a record and implement
/// [`Auditable`] to opt the record into audit stamping.
///
/// Serialize-only: records skip this block when deserializing, so inbound
/// payloads always start unstamped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditFields {
    pub(crate) created_by: Option<UserId>,
    /// Unix epoch milliseconds; `0` until the first save stamps it.
    pub(crate) creation_date: i64,
    pub(crate) last_modified_by: Option<UserId>,
    pub(crate) last_modification_date: Option<i64>,
    pub(crate) is_deleted: bool,
    pub(crate) deleted_by: Option<UserId>,
    pub(crate) deletion_date: Option<i64>,
}

impl AuditFields {
    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn creation_date(&self) -> i64 {
        self.creation_date
    }

    pub fn last_modified_by(&self) -> Option<UserId> {
        self.last_modified_by
    }

    pub fn last_modification_date(&self) -> Option<i64> {
        self.last_modification_date
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn deleted_by(&self) -> Option<UserId> {
        self.deleted_by
    }

    pub fn deletion_date(&self) -> Option<i64> {
        self.deletion_date
    }

    pub(crate) fn stamp_created(&mut self, by: Option<UserId>, at_ms: i64) {
        self.created_by = by;
        self.creation_date = at_ms;
    }

    pub(crate) fn stamp_modified(&mut self, by: Option<UserId>, at_ms: i64) {
        self.last_modified_by = by;
        self.last_modification_date = Some(at_ms);
    }

    pub(crate) fn stamp_deleted(&mut self, by: Option<UserId>, at_ms: i64) {
        self.is_deleted = true;
        self.deleted_by = by;
        self.deletion_date = Some(at_ms);
    }

    /// Encodes the block in [`AUDIT_COLUMNS`] order.
    pub(crate) fn to_values(&self) -> Vec<Value> {
        vec![
            optional_uuid_to_db(self.created_by),
            Value::Integer(self.creation_date),
            optional_uuid_to_db(self.last_modified_by),
            self.last_modification_date.map_or(Value::Null, Value::Integer),
            Value::Integer(bool_to_int(self.is_deleted)),
            optional_uuid_to_db(self.deleted_by),
            self.deletion_date.map_or(Value::Null, Value::Integer),
        ]
    }

    pub(crate) fn from_row(table: &str, row: &Row<'_>) -> DbResult<Self> {
        Ok(Self {
            created_by: parse_optional_uuid(table, "created_by", row)?,
            creation_date: row.get("creation_date")?,
            last_modified_by: parse_optional_uuid(table, "last_modified_by", row)?,
            last_modification_date: row.get("last_modification_date")?,
            is_deleted: int_to_bool(table, "is_deleted", row.get("is_deleted")?)?,
            deleted_by: parse_optional_uuid(table, "deleted_by", row)?,
            deletion_date: row.get("deletion_date")?,
        })
    }
}

/// Capability of a persisted record that carries [`AuditFields`].
pub trait Auditable {
    fn audit(&self) -> &AuditFields;
    fn audit_mut(&mut self) -> &mut AuditFields;

    /// Returns whether the record has not been soft-deleted.
    fn is_active(&self) -> bool {
        !self.audit().is_deleted
    }
}
