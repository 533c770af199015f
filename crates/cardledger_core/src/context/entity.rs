//! Entity-to-table mapping and the SQL the context issues for it.
//!
//! # Invariants
//! - Every table has a `TEXT` primary key column named `id` holding a UUID.
//! - Auditable tables append [`AUDIT_COLUMNS`] after the data columns.
//! - Updates and deletes that match no row surface `DbError::NotFound`.
//! - An UPDATE never rewrites creation metadata and never clears a stored
//!   deletion stamp.

use crate::db::{DbError, DbResult};
use crate::model::audit::{AuditFields, Auditable, AUDIT_COLUMNS};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use uuid::Uuid;

/// Primary key type shared by all entities.
pub type EntityId = Uuid;

/// Mapping between a record type and its table.
///
/// Implementors opt into audit stamping by setting `AUDITABLE = true` and
/// returning `Some` from both `as_auditable*` accessors.
pub trait Entity: Sized + Send + 'static {
    const TABLE: &'static str;
    /// Data columns in `values()` order, excluding `id` and audit columns.
    const COLUMNS: &'static [&'static str];
    const AUDITABLE: bool = false;

    fn id(&self) -> EntityId;
    fn values(&self) -> Vec<Value>;
    fn from_row(row: &Row<'_>) -> DbResult<Self>;

    fn as_auditable(&self) -> Option<&dyn Auditable> {
        None
    }

    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        None
    }
}

/// Storage operation decided for one tracked entity before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Update,
    /// Logical delete of an auditable record, issued as an UPDATE.
    SoftDelete,
    /// Physical delete, only for records without the audit capability.
    Delete,
}

pub(crate) fn column_list<T: Entity>() -> Vec<&'static str> {
    let mut columns = Vec::with_capacity(1 + T::COLUMNS.len() + AUDIT_COLUMNS.len());
    columns.push("id");
    columns.extend_from_slice(T::COLUMNS);
    if T::AUDITABLE {
        columns.extend_from_slice(AUDIT_COLUMNS);
    }
    columns
}

pub(crate) fn select_sql<T: Entity>() -> String {
    format!("SELECT {} FROM {}", column_list::<T>().join(", "), T::TABLE)
}

fn insert_sql<T: Entity>() -> String {
    let columns = column_list::<T>();
    let placeholders = (1..=columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders});",
        T::TABLE,
        columns.join(", ")
    )
}

/// Audit columns written by INSERT only.
const INSERT_ONLY_COLUMNS: &[&str] = &["created_by", "creation_date"];

fn is_updatable<T: Entity>(column: &str) -> bool {
    !(T::AUDITABLE && INSERT_ONLY_COLUMNS.contains(&column))
}

fn update_assignment<T: Entity>(column: &str, placeholder: usize) -> String {
    if !T::AUDITABLE {
        return format!("{column} = ?{placeholder}");
    }
    // SET expressions read the pre-update row, so `is_deleted` below is the
    // stored flag.
    match column {
        "is_deleted" => format!("{column} = MAX({column}, ?{placeholder})"),
        "deleted_by" | "deletion_date" => format!(
            "{column} = CASE WHEN is_deleted = 1 THEN {column} ELSE ?{placeholder} END"
        ),
        _ => format!("{column} = ?{placeholder}"),
    }
}

fn update_sql<T: Entity>() -> String {
    // `id` is bound as ?1, the updatable columns follow in order.
    let assignments = column_list::<T>()
        .into_iter()
        .skip(1)
        .filter(|column| is_updatable::<T>(column))
        .enumerate()
        .map(|(index, column)| update_assignment::<T>(column, index + 2))
        .collect::<Vec<_>>()
        .join(", ");
    format!("UPDATE {} SET {assignments} WHERE id = ?1;", T::TABLE)
}

fn row_values<T: Entity>(entity: &T) -> Vec<Value> {
    debug_assert_eq!(
        T::AUDITABLE,
        entity.as_auditable().is_some(),
        "{}: AUDITABLE must match as_auditable()",
        T::TABLE
    );

    let mut values = Vec::with_capacity(1 + T::COLUMNS.len() + AUDIT_COLUMNS.len());
    values.push(Value::Text(entity.id().to_string()));
    values.extend(entity.values());
    if T::AUDITABLE {
        let audit = entity
            .as_auditable()
            .map_or_else(|| AuditFields::default().to_values(), |record| {
                record.audit().to_values()
            });
        values.extend(audit);
    }
    values
}

fn update_values<T: Entity>(entity: &T) -> Vec<Value> {
    column_list::<T>()
        .into_iter()
        .zip(row_values(entity))
        .filter(|(column, _)| is_updatable::<T>(column))
        .map(|(_, value)| value)
        .collect()
}

/// Issues the statement for `op` and returns the number of affected rows.
pub(crate) fn write_entity<T: Entity>(
    conn: &Connection,
    entity: &T,
    op: WriteOp,
) -> DbResult<usize> {
    let changed = match op {
        WriteOp::Insert => conn.execute(&insert_sql::<T>(), params_from_iter(row_values(entity)))?,
        WriteOp::Update | WriteOp::SoftDelete => {
            conn.execute(&update_sql::<T>(), params_from_iter(update_values(entity)))?
        }
        WriteOp::Delete => conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1;", T::TABLE),
            [entity.id().to_string()],
        )?,
    };

    if changed == 0 {
        return Err(DbError::NotFound {
            table: T::TABLE,
            id: entity.id(),
        });
    }
    Ok(changed)
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn int_to_bool(table: &str, column: &str, value: i64) -> DbResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DbError::InvalidData(format!(
            "invalid boolean `{other}` in {table}.{column}"
        ))),
    }
}

pub(crate) fn optional_uuid_to_db(value: Option<Uuid>) -> Value {
    value.map_or(Value::Null, |id| Value::Text(id.to_string()))
}

pub(crate) fn parse_uuid(table: &str, column: &str, row: &Row<'_>) -> DbResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|_| {
        DbError::InvalidData(format!("invalid uuid `{text}` in {table}.{column}"))
    })
}

pub(crate) fn parse_optional_uuid(
    table: &str,
    column: &str,
    row: &Row<'_>,
) -> DbResult<Option<Uuid>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => Uuid::parse_str(&text).map(Some).map_err(|_| {
            DbError::InvalidData(format!("invalid uuid `{text}` in {table}.{column}"))
        }),
        None => Ok(None),
    }
}
