//! Typed entry point to one table of the context.

use super::entity::{select_sql, Entity, EntityId};
use super::tracker::{ChangeTracker, EntityState};
use crate::db::DbResult;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::marker::PhantomData;

/// Filter and pagination options for [`EntitySet::list`].
#[derive(Debug, Clone, Default)]
pub struct EntityListQuery {
    /// Also return soft-deleted rows. Ignored for non-auditable tables.
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Queryable, mutable collection of `T` records.
///
/// Mutations are only recorded in the change tracker; nothing reaches
/// storage until the owning context saves.
pub struct EntitySet<'ctx, T: Entity> {
    conn: &'ctx Connection,
    tracker: &'ctx mut ChangeTracker,
    _marker: PhantomData<fn() -> T>,
}

impl<'ctx, T: Entity> EntitySet<'ctx, T> {
    pub(crate) fn new(conn: &'ctx Connection, tracker: &'ctx mut ChangeTracker) -> Self {
        Self {
            conn,
            tracker,
            _marker: PhantomData,
        }
    }

    /// Schedules `entity` for insertion.
    pub fn add(&mut self, entity: T) -> EntityId {
        let id = entity.id();
        self.tracker.track(entity, EntityState::Added);
        id
    }

    /// Schedules `entity` for update.
    pub fn update(&mut self, entity: T) {
        self.tracker.track(entity, EntityState::Modified);
    }

    /// Schedules `entity` for deletion.
    pub fn remove(&mut self, entity: T) {
        self.tracker.track(entity, EntityState::Deleted);
    }

    /// Tracks `entity` as already persisted and unchanged.
    pub fn attach(&mut self, entity: T) {
        self.tracker.track(entity, EntityState::Unchanged);
    }

    /// Tracked `T` entities with their pending state.
    pub fn local(&self) -> impl Iterator<Item = (&T, EntityState)> {
        self.tracker.entries_of::<T>()
    }

    /// Loads one stored record, hiding soft-deleted rows.
    pub fn find(&self, id: EntityId) -> DbResult<Option<T>> {
        self.find_row(id, false)
    }

    pub fn find_including_deleted(&self, id: EntityId) -> DbResult<Option<T>> {
        self.find_row(id, true)
    }

    /// Lists stored records ordered by creation time, then id.
    pub fn list(&self, query: &EntityListQuery) -> DbResult<Vec<T>> {
        let mut sql = format!("{} WHERE 1 = 1", select_sql::<T>());
        let mut bind_values: Vec<Value> = Vec::new();

        if T::AUDITABLE && !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }

        if T::AUDITABLE {
            sql.push_str(" ORDER BY creation_date ASC, id ASC");
        } else {
            sql.push_str(" ORDER BY id ASC");
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(T::from_row(row)?);
        }
        Ok(records)
    }

    /// Number of stored rows, hiding soft-deleted ones.
    pub fn count(&self) -> DbResult<u64> {
        let filter = if T::AUDITABLE { " WHERE is_deleted = 0" } else { "" };
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}{filter};", T::TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn find_row(&self, id: EntityId, include_deleted: bool) -> DbResult<Option<T>> {
        let mut sql = format!("{} WHERE id = ?1", select_sql::<T>());
        if T::AUDITABLE && !include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(T::from_row(row)?)),
            None => Ok(None),
        }
    }
}
