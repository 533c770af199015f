//! Change tracking for the current unit of work.
//!
//! # Responsibility
//! - Hold every entity the caller added, updated, removed or attached.
//! - Expose entries to save interceptors, including state rewrites.
//! - Turn the final entry states into a write plan.
//!
//! # Invariants
//! - At most one entry exists per `(table, id)` pair.
//! - `requested_state` remembers what the caller asked for, so a delete that
//!   an interceptor rewrote to `Modified` is planned as a soft delete.
//! - After a successful commit every surviving entry is `Unchanged`.
//! - After a failed commit every planned entry is back in its requested state.
//! - Re-tracking a row keeps the audit block already held by the tracker.

use super::entity::{write_entity, Entity, EntityId, WriteOp};
use crate::db::DbResult;
use crate::model::audit::Auditable;
use rusqlite::Connection;
use std::any::Any;
use std::fmt::{Debug, Formatter};

/// Pending disposition of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

/// Type-erased view of a tracked entity. Implemented for every [`Entity`].
pub trait TrackedEntity: Any + Send {
    fn table(&self) -> &'static str;
    fn entity_id(&self) -> EntityId;
    fn auditable(&self) -> Option<&dyn Auditable>;
    fn auditable_mut(&mut self) -> Option<&mut dyn Auditable>;
    fn write(&self, conn: &Connection, op: WriteOp) -> DbResult<usize>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Entity> TrackedEntity for T {
    fn table(&self) -> &'static str {
        T::TABLE
    }

    fn entity_id(&self) -> EntityId {
        self.id()
    }

    fn auditable(&self) -> Option<&dyn Auditable> {
        self.as_auditable()
    }

    fn auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        self.as_auditable_mut()
    }

    fn write(&self, conn: &Connection, op: WriteOp) -> DbResult<usize> {
        write_entity(conn, self, op)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One tracked entity plus its pending state.
pub struct EntityEntry {
    entity: Box<dyn TrackedEntity>,
    state: EntityState,
    requested_state: EntityState,
}

impl EntityEntry {
    pub fn state(&self) -> EntityState {
        self.state
    }

    /// State the caller asked for, before any interceptor rewrite.
    pub fn requested_state(&self) -> EntityState {
        self.requested_state
    }

    /// Rewrites the pending state without touching the requested state.
    pub fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    pub fn table(&self) -> &'static str {
        self.entity.table()
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity.entity_id()
    }

    pub fn auditable(&self) -> Option<&dyn Auditable> {
        self.entity.auditable()
    }

    pub fn auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        self.entity.auditable_mut()
    }

    pub fn entity<T: Entity>(&self) -> Option<&T> {
        self.entity.as_any().downcast_ref::<T>()
    }

    pub fn entity_mut<T: Entity>(&mut self) -> Option<&mut T> {
        self.entity.as_any_mut().downcast_mut::<T>()
    }

    fn planned_op(&self) -> Option<WriteOp> {
        match self.state {
            EntityState::Added => Some(WriteOp::Insert),
            EntityState::Modified if self.requested_state == EntityState::Deleted => {
                Some(WriteOp::SoftDelete)
            }
            EntityState::Modified => Some(WriteOp::Update),
            EntityState::Deleted => Some(WriteOp::Delete),
            EntityState::Unchanged => None,
        }
    }
}

impl Debug for EntityEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityEntry")
            .field("table", &self.table())
            .field("id", &self.entity_id())
            .field("state", &self.state)
            .field("requested_state", &self.requested_state)
            .finish()
    }
}

/// Write decided for the entry at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedWrite {
    pub index: usize,
    pub op: WriteOp,
}

/// Set of entities participating in the next save.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    entries: Vec<EntityEntry>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `entity` in `state`, merging with an existing entry
    /// for the same row.
    ///
    /// # Contract
    /// - `Added` followed by `Deleted` drops the entry: the row never existed.
    /// - `Added` followed by `Modified` or `Unchanged` stays `Added`.
    /// - Any other combination takes the newer state.
    /// - The incoming copy's audit block is replaced by the tracked one.
    pub fn track<T: Entity>(&mut self, mut entity: T, state: EntityState) {
        let id = entity.id();
        let existing = self
            .entries
            .iter()
            .position(|entry| entry.table() == T::TABLE && entry.entity_id() == id);

        let Some(index) = existing else {
            self.entries.push(EntityEntry {
                entity: Box::new(entity),
                state,
                requested_state: state,
            });
            return;
        };

        let merged = match (self.entries[index].state, state) {
            (EntityState::Added, EntityState::Deleted) => {
                self.entries.remove(index);
                return;
            }
            (EntityState::Added, _) => EntityState::Added,
            (_, newer) => newer,
        };

        let entry = &mut self.entries[index];
        if let (Some(tracked), Some(incoming)) = (entry.auditable(), entity.as_auditable_mut()) {
            *incoming.audit_mut() = tracked.audit().clone();
        }
        entry.entity = Box::new(entity);
        entry.state = merged;
        entry.requested_state = merged;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether any entry would produce a write.
    pub fn has_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.state != EntityState::Unchanged)
    }

    pub fn entries(&self) -> impl Iterator<Item = &EntityEntry> {
        self.entries.iter()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut EntityEntry> {
        self.entries.iter_mut()
    }

    /// Entries whose entity carries the audit capability.
    pub fn auditable_entries_mut(&mut self) -> impl Iterator<Item = &mut EntityEntry> {
        self.entries
            .iter_mut()
            .filter(|entry| entry.auditable().is_some())
    }

    /// Tracked entities of type `T` with their current state.
    pub fn entries_of<T: Entity>(&self) -> impl Iterator<Item = (&T, EntityState)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.entity::<T>().map(|entity| (entity, entry.state)))
    }

    /// Returns the tracked entity of type `T` with `id`, if any.
    pub fn find<T: Entity>(&self, id: EntityId) -> Option<(&T, EntityState)> {
        self.entries_of::<T>().find(|(entity, _)| entity.id() == id)
    }

    /// Stops tracking everything without writing.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Decides the storage operation for every entry that needs one.
    pub fn plan(&self) -> Vec<PlannedWrite> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.planned_op().map(|op| PlannedWrite { index, op }))
            .collect()
    }

    pub(crate) fn write(&self, conn: &Connection, planned: PlannedWrite) -> DbResult<usize> {
        self.entries[planned.index].entity.write(conn, planned.op)
    }

    /// Marks a committed plan as persisted.
    pub(crate) fn accept_changes(&mut self, plan: &[PlannedWrite]) {
        for planned in plan {
            let entry = &mut self.entries[planned.index];
            entry.state = EntityState::Unchanged;
            entry.requested_state = EntityState::Unchanged;
        }

        let mut index = 0;
        self.entries.retain(|_| {
            let physically_deleted = plan
                .iter()
                .any(|planned| planned.index == index && planned.op == WriteOp::Delete);
            index += 1;
            !physically_deleted
        });
    }

    /// Restores the requested state of a plan that was rolled back, so the
    /// next save classifies those entries afresh.
    pub(crate) fn reject_changes(&mut self, plan: &[PlannedWrite]) {
        for planned in plan {
            let entry = &mut self.entries[planned.index];
            entry.state = entry.requested_state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeTracker, EntityState, PlannedWrite};
    use crate::context::entity::WriteOp;
    use crate::model::audit::Auditable;
    use crate::model::customer::Customer;
    use uuid::Uuid;

    fn customer(name: &str) -> Customer {
        Customer::new(name, "someone@example.com").unwrap()
    }

    #[test]
    fn added_then_removed_entity_is_detached() {
        let mut tracker = ChangeTracker::new();
        let ada = customer("Ada");
        tracker.track(ada.clone(), EntityState::Added);
        tracker.track(ada, EntityState::Deleted);

        assert!(tracker.is_empty());
    }

    #[test]
    fn added_then_updated_entity_stays_added_with_latest_values() {
        let mut tracker = ChangeTracker::new();
        let mut ada = customer("Ada");
        tracker.track(ada.clone(), EntityState::Added);
        ada.credit_limit_cents = 50_000;
        tracker.track(ada.clone(), EntityState::Modified);

        assert_eq!(tracker.len(), 1);
        let (tracked, state) = tracker.find::<Customer>(ada.id).unwrap();
        assert_eq!(state, EntityState::Added);
        assert_eq!(tracked.credit_limit_cents, 50_000);
    }

    #[test]
    fn rewritten_delete_is_planned_as_soft_delete() {
        let mut tracker = ChangeTracker::new();
        tracker.track(customer("Ada"), EntityState::Deleted);
        tracker.track(customer("Grace"), EntityState::Deleted);
        tracker.track(customer("Linus"), EntityState::Unchanged);

        tracker
            .entries_mut()
            .next()
            .unwrap()
            .set_state(EntityState::Modified);

        assert_eq!(
            tracker.plan(),
            vec![
                PlannedWrite {
                    index: 0,
                    op: WriteOp::SoftDelete
                },
                PlannedWrite {
                    index: 1,
                    op: WriteOp::Delete
                },
            ]
        );
    }

    #[test]
    fn accept_changes_detaches_physical_deletes_only() {
        let mut tracker = ChangeTracker::new();
        let kept = customer("Kept");
        tracker.track(kept.clone(), EntityState::Added);
        tracker.track(customer("Gone"), EntityState::Deleted);

        let plan = tracker.plan();
        tracker.accept_changes(&plan);

        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.find::<Customer>(kept.id).map(|(_, state)| state),
            Some(EntityState::Unchanged)
        );
        assert!(!tracker.has_changes());
    }

    #[test]
    fn retracking_a_copy_keeps_the_stamped_audit_block() {
        let mut tracker = ChangeTracker::new();
        let creator = Uuid::new_v4();
        let ada = customer("Ada");
        let id = ada.id;
        tracker.track(ada.clone(), EntityState::Added);
        tracker
            .entries_mut()
            .next()
            .unwrap()
            .auditable_mut()
            .unwrap()
            .audit_mut()
            .stamp_created(Some(creator), 1_000);
        let plan = tracker.plan();
        tracker.accept_changes(&plan);

        let mut copy = ada;
        copy.credit_limit_cents = 9_000;
        tracker.track(copy, EntityState::Modified);

        let (tracked, state) = tracker.find::<Customer>(id).unwrap();
        assert_eq!(state, EntityState::Modified);
        assert_eq!(tracked.credit_limit_cents, 9_000);
        assert_eq!(tracked.audit().created_by(), Some(creator));
        assert_eq!(tracked.audit().creation_date(), 1_000);
    }

    #[test]
    fn reject_changes_restores_requested_state() {
        let mut tracker = ChangeTracker::new();
        tracker.track(customer("Ada"), EntityState::Deleted);
        tracker.track(customer("Grace"), EntityState::Modified);
        tracker
            .entries_mut()
            .next()
            .unwrap()
            .set_state(EntityState::Modified);

        let plan = tracker.plan();
        tracker.reject_changes(&plan);

        let states: Vec<_> = tracker.entries().map(|entry| entry.state()).collect();
        assert_eq!(states, vec![EntityState::Deleted, EntityState::Modified]);
    }
}
