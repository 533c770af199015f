//! Audit stamping for auditable records.
//!
//! # Responsibility
//! - Stamp creation, modification and deletion metadata on every save.
//! - Turn deletes of auditable records into soft deletes.
//!
//! # Invariants
//! - Only entries with the `Auditable` capability are read or written.
//! - `Added` entries get `creation_date == last_modification_date`.
//! - A `Deleted` entry leaves as `Modified` with `is_deleted = true`.
//! - `Unchanged` entries are untouched.
//! - Stamping never fails and never aborts the save.

use super::{SaveChangesInterceptor, SaveContext};
use crate::clock::{Clock, SystemClock};
use crate::context::tracker::{EntityEntry, EntityState};
use crate::identity::UserId;
use log::debug;

/// Save interceptor applying the audit policy to tracked entries.
#[derive(Debug, Default)]
pub struct AuditableEntitySaveInterceptor<C: Clock = SystemClock> {
    clock: C,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct StampCounts {
    added: usize,
    modified: usize,
    soft_deleted: usize,
}

impl<C: Clock> AuditableEntitySaveInterceptor<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Applies the audit policy to every auditable entry of `context`.
    pub fn update_auditable_data(&self, context: Option<&mut SaveContext<'_>>) {
        let Some(context) = context else {
            return;
        };

        let identity = context.identity();
        let mut counts = StampCounts::default();
        for entry in context.tracker_mut().auditable_entries_mut() {
            self.update_entry(entry, identity, &mut counts);
        }

        if counts != StampCounts::default() {
            debug!(
                "event=audit_stamp module=audit status=ok added={} modified={} soft_deleted={} authenticated={}",
                counts.added,
                counts.modified,
                counts.soft_deleted,
                identity.is_some()
            );
        }
    }

    fn update_entry(&self, entry: &mut EntityEntry, by: Option<UserId>, counts: &mut StampCounts) {
        let state = entry.state();
        if state == EntityState::Unchanged {
            return;
        }

        let now = self.clock.now_ms();
        let Some(record) = entry.auditable_mut() else {
            return;
        };
        let audit = record.audit_mut();

        match state {
            EntityState::Added => {
                audit.stamp_created(by, now);
                audit.stamp_modified(by, now);
                counts.added += 1;
            }
            EntityState::Modified => {
                audit.stamp_modified(by, now);
                counts.modified += 1;
            }
            EntityState::Deleted => {
                audit.stamp_deleted(by, now);
                entry.set_state(EntityState::Modified);
                counts.soft_deleted += 1;
            }
            EntityState::Unchanged => {}
        }
    }
}

impl<C: Clock> SaveChangesInterceptor for AuditableEntitySaveInterceptor<C> {
    fn saving_changes(&self, context: Option<&mut SaveContext<'_>>) {
        self.update_auditable_data(context);
    }
}

#[cfg(test)]
mod tests {
    use super::AuditableEntitySaveInterceptor;
    use crate::audit::{SaveChangesInterceptor, SaveContext};
    use crate::clock::FixedClock;
    use crate::context::entity::{Entity, EntityId};
    use crate::context::tracker::{ChangeTracker, EntityState};
    use crate::db::{DbError, DbResult};
    use crate::model::customer::Customer;
    use rusqlite::types::Value;
    use rusqlite::Row;
    use uuid::Uuid;

    /// Record without the audit capability.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Ledger {
        id: EntityId,
        note: String,
    }

    impl Entity for Ledger {
        const TABLE: &'static str = "ledgers";
        const COLUMNS: &'static [&'static str] = &["note"];

        fn id(&self) -> EntityId {
            self.id
        }

        fn values(&self) -> Vec<Value> {
            vec![Value::Text(self.note.clone())]
        }

        fn from_row(_row: &Row<'_>) -> DbResult<Self> {
            Err(DbError::InvalidData("not stored".to_string()))
        }
    }

    fn customer() -> Customer {
        Customer::new("Ada Lovelace", "ada@example.com").unwrap()
    }

    fn run(tracker: &mut ChangeTracker, identity: Option<Uuid>, now: i64) {
        let interceptor = AuditableEntitySaveInterceptor::new(FixedClock::new(now));
        let mut context = SaveContext::new(tracker, identity);
        interceptor.saving_changes(Some(&mut context));
    }

    #[test]
    fn added_entry_is_stamped_as_created_and_modified() {
        let u1 = Uuid::new_v4();
        let mut tracker = ChangeTracker::new();
        let ada = customer();
        tracker.track(ada.clone(), EntityState::Added);

        run(&mut tracker, Some(u1), 1_000);

        let (stamped, state) = tracker.find::<Customer>(ada.id).unwrap();
        let audit = crate::model::audit::Auditable::audit(stamped);
        assert_eq!(state, EntityState::Added);
        assert_eq!(audit.created_by(), Some(u1));
        assert_eq!(audit.creation_date(), 1_000);
        assert_eq!(audit.last_modified_by(), Some(u1));
        assert_eq!(audit.last_modification_date(), Some(1_000));
        assert!(!audit.is_deleted());
    }

    #[test]
    fn deleted_entry_is_rewritten_to_modified_soft_delete() {
        let u2 = Uuid::new_v4();
        let mut tracker = ChangeTracker::new();
        let ada = customer();
        tracker.track(ada.clone(), EntityState::Deleted);

        run(&mut tracker, Some(u2), 2_000);

        let entry = tracker.entries().next().unwrap();
        assert_eq!(entry.state(), EntityState::Modified);
        assert_eq!(entry.requested_state(), EntityState::Deleted);
        let audit = entry.auditable().unwrap().audit();
        assert!(audit.is_deleted());
        assert_eq!(audit.deleted_by(), Some(u2));
        assert_eq!(audit.deletion_date(), Some(2_000));
        assert_eq!(audit.last_modification_date(), None);
    }

    #[test]
    fn unchanged_entry_is_left_alone() {
        let mut tracker = ChangeTracker::new();
        let ada = customer();
        tracker.track(ada.clone(), EntityState::Unchanged);

        run(&mut tracker, Some(Uuid::new_v4()), 3_000);

        let (after, state) = tracker.find::<Customer>(ada.id).unwrap();
        assert_eq!(state, EntityState::Unchanged);
        assert_eq!(after, &ada);
    }

    #[test]
    fn non_auditable_entries_keep_their_state() {
        let mut tracker = ChangeTracker::new();
        let ledger = Ledger {
            id: Uuid::new_v4(),
            note: "opening balance".to_string(),
        };
        tracker.track(ledger.clone(), EntityState::Deleted);

        run(&mut tracker, Some(Uuid::new_v4()), 4_000);

        let (after, state) = tracker.find::<Ledger>(ledger.id).unwrap();
        assert_eq!(state, EntityState::Deleted);
        assert_eq!(after, &ledger);
    }

    #[test]
    fn missing_context_is_ignored() {
        let interceptor = AuditableEntitySaveInterceptor::new(FixedClock::new(5_000));
        interceptor.saving_changes(None);
    }

    #[tokio::test]
    async fn async_hook_applies_same_stamps() {
        let u1 = Uuid::new_v4();
        let mut tracker = ChangeTracker::new();
        let ada = customer();
        tracker.track(ada.clone(), EntityState::Modified);

        let interceptor = AuditableEntitySaveInterceptor::new(FixedClock::new(6_000));
        let cancel = tokio_util::sync::CancellationToken::new();
        let mut context = SaveContext::new(&mut tracker, Some(u1));
        interceptor
            .saving_changes_async(Some(&mut context), &cancel)
            .await;

        let entry = tracker.entries().next().unwrap();
        let audit = entry.auditable().unwrap().audit();
        assert_eq!(entry.state(), EntityState::Modified);
        assert_eq!(audit.last_modified_by(), Some(u1));
        assert_eq!(audit.last_modification_date(), Some(6_000));
        assert_eq!(audit.created_by(), None);
        assert_eq!(audit.creation_date(), 0);
    }
}
