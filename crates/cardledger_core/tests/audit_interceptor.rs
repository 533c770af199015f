use cardledger_core::db::open_db_in_memory;
use cardledger_core::{
    ApplicationDbContext, Auditable, Customer, DbError, DbResult, Entity, EntityId,
    EntityListQuery, EntityState, FixedClock, SqliteDbContext, StaticIdentity, User,
};
use rusqlite::types::Value;
use rusqlite::Row;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const T1: i64 = 1_700_000_000_000;
const T2: i64 = 1_700_000_360_000;
const T3: i64 = 1_700_000_720_000;

fn audited_context(now: i64) -> (SqliteDbContext, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(now));
    let context = SqliteDbContext::audited(open_db_in_memory().unwrap(), Arc::clone(&clock));
    (context, clock)
}

fn customer(name: &str) -> Customer {
    Customer::new(name, format!("{}@example.com", name.to_lowercase())).unwrap()
}

/// Record stored without audit columns.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LedgerLine {
    id: EntityId,
    memo: String,
}

impl Entity for LedgerLine {
    const TABLE: &'static str = "ledger_lines";
    const COLUMNS: &'static [&'static str] = &["memo"];

    fn id(&self) -> EntityId {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.memo.clone())]
    }

    fn from_row(row: &Row<'_>) -> DbResult<Self> {
        let id: String = row.get("id")?;
        Ok(Self {
            id: Uuid::parse_str(&id).map_err(|err| DbError::InvalidData(err.to_string()))?,
            memo: row.get("memo")?,
        })
    }
}

#[test]
fn added_entity_is_stamped_created_and_modified_at_same_instant() {
    let (mut context, _clock) = audited_context(T1);
    let u1 = Uuid::new_v4();
    let ada = customer("Ada");
    context.customers().add(ada.clone());

    let affected = context.save_changes(Some(u1)).unwrap();
    assert_eq!(affected, 1);

    let stored = context.customers().find(ada.id).unwrap().unwrap();
    let audit = stored.audit();
    assert_eq!(audit.created_by(), Some(u1));
    assert_eq!(audit.creation_date(), T1);
    assert_eq!(audit.last_modified_by(), Some(u1));
    assert_eq!(audit.last_modification_date(), Some(T1));
    assert!(!audit.is_deleted());
}

#[test]
fn modified_entity_keeps_creation_metadata() {
    let (mut context, clock) = audited_context(T1);
    let creator = Uuid::new_v4();
    let editor = Uuid::new_v4();
    let mut ada = customer("Ada");
    context.customers().add(ada.clone());
    context.save_changes(Some(creator)).unwrap();

    clock.set(T2);
    ada = context.customers().find(ada.id).unwrap().unwrap();
    ada.credit_limit_cents = 250_000;
    context.customers().update(ada.clone());
    context.save_changes(Some(editor)).unwrap();

    let stored = context.customers().find(ada.id).unwrap().unwrap();
    assert_eq!(stored.credit_limit_cents, 250_000);
    assert_eq!(stored.audit().created_by(), Some(creator));
    assert_eq!(stored.audit().creation_date(), T1);
    assert_eq!(stored.audit().last_modified_by(), Some(editor));
    assert_eq!(stored.audit().last_modification_date(), Some(T2));
}

#[test]
fn deleted_entity_becomes_soft_delete_update() {
    let (mut context, clock) = audited_context(T1);
    let u2 = Uuid::new_v4();
    let grace = customer("Grace");
    context.customers().add(grace.clone());
    context.save_changes(None).unwrap();

    clock.set(T2);
    let loaded = context.customers().find(grace.id).unwrap().unwrap();
    context.customers().remove(loaded);
    let affected = context.save_changes(Some(u2)).unwrap();
    assert_eq!(affected, 1);

    assert!(context.customers().find(grace.id).unwrap().is_none());
    let tombstone = context
        .customers()
        .find_including_deleted(grace.id)
        .unwrap()
        .unwrap();
    let audit = tombstone.audit();
    assert!(audit.is_deleted());
    assert_eq!(audit.deleted_by(), Some(u2));
    assert_eq!(audit.deletion_date(), Some(T2));
    assert_eq!(audit.creation_date(), T1);

    let rows: i64 = context
        .database()
        .connection()
        .query_row("SELECT COUNT(*) FROM customers;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1, "soft delete must keep the physical row");
}

#[test]
fn deleted_entry_state_is_rewritten_to_modified_during_save() {
    let (mut context, _clock) = audited_context(T1);
    let linus = customer("Linus");
    context.customers().add(linus.clone());
    context.save_changes(None).unwrap();

    context.customers().remove(linus.clone());
    assert_eq!(
        context.change_tracker().find::<Customer>(linus.id).unwrap().1,
        EntityState::Deleted
    );

    context.save_changes(None).unwrap();
    assert_eq!(
        context.change_tracker().find::<Customer>(linus.id).unwrap().1,
        EntityState::Unchanged,
        "soft-deleted entries stay tracked after commit"
    );
}

#[test]
fn unchanged_entity_is_not_touched() {
    let (mut context, clock) = audited_context(T1);
    let ada = customer("Ada");
    context.customers().add(ada.clone());
    context.save_changes(None).unwrap();
    let before = context.customers().find(ada.id).unwrap().unwrap();

    clock.set(T2);
    context.customers().attach(before.clone());
    let affected = context.save_changes(Some(Uuid::new_v4())).unwrap();
    assert_eq!(affected, 0);

    let (tracked, state) = context.change_tracker().find::<Customer>(ada.id).unwrap();
    assert_eq!(state, EntityState::Unchanged);
    assert_eq!(tracked, &before);
}

#[test]
fn unauthenticated_save_leaves_identity_columns_null() {
    let (mut context, _clock) = audited_context(T1);
    let ada = customer("Ada");
    context.customers().add(ada.clone());
    context.save_changes(None).unwrap();

    let stored = context.customers().find(ada.id).unwrap().unwrap();
    assert_eq!(stored.audit().created_by(), None);
    assert_eq!(stored.audit().last_modified_by(), None);
    assert_eq!(stored.audit().creation_date(), T1);
    assert_eq!(stored.audit().last_modification_date(), Some(T1));
}

#[test]
fn repeated_update_restamps_modification_time() {
    // Stamping reflects the clock at each save; it is not idempotent.
    let (mut context, clock) = audited_context(T1);
    let ada = customer("Ada");
    context.customers().add(ada.clone());
    context.save_changes(None).unwrap();

    clock.set(T2);
    let loaded = context.customers().find(ada.id).unwrap().unwrap();
    context.customers().update(loaded.clone());
    context.save_changes(None).unwrap();
    let first = context.customers().find(ada.id).unwrap().unwrap();
    assert_eq!(first.audit().last_modification_date(), Some(T2));

    let later = clock.advance(1_000);
    context.customers().update(first);
    context.save_changes(None).unwrap();
    let second = context.customers().find(ada.id).unwrap().unwrap();
    assert_eq!(second.audit().last_modification_date(), Some(later));
    assert_eq!(second.audit().creation_date(), T1);
}

#[test]
fn caller_copy_from_add_keeps_creation_metadata_on_update_and_remove() {
    let (mut context, clock) = audited_context(T1);
    let creator = Uuid::new_v4();
    let editor = Uuid::new_v4();
    let mut ada = customer("Ada");
    context.customers().add(ada.clone());
    context.save_changes(Some(creator)).unwrap();
    assert_eq!(ada.audit().creation_date(), 0, "the caller's copy is never stamped");

    clock.set(T2);
    ada.credit_limit_cents = 75_000;
    context.customers().update(ada.clone());
    context.save_changes(Some(editor)).unwrap();

    let stored = context.customers().find(ada.id).unwrap().unwrap();
    assert_eq!(stored.credit_limit_cents, 75_000);
    assert_eq!(stored.audit().created_by(), Some(creator));
    assert_eq!(stored.audit().creation_date(), T1);
    assert_eq!(stored.audit().last_modified_by(), Some(editor));
    assert_eq!(stored.audit().last_modification_date(), Some(T2));

    clock.set(T3);
    context.customers().remove(ada.clone());
    context.save_changes(Some(editor)).unwrap();

    let tombstone = context
        .customers()
        .find_including_deleted(ada.id)
        .unwrap()
        .unwrap();
    assert_eq!(tombstone.audit().created_by(), Some(creator));
    assert_eq!(tombstone.audit().creation_date(), T1);
    assert_eq!(tombstone.audit().last_modification_date(), Some(T2));
    assert!(tombstone.audit().is_deleted());
    assert_eq!(tombstone.audit().deleted_by(), Some(editor));
    assert_eq!(tombstone.audit().deletion_date(), Some(T3));
}

#[test]
fn stale_copy_in_fresh_context_keeps_stored_creation_and_deletion() {
    let (mut context, clock) = audited_context(T1);
    let creator = Uuid::new_v4();
    let ada = customer("Ada");
    context.customers().add(ada.clone());
    context.save_changes(Some(creator)).unwrap();

    clock.set(T2);
    context.customers().remove(ada.clone());
    context.save_changes(Some(creator)).unwrap();

    let conn = context.into_connection();
    let mut fresh = SqliteDbContext::audited(conn, Arc::clone(&clock));
    clock.set(T3);
    let mut stale = ada;
    stale.full_name = "Ada King".to_string();
    fresh.customers().update(stale.clone());
    fresh.save_changes(None).unwrap();

    let stored = fresh
        .customers()
        .find_including_deleted(stale.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.full_name, "Ada King");
    assert_eq!(stored.audit().created_by(), Some(creator));
    assert_eq!(stored.audit().creation_date(), T1);
    assert_eq!(stored.audit().last_modification_date(), Some(T3));
    assert!(stored.audit().is_deleted(), "an update never revives a closed row");
    assert_eq!(stored.audit().deleted_by(), Some(creator));
    assert_eq!(stored.audit().deletion_date(), Some(T2));
}

#[test]
fn retry_after_failed_save_restamps_delete_from_scratch() {
    let (mut context, clock) = audited_context(T1);
    let creator = Uuid::new_v4();
    let closer = Uuid::new_v4();
    let grace = customer("Grace");
    let ghost = customer("Ghost");
    context.customers().add(grace.clone());
    context.save_changes(Some(creator)).unwrap();

    clock.set(T2);
    context.customers().remove(grace.clone());
    context.customers().update(ghost.clone());
    let err = context.save_changes(None).unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
    assert_eq!(
        context.change_tracker().find::<Customer>(grace.id).unwrap().1,
        EntityState::Deleted,
        "a rolled back soft delete is pending as a delete again"
    );

    clock.set(T3);
    context.customers().attach(ghost);
    assert_eq!(context.save_changes(Some(closer)).unwrap(), 1);

    let tombstone = context
        .customers()
        .find_including_deleted(grace.id)
        .unwrap()
        .unwrap();
    let audit = tombstone.audit();
    assert!(audit.is_deleted());
    assert_eq!(audit.deleted_by(), Some(closer));
    assert_eq!(audit.deletion_date(), Some(T3));
    assert_eq!(audit.last_modified_by(), Some(creator));
    assert_eq!(audit.last_modification_date(), Some(T1));
    assert_eq!(audit.creation_date(), T1);
}

#[test]
fn non_auditable_entities_are_physically_deleted() {
    let (mut context, _clock) = audited_context(T1);
    context
        .database()
        .connection()
        .execute_batch("CREATE TABLE ledger_lines (id TEXT PRIMARY KEY NOT NULL, memo TEXT NOT NULL);")
        .unwrap();

    let line = LedgerLine {
        id: Uuid::new_v4(),
        memo: "opening balance".to_string(),
    };
    let ada = customer("Ada");
    context.set::<LedgerLine>().add(line.clone());
    context.customers().add(ada.clone());
    assert_eq!(context.save_changes(None).unwrap(), 2);

    context.set::<LedgerLine>().remove(line.clone());
    context.customers().remove(ada.clone());
    {
        let tracker = context.change_tracker();
        assert_eq!(tracker.find::<LedgerLine>(line.id).unwrap().0, &line);
    }
    assert_eq!(context.save_changes(None).unwrap(), 2);

    assert!(context.set::<LedgerLine>().find(line.id).unwrap().is_none());
    assert!(context.change_tracker().find::<LedgerLine>(line.id).is_none());
    assert!(context
        .customers()
        .find_including_deleted(ada.id)
        .unwrap()
        .unwrap()
        .audit()
        .is_deleted());
}

#[test]
fn context_without_interceptor_hard_deletes() {
    let mut context = SqliteDbContext::new(open_db_in_memory().unwrap());
    let ada = customer("Ada");
    context.customers().add(ada.clone());
    context.save_changes(None).unwrap();

    let stored = context.customers().find(ada.id).unwrap().unwrap();
    assert_eq!(stored.audit().last_modification_date(), None);

    context.customers().remove(stored);
    context.save_changes(None).unwrap();
    assert!(context
        .customers()
        .find_including_deleted(ada.id)
        .unwrap()
        .is_none());
}

#[test]
fn users_are_audited_like_customers() {
    let (mut context, _clock) = audited_context(T1);
    let admin = User::new("admin", "admin@example.com").unwrap();
    let operator = User::new("operator", "operator@example.com").unwrap();
    context.users().add(admin.clone());
    context.save_changes(None).unwrap();

    context.users().add(operator.clone());
    context.save_changes(Some(admin.id)).unwrap();

    let stored = context.users().find(operator.id).unwrap().unwrap();
    assert_eq!(stored.audit().created_by(), Some(admin.id));
    assert_eq!(context.users().list(&EntityListQuery::default()).unwrap().len(), 2);
}

#[tokio::test]
async fn async_save_applies_identical_stamps() {
    let (mut context, clock) = audited_context(T1);
    let u1 = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let ada = customer("Ada");
    let grace = customer("Grace");
    context.customers().add(ada.clone());
    context.customers().add(grace.clone());
    context.save_changes_async(Some(u1), &cancel).await.unwrap();

    clock.set(T2);
    context.customers().remove(grace.clone());
    context
        .save_changes_with(&StaticIdentity::user(u1), &cancel)
        .await
        .unwrap();

    let stored_ada = context.customers().find(ada.id).unwrap().unwrap();
    assert_eq!(stored_ada.audit().created_by(), Some(u1));
    assert_eq!(stored_ada.audit().creation_date(), T1);

    let stored_grace = context
        .customers()
        .find_including_deleted(grace.id)
        .unwrap()
        .unwrap();
    assert!(stored_grace.audit().is_deleted());
    assert_eq!(stored_grace.audit().deleted_by(), Some(u1));
    assert_eq!(stored_grace.audit().deletion_date(), Some(T2));
}

#[tokio::test]
async fn anonymous_identity_service_saves_without_user() {
    let (mut context, _clock) = audited_context(T1);
    let ada = customer("Ada");
    context.customers().add(ada.clone());
    context
        .save_changes_with(&StaticIdentity::anonymous(), &CancellationToken::new())
        .await
        .unwrap();

    let stored = context.customers().find(ada.id).unwrap().unwrap();
    assert_eq!(stored.audit().created_by(), None);
    assert_eq!(stored.audit().creation_date(), T1);
}
