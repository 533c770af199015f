//! Application data context: the single path through which records are saved.
//!
//! # Responsibility
//! - Expose typed entity sets and a handle to the underlying database.
//! - Run registered save interceptors, then write the tracked changes.
//!
//! # Invariants
//! - Every persisted mutation flows through `save_changes*`.
//! - A save writes all planned operations in one transaction or none.
//! - A failed save leaves entries pending in the state the caller requested.
//! - Errors from storage propagate unchanged; the context adds none of its own.

use crate::audit::{AuditableEntitySaveInterceptor, SaveChangesInterceptor, SaveContext};
use crate::clock::Clock;
use crate::db::migrations::{current_version, latest_version};
use crate::db::{DbError, DbResult};
use crate::identity::{IdentityService, UserId};
use crate::model::customer::Customer;
use crate::model::user::User;
use async_trait::async_trait;
use log::{error, info, warn};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub mod entity;
pub mod set;
pub mod tracker;

use entity::Entity;
use set::EntitySet;
use tracker::{ChangeTracker, PlannedWrite};

/// Contract for the unit of work used by services.
#[async_trait]
pub trait ApplicationDbContext: Send {
    fn set<T: Entity>(&mut self) -> EntitySet<'_, T>;

    fn users(&mut self) -> EntitySet<'_, User> {
        self.set::<User>()
    }

    fn customers(&mut self) -> EntitySet<'_, Customer> {
        self.set::<Customer>()
    }

    fn database(&self) -> DatabaseFacade<'_>;

    /// Saves tracked changes on behalf of `identity`; returns affected rows.
    fn save_changes(&mut self, identity: Option<UserId>) -> DbResult<usize>;

    /// Async save; fails with `DbError::Cancelled` once `cancel` fires
    /// before commit.
    async fn save_changes_async(
        &mut self,
        identity: Option<UserId>,
        cancel: &CancellationToken,
    ) -> DbResult<usize>;

    /// Resolves the acting user once, then saves on their behalf.
    async fn save_changes_with(
        &mut self,
        identity_service: &dyn IdentityService,
        cancel: &CancellationToken,
    ) -> DbResult<usize> {
        let identity = identity_service.current_user_id();
        self.save_changes_async(identity, cancel).await
    }
}

/// Narrow view of the underlying SQLite connection.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseFacade<'a> {
    conn: &'a Connection,
}

impl<'a> DatabaseFacade<'a> {
    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    pub fn schema_version(&self) -> DbResult<u32> {
        current_version(self.conn)
    }

    pub fn is_up_to_date(&self) -> DbResult<bool> {
        Ok(self.schema_version()? == latest_version())
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

/// SQLite-backed [`ApplicationDbContext`].
pub struct SqliteDbContext {
    conn: Connection,
    tracker: ChangeTracker,
    interceptors: Vec<Arc<dyn SaveChangesInterceptor>>,
}

impl SqliteDbContext {
    /// Wraps a migrated connection with no interceptors.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            tracker: ChangeTracker::new(),
            interceptors: Vec::new(),
        }
    }

    /// Wraps a migrated connection with audit stamping driven by `clock`.
    pub fn audited<C: Clock + 'static>(conn: Connection, clock: C) -> Self {
        Self::new(conn).with_interceptor(AuditableEntitySaveInterceptor::new(clock))
    }

    pub fn with_interceptor(mut self, interceptor: impl SaveChangesInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn SaveChangesInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn change_tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn change_tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn commit(
        &mut self,
        mode: &'static str,
        cancel: Option<&CancellationToken>,
        started_at: Instant,
    ) -> DbResult<usize> {
        let plan = self.tracker.plan();
        if plan.is_empty() {
            return Ok(0);
        }

        match self.write_plan(&plan, cancel) {
            Ok(affected) => {
                self.tracker.accept_changes(&plan);
                info!(
                    "event=save_changes module=context status=ok mode={} writes={} affected={} duration_ms={}",
                    mode,
                    plan.len(),
                    affected,
                    started_at.elapsed().as_millis()
                );
                Ok(affected)
            }
            Err(DbError::Cancelled) => {
                self.tracker.reject_changes(&plan);
                warn!(
                    "event=save_changes module=context status=cancelled mode={} writes={} duration_ms={}",
                    mode,
                    plan.len(),
                    started_at.elapsed().as_millis()
                );
                Err(DbError::Cancelled)
            }
            Err(err) => {
                self.tracker.reject_changes(&plan);
                error!(
                    "event=save_changes module=context status=error mode={} writes={} duration_ms={} error={}",
                    mode,
                    plan.len(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn write_plan(
        &mut self,
        plan: &[PlannedWrite],
        cancel: Option<&CancellationToken>,
    ) -> DbResult<usize> {
        let tx = self.conn.transaction()?;
        let mut affected = 0;
        for planned in plan {
            affected += self.tracker.write(&tx, *planned)?;
        }

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            // Dropping the transaction rolls it back.
            return Err(DbError::Cancelled);
        }

        tx.commit()?;
        Ok(affected)
    }
}

#[async_trait]
impl ApplicationDbContext for SqliteDbContext {
    fn set<T: Entity>(&mut self) -> EntitySet<'_, T> {
        EntitySet::new(&self.conn, &mut self.tracker)
    }

    fn database(&self) -> DatabaseFacade<'_> {
        DatabaseFacade { conn: &self.conn }
    }

    fn save_changes(&mut self, identity: Option<UserId>) -> DbResult<usize> {
        let started_at = Instant::now();
        {
            let mut context = SaveContext::new(&mut self.tracker, identity);
            for interceptor in &self.interceptors {
                interceptor.saving_changes(Some(&mut context));
            }
        }
        self.commit("sync", None, started_at)
    }

    async fn save_changes_async(
        &mut self,
        identity: Option<UserId>,
        cancel: &CancellationToken,
    ) -> DbResult<usize> {
        if cancel.is_cancelled() {
            warn!("event=save_changes module=context status=cancelled mode=async stage=before_interceptors");
            return Err(DbError::Cancelled);
        }

        let started_at = Instant::now();
        {
            let mut context = SaveContext::new(&mut self.tracker, identity);
            for interceptor in &self.interceptors {
                interceptor
                    .saving_changes_async(Some(&mut context), cancel)
                    .await;
            }
        }
        self.commit("async", Some(cancel), started_at)
    }
}
