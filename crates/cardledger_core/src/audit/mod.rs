//! Save-pipeline hooks.
//!
//! # Responsibility
//! - Define the seam through which cross-cutting concerns attach to saves.
//! - Provide the audit-stamping interceptor.
//!
//! # Invariants
//! - Interceptors run after the caller's mutations and before any SQL.
//! - The sync and async hook variants apply identical mutations.

use crate::context::tracker::ChangeTracker;
use crate::identity::UserId;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod interceptor;

pub use interceptor::AuditableEntitySaveInterceptor;

/// In-flight save cycle handed to interceptors.
#[derive(Debug)]
pub struct SaveContext<'a> {
    tracker: &'a mut ChangeTracker,
    identity: Option<UserId>,
}

impl<'a> SaveContext<'a> {
    pub fn new(tracker: &'a mut ChangeTracker, identity: Option<UserId>) -> Self {
        Self { tracker, identity }
    }

    /// Acting user for this save cycle, resolved once by the caller.
    pub fn identity(&self) -> Option<UserId> {
        self.identity
    }

    pub fn tracker(&self) -> &ChangeTracker {
        self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ChangeTracker {
        self.tracker
    }
}

/// Hook invoked right before a save cycle writes to storage.
///
/// A `None` context means the hook fired without an active save and must
/// be ignored.
#[async_trait]
pub trait SaveChangesInterceptor: Send + Sync {
    fn saving_changes(&self, context: Option<&mut SaveContext<'_>>);

    /// Async variant; the default runs the sync hook in place.
    async fn saving_changes_async(
        &self,
        context: Option<&mut SaveContext<'_>>,
        _cancel: &CancellationToken,
    ) {
        self.saving_changes(context);
    }
}
