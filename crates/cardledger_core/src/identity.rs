//! Acting-user resolution.
//!
//! # Responsibility
//! - Name the identity type stamped into `..._by` audit columns.
//! - Abstract the service that knows who is acting for the current request.
//!
//! # Invariants
//! - `None` means no authenticated user (system job, anonymous request).
//! - Callers resolve identity once per save cycle and pass it explicitly.

use uuid::Uuid;

/// Identifier of an application user.
pub type UserId = Uuid;

/// Resolves the user on whose behalf the current operation runs.
pub trait IdentityService: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;
}

/// Identity service that always reports the same answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticIdentity(Option<UserId>);

impl StaticIdentity {
    /// Identity for an authenticated user.
    pub fn user(id: UserId) -> Self {
        Self(Some(id))
    }

    /// Identity for unauthenticated or system-initiated work.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityService for StaticIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.0
    }
}

impl<S: IdentityService + ?Sized> IdentityService for std::sync::Arc<S> {
    fn current_user_id(&self) -> Option<UserId> {
        (**self).current_user_id()
    }
}
