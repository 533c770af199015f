//! Core persistence layer for CardLedger.
//!
//! Records are saved through an [`ApplicationDbContext`]; save interceptors
//! (audit stamping in particular) run on every save before any SQL is issued.

pub mod audit;
pub mod clock;
pub mod context;
pub mod db;
pub mod identity;
pub mod logging;
pub mod model;
pub mod service;

pub use audit::{AuditableEntitySaveInterceptor, SaveChangesInterceptor, SaveContext};
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::entity::{Entity, EntityId, WriteOp};
pub use context::set::{EntityListQuery, EntitySet};
pub use context::tracker::{ChangeTracker, EntityEntry, EntityState, PlannedWrite};
pub use context::{ApplicationDbContext, DatabaseFacade, SqliteDbContext};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use identity::{IdentityService, StaticIdentity, UserId};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::audit::{AuditFields, Auditable};
pub use model::customer::Customer;
pub use model::user::User;
pub use model::EntityValidationError;
pub use service::customer_service::{CustomerService, CustomerServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
