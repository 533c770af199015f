//! Customer use-case service.
//!
//! # Responsibility
//! - Provide customer registration, credit-line changes and closure.
//! - Save every change through the context so audit stamping applies.
//!
//! # Invariants
//! - Records are validated before they are tracked.
//! - Closing a customer is a soft delete; the row stays readable with
//!   `include_deleted`.

use crate::context::entity::EntityId;
use crate::context::set::EntityListQuery;
use crate::context::ApplicationDbContext;
use crate::db::DbError;
use crate::identity::UserId;
use crate::model::customer::Customer;
use crate::model::EntityValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio_util::sync::CancellationToken;

/// Service error for customer use-cases.
#[derive(Debug)]
pub enum CustomerServiceError {
    Validation(EntityValidationError),
    CustomerNotFound(EntityId),
    Db(DbError),
}

impl Display for CustomerServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::CustomerNotFound(id) => write!(f, "customer not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CustomerServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::CustomerNotFound(_) => None,
        }
    }
}

impl From<EntityValidationError> for CustomerServiceError {
    fn from(value: EntityValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for CustomerServiceError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::NotFound { id, .. } => Self::CustomerNotFound(id),
            other => Self::Db(other),
        }
    }
}

pub type CustomerServiceResult<T> = Result<T, CustomerServiceError>;

/// Use-case wrapper over an application context, acting for one user.
pub struct CustomerService<X: ApplicationDbContext> {
    context: X,
    acting_user: Option<UserId>,
}

impl<X: ApplicationDbContext> CustomerService<X> {
    pub fn new(context: X, acting_user: Option<UserId>) -> Self {
        Self {
            context,
            acting_user,
        }
    }

    pub fn context(&self) -> &X {
        &self.context
    }

    pub fn into_context(self) -> X {
        self.context
    }

    /// Registers a customer and returns the stored record.
    pub async fn register_customer(
        &mut self,
        full_name: &str,
        email: &str,
        credit_limit_cents: i64,
        cancel: &CancellationToken,
    ) -> CustomerServiceResult<Customer> {
        let mut customer = Customer::new(full_name.trim(), email.trim())?;
        customer.credit_limit_cents = credit_limit_cents;
        customer.validate()?;

        let id = self.context.customers().add(customer);
        self.context
            .save_changes_async(self.acting_user, cancel)
            .await?;
        self.require_customer(id)
    }

    /// Replaces the credit limit of an active customer.
    pub async fn update_credit_limit(
        &mut self,
        id: EntityId,
        credit_limit_cents: i64,
        cancel: &CancellationToken,
    ) -> CustomerServiceResult<Customer> {
        let mut customer = self.require_customer(id)?;
        customer.credit_limit_cents = credit_limit_cents;
        customer.validate()?;

        self.context.customers().update(customer);
        self.context
            .save_changes_async(self.acting_user, cancel)
            .await?;
        self.require_customer(id)
    }

    /// Closes a customer account. Returns the soft-deleted record.
    pub async fn close_customer(
        &mut self,
        id: EntityId,
        cancel: &CancellationToken,
    ) -> CustomerServiceResult<Customer> {
        let customer = self.require_customer(id)?;
        self.context.customers().remove(customer);
        self.context
            .save_changes_async(self.acting_user, cancel)
            .await?;

        self.context
            .customers()
            .find_including_deleted(id)?
            .ok_or(CustomerServiceError::CustomerNotFound(id))
    }

    pub fn get_customer(
        &mut self,
        id: EntityId,
        include_deleted: bool,
    ) -> CustomerServiceResult<Option<Customer>> {
        let customers = self.context.customers();
        let found = if include_deleted {
            customers.find_including_deleted(id)?
        } else {
            customers.find(id)?
        };
        Ok(found)
    }

    pub fn list_customers(
        &mut self,
        query: &EntityListQuery,
    ) -> CustomerServiceResult<Vec<Customer>> {
        Ok(self.context.customers().list(query)?)
    }

    fn require_customer(&mut self, id: EntityId) -> CustomerServiceResult<Customer> {
        self.context
            .customers()
            .find(id)?
            .ok_or(CustomerServiceError::CustomerNotFound(id))
    }
}
