//! Error types of the order desk, one per layer. Backend failures keep their
//! own type and are wrapped where a lifecycle operation surfaces them.

use orderdesk_backend::{BackendError, OrderStatus};

use crate::transition::OrderAction;

/// Database persistence and data corruption errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Invalid journal field in database: {0}")]
    InvalidJournalField(String),
    #[error("Invalid journal outcome in database: {0}")]
    InvalidJournalOutcome(String),
    #[error("Invalid timestamp in database: {0}")]
    InvalidTimestamp(String),
}

/// Failures of an operator-initiated mutation.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("No order matches {key}")]
    UnknownOrder { key: String },
    #[error("Cannot {action} an order that is {status}")]
    ActionNotAvailable {
        action: OrderAction,
        status: OrderStatus,
    },
    #[error("Cancelling an order must be confirmed")]
    ConfirmationRequired,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Rejected filter input.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("Invalid status filter: {0}")]
    InvalidStatus(String),
    #[error("Invalid time filter: {0}. Expected all, upcoming, past or a slot start like 06:30")]
    InvalidTime(String),
}
