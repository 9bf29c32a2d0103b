//! Saved-search alerting: evaluate predicates on a schedule, assemble one
//! email per recipient batch, and record what was delivered.
//!
//! The [`Dispatcher`] only talks to its collaborators through the
//! [`AlertStore`], [`VehicleMatcher`] and
//! [`EmailTransport`](crate::delivery::email::EmailTransport) seams, so the
//! drivers run as plain async functions in tests. [`PgAlertStore`] is the
//! production implementation of both data seams.

pub mod assembler;
pub mod dispatcher;
pub mod ports;
pub mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use assembler::{assemble, AssembledEmail, PredicateMatches};
pub use dispatcher::{Dispatcher, RunReport};
pub use ports::{AlertStore, DuePredicate, MatchBatch, VehicleMatcher};
pub use postgres::PgAlertStore;

use crate::delivery::email::EmailError;

/// Errors raised while evaluating or delivering saved-search alerts.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The datastore could not be read or written.
    #[error("Datastore error: {0}")]
    Datastore(#[from] sqlx::Error),

    /// The email transport rejected or failed the send.
    #[error("Transport error: {0}")]
    Transport(#[from] EmailError),

    /// The batch lacks context a notification requires; nothing is sent.
    #[error("Format error: {0}")]
    Format(String),
}
