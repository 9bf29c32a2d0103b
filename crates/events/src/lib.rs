//! AutoBridge saved-search alerting and notification delivery.
//!
//! - [`alerts`]: the dispatcher that evaluates saved searches on a schedule,
//!   the assembler that turns results into one email per recipient, and the
//!   Postgres adapter behind both.
//! - [`delivery`]: the email transport seam and its SMTP implementation.

pub mod alerts;
pub mod delivery;

pub use alerts::{AlertError, Dispatcher, PgAlertStore, RunReport};
pub use delivery::email::{EmailConfig, EmailError, EmailTransport, SmtpMailer};
