//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or a connection) as the first argument.

pub mod job_lock_repo;
pub mod saved_search_repo;
pub mod user_repo;
pub mod vehicle_repo;

pub use job_lock_repo::{JobLock, JobLockRepo};
pub use saved_search_repo::{SavedSearchFilter, SavedSearchRepo};
pub use user_repo::UserRepo;
pub use vehicle_repo::VehicleRepo;
