//! Repository Module
//!
//! The job registry: the single owner of every job record. Both the REST
//! front end and the back end go through it, and any change to a job is
//! made while holding that job's lease.

mod job;
mod memory;
mod sqlite;

pub use job::{JobLease, JobRegistry, RegistryError, RegistryResult};
pub use memory::MemoryJobRegistry;
pub use sqlite::SqliteJobRegistry;
