//! Data Transfer Objects
//!
//! Types exchanged with REST clients.

pub mod job;
