//! Core domain types
//!
//! This module contains the domain structures shared by the job registry,
//! the staging machinery and the REST front end.

pub mod input_file;
pub mod job;
pub mod log;
pub mod state;
