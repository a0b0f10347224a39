//! Cerise Core
//!
//! Core types and pure logic for the Cerise remote workflow service.
//!
//! This crate contains:
//! - Domain types: the Job record, its lifecycle states and input file trees
//! - CWL helpers: workflow translation, binding resolution, result parsing
//! - Naming: collision-free remote file names for staged inputs
//! - DTOs: data transfer objects for the REST front end
//!
//! Nothing in here touches the network or a filesystem; I/O lives in the
//! orchestrator.

pub mod cwl;
pub mod domain;
pub mod dto;
pub mod naming;
