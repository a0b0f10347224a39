//! Polling module
//!
//! Drives the back end: every refresh interval each job that still needs
//! attention gets one step of processing.

mod poller;

pub use poller::JobPoller;
