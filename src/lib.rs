//! sidefx - differential oracle for side effects of injected page scripts
//!
//! Runs generated case documents with and without a candidate script,
//! records every built-in API call each run makes, and reports cases where
//! the script changed the call trace or slowed the page beyond noise.

pub mod cli;
pub mod config;
pub mod embedded;
pub mod environment;
pub mod error;
pub mod oracle;
pub mod profiler;
pub mod recorder;
pub mod session;
