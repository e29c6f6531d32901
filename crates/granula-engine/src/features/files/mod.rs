//! Files feature module
//!
//! Upload registration plus read-only status, results and listing queries.

pub mod commands;
pub mod queries;
