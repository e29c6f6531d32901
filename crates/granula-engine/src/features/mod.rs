//! Feature handlers
//!
//! Commands and queries are plain data structs marked with `mediator::Request`;
//! each has a standalone async `handle` function taking the engine.

pub mod files;
pub mod shared;
