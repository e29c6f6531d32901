//! Shared utilities for feature handlers

pub mod filename;
pub mod pagination;

pub use filename::sanitize_filename;
pub use pagination::PaginationParams;
