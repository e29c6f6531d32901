//! Granula Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the Granula workspace.
//!
//! # Overview
//!
//! - **Types**: file and chunk status enums, the derived status view,
//!   result rows and result pages exchanged between the engine and its callers
//! - **Error Handling**: [`GranulaError`] for parsing and validating shared values
//! - **Logging**: tracing subscriber bootstrap shared by every binary
//!
//! # Example
//!
//! ```
//! use granula_common::types::ChunkStatus;
//!
//! let status: ChunkStatus = "processing".parse().unwrap();
//! assert!(!status.is_terminal());
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{GranulaError, Result};
