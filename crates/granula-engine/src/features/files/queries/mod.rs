//! File queries

pub mod list;
pub mod results;
pub mod status;

pub use list::{ListFilesQuery, ListFilesResponse};
pub use results::GetFileResultsQuery;
pub use status::GetFileStatusQuery;
