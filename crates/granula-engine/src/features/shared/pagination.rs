//! Shared pagination utilities for result queries

use serde::{Deserialize, Serialize};

/// Page size used when a query does not carry one.
pub const DEFAULT_LIMIT: u32 = 100;

/// Largest page size a query may request.
pub const MAX_LIMIT: u32 = 1000;

/// Limit/offset request parameters
///
/// Missing values fall back to defaults; the limit is clamped to `1..=MAX_LIMIT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl PaginationParams {
    pub fn new(limit: Option<u32>, offset: Option<u64>) -> Self {
        Self { limit, offset }
    }

    /// Items per page, defaulting to 100 and clamped to 1-1000
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = PaginationParams::default();
        assert_eq!(params.limit(), 100);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(PaginationParams::new(Some(0), None).limit(), 1);
        assert_eq!(PaginationParams::new(Some(5000), None).limit(), 1000);
        assert_eq!(PaginationParams::new(Some(2), Some(1)).limit(), 2);
    }
}
