//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Page-based pagination parameters (`?page=&page_size=`).
///
/// `page` is 1-based; `page_size` defaults to 10 and is capped at 100.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageParams {
    /// Convert to repository `(limit, offset)` terms.
    pub fn limit_offset(&self) -> (i64, i64) {
        oa_core::paging::limit_offset(self.page, self.page_size)
    }
}
