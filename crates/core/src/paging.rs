//! Page-based pagination helpers.
//!
//! List endpoints accept `page` (1-based) and `page_size`; repositories work
//! in `LIMIT`/`OFFSET` terms. These helpers do the clamping and conversion.

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Upper bound on rows per page.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Clamp a user-provided page number to 1 or greater.
pub fn clamp_page(page: Option<i64>) -> i64 {
    page.unwrap_or(1).max(1)
}

/// Clamp a user-provided page size to `[1, MAX_PAGE_SIZE]`.
pub fn clamp_page_size(page_size: Option<i64>) -> i64 {
    page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .max(1)
        .min(MAX_PAGE_SIZE)
}

/// Convert page parameters into `(limit, offset)`.
pub fn limit_offset(page: Option<i64>, page_size: Option<i64>) -> (i64, i64) {
    let size = clamp_page_size(page_size);
    let page = clamp_page(page);
    (size, (page - 1).saturating_mul(size))
}
