//! Pagination window.

use serde::{Deserialize, Serialize};

/// Default 1-based page when none is supplied.
pub const DEFAULT_PAGE: u64 = 1;
/// Default page size when none is supplied.
pub const DEFAULT_LIMIT: u64 = 10;

/// An offset/limit window over an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Rows to skip before the window starts.
    pub skip: u64,
    /// Maximum rows in the window.
    pub take: u64,
}

impl Page {
    /// Build a window from raw skip/take values.
    #[must_use]
    pub const fn new(skip: u64, take: u64) -> Self {
        Self { skip, take }
    }

    /// Build a window from 1-based page / limit inputs, defaulting to page 1
    /// and 10 rows when either is absent or zero.
    #[must_use]
    pub fn from_page(page: Option<u64>, limit: Option<u64>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
        let take = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT);
        Self {
            skip: (page - 1) * take,
            take,
        }
    }

    /// The 1-based page number this window starts on.
    #[must_use]
    pub const fn page_number(&self) -> u64 {
        if self.take == 0 {
            1
        } else {
            self.skip / self.take + 1
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::from_page(None, None)
    }
}
