//! Page window computation.

use serde::{Deserialize, Serialize};

use crate::config::AnalyticsConfig;
use crate::error::QueryError;

/// Pager block of `metaData`. The two shapes never co-occur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PagerKind {
    /// Exact count: `{page, pageSize, total, pageCount}`.
    #[serde(rename_all = "camelCase")]
    Exact {
        page: u64,
        page_size: u64,
        total: u64,
        page_count: u64,
    },
    /// Without a count: `{page, pageSize, isLastPage}`.
    #[serde(rename_all = "camelCase")]
    Estimated {
        page: u64,
        page_size: u64,
        is_last_page: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub enabled: bool,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: bool,
}

impl Paging {
    /// # Errors
    ///
    /// `InvalidParameter` when `page` is zero. A zero `pageSize` yields an
    /// empty page.
    pub fn from_params(
        page: Option<u64>,
        page_size: Option<u64>,
        enabled: bool,
        total_pages: bool,
        config: &AnalyticsConfig,
    ) -> Result<Self, QueryError> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(QueryError::invalid_parameter("page", "must be at least 1"));
        }
        let page_size = page_size.unwrap_or(config.default_page_size);
        Ok(Self {
            enabled,
            page,
            page_size: page_size.min(config.max_page_size),
            total_pages,
        })
    }

    fn offset(&self) -> usize {
        usize::try_from((self.page - 1).saturating_mul(self.page_size)).unwrap_or(usize::MAX)
    }

    fn window(&self) -> usize {
        usize::try_from(self.page_size).unwrap_or(usize::MAX)
    }

    /// Cuts the page out of the fully sorted rows.
    pub fn apply<T>(&self, rows: Vec<T>) -> (Vec<T>, Option<PagerKind>) {
        if !self.enabled {
            return (rows, None);
        }
        if self.total_pages {
            let total = rows.len() as u64;
            let page_rows = rows
                .into_iter()
                .skip(self.offset())
                .take(self.window())
                .collect();
            let pager = PagerKind::Exact {
                page: self.page,
                page_size: self.page_size,
                total,
                page_count: if self.page_size == 0 {
                    0
                } else {
                    total.div_ceil(self.page_size)
                },
            };
            return (page_rows, Some(pager));
        }

        let mut page_rows: Vec<T> = rows
            .into_iter()
            .skip(self.offset())
            .take(self.window().saturating_add(1))
            .collect();
        let is_last_page = page_rows.len() <= self.window();
        page_rows.truncate(self.window());
        let pager = PagerKind::Estimated {
            page: self.page,
            page_size: self.page_size,
            is_last_page,
        };
        (page_rows, Some(pager))
    }
}
