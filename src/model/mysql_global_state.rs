use parking_lot::Mutex;

use crate::model::mysql_bind_data::PagedState;

/// A contiguous run of pages claimed by one task, `start` inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u64,
    pub end: u64,
}

/// Scan progress shared by all tasks of one query
#[derive(Debug)]
pub struct MysqlGlobalState {
    /// Next unassigned page
    next_page: Mutex<u64>,
    page_estimate: u64,
    pages_per_task: u64,
    max_threads: u64,
}

impl MysqlGlobalState {
    pub fn new(paged: &impl PagedState) -> Self {
        Self {
            next_page: Mutex::new(0),
            page_estimate: paged.get_page_estimate(),
            pages_per_task: paged.get_pages_per_task().max(1),
            max_threads: paged.max_threads(),
        }
    }

    pub fn max_threads(&self) -> u64 {
        self.max_threads
    }

    /// Claim the next `pages_per_task` pages, or `None` once the estimate is reached.
    pub fn claim_pages(&self) -> Option<PageRange> {
        let mut next_page = self.next_page.lock();
        if *next_page >= self.page_estimate {
            return None;
        }
        let start = *next_page;
        let end = start.saturating_add(self.pages_per_task).min(self.page_estimate);
        *next_page = end;
        drop(next_page);

        tracing::debug!(start, end, "claimed page range");
        Some(PageRange { start, end })
    }
}
