use std::fmt;
use std::sync::Arc;

use crate::model::duckdb_type::{DuckdbType, MysqlTypeInfo};
use crate::util::connection_pool::ConnectionPool;

/// Column id DuckDB uses for the row-id pseudo column
pub const COLUMN_IDENTIFIER_ROW_ID: u64 = u64::MAX;

/// One scanned column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlColumnInfo {
    pub column_name: String,
    pub type_info: MysqlTypeInfo,
    /// Declared output type; `Varchar` whenever `needs_cast` is set
    pub duckdb_type: DuckdbType,
    /// Read through `CAST(... AS CHAR)` because the native type has no mapping
    pub needs_cast: bool,
}

/// Paging figures the scheduler needs from a bound scan
pub trait PagedState {
    /// Estimated number of pages in the table
    fn get_page_estimate(&self) -> u64;

    fn get_pages_per_task(&self) -> u64;

    /// Upper bound on useful parallel tasks
    fn max_threads(&self) -> u64 {
        (self.get_page_estimate() / self.get_pages_per_task().max(1)).max(1)
    }
}

/**
Everything bind learned about a scanned table.

Built once per query, then shared read-only by every scan task.
 */
#[derive(Debug)]
pub struct MysqlBindData {
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<MysqlColumnInfo>,
    pub approx_number_of_pages: u64,
    pub pages_per_task: u64,
    /// Rows per page
    pub page_size: usize,
    pub pool: Arc<ConnectionPool>,
}

impl MysqlBindData {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.column_name.as_str())
    }
}

impl PagedState for MysqlBindData {
    fn get_page_estimate(&self) -> u64 {
        self.approx_number_of_pages
    }

    fn get_pages_per_task(&self) -> u64 {
        self.pages_per_task
    }

    /// Never more tasks than the pool can hand out connections
    fn max_threads(&self) -> u64 {
        let by_pages = (self.approx_number_of_pages / self.pages_per_task.max(1)).max(1);
        by_pages.min(self.pool.max_size().max(1) as u64)
    }
}

impl fmt::Display for MysqlBindData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema_name, self.table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pages(u64, u64);

    impl PagedState for Pages {
        fn get_page_estimate(&self) -> u64 {
            self.0
        }

        fn get_pages_per_task(&self) -> u64 {
            self.1
        }
    }

    #[test]
    fn test_max_threads() {
        assert_eq!(Pages(0, 1000).max_threads(), 1);
        assert_eq!(Pages(999, 1000).max_threads(), 1);
        assert_eq!(Pages(5000, 1000).max_threads(), 5);
        assert_eq!(Pages(10, 3).max_threads(), 3);
    }
}
