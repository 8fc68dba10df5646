use crate::error::Result;
use crate::model::mysql_global_state::{MysqlGlobalState, PageRange};
use crate::model::table_filter::TableFilterSet;
use crate::mysql::ResultSet;
use crate::util::connection_pool::PooledConnection;

/**
State of one scan task.

A task borrows a pooled connection only once it has pages to read, and keeps
it until it runs out of work. Dropping the state closes the open result first
and only then hands the connection back to the pool, whichever way the task
ends.
 */
#[derive(Debug)]
pub struct MysqlLocalState {
    pub done: bool,
    /// A page has been fetched and rows remain to emit
    pub exec: bool,
    /// SELECT without paging, built once per task
    pub base_sql: String,
    pub start_page: u64,
    pub current_page: u64,
    pub end_page: u64,
    pub column_ids: Vec<u64>,
    pub filters: TableFilterSet,
    result: Option<ResultSet>,
    connection: Option<PooledConnection>,
}

impl MysqlLocalState {
    pub fn new(base_sql: String, column_ids: Vec<u64>, filters: TableFilterSet) -> Self {
        Self {
            done: false,
            exec: false,
            base_sql,
            start_page: 0,
            current_page: 0,
            end_page: 0,
            column_ids,
            filters,
            result: None,
            connection: None,
        }
    }

    /// Give the task the connection its queries run on
    pub fn attach_connection(&mut self, connection: PooledConnection) {
        self.connection = Some(connection);
    }

    /// Move to the next claimed range once the current one is used up.
    ///
    /// Returns false, and marks the task done, when no work is left.
    pub fn ensure_pages(&mut self, global: &MysqlGlobalState) -> bool {
        if self.done {
            return false;
        }
        if self.current_page < self.end_page {
            return true;
        }
        match global.claim_pages() {
            Some(PageRange { start, end }) => {
                self.start_page = start;
                self.current_page = start;
                self.end_page = end;
                true
            }
            None => {
                self.finish();
                false
            }
        }
    }

    /// Run `sql` on the task's connection and keep the rows as the open result.
    pub fn execute(&mut self, sql: &str) -> Result<&mut ResultSet> {
        self.result = None;
        let connection = self.connection.as_mut().ok_or_else(|| {
            crate::error::Error::internal("scan task has already released its connection")
        })?;
        let rows = connection.query(sql)?;
        self.exec = true;
        Ok(self.result.insert(rows))
    }

    /// The open result together with the projection it was selected with
    pub fn open_result(&mut self) -> Option<(&mut ResultSet, &[u64])> {
        let column_ids = self.column_ids.as_slice();
        self.result.as_mut().map(|result| (result, column_ids))
    }

    /// Drop the open result; the task keeps its connection.
    pub fn close_result(&mut self) {
        self.result = None;
        self.exec = false;
    }

    /// Mark the task done and release its resources, result before connection.
    pub fn finish(&mut self) {
        self.done = true;
        self.close_result();
        self.connection = None;
    }

    /// Whether the task still holds a pooled connection
    pub fn holds_connection(&self) -> bool {
        self.connection.is_some()
    }
}

impl Drop for MysqlLocalState {
    fn drop(&mut self) {
        self.finish();
    }
}
