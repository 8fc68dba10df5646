use crate::error::Result;
use crate::model::mysql_bind_data::MysqlBindData;
use crate::model::mysql_global_state::MysqlGlobalState;
use crate::model::mysql_local_state::MysqlLocalState;
use crate::model::table_filter::TableFilterSet;
use crate::transformer::duckdb_to_mysql_request::duckdb_to_mysql_request;

/// What one scan task reads: projected column ids and pushed-down filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    pub column_ids: Vec<u64>,
    pub filters: TableFilterSet,
}

impl ScanRequest {
    pub fn new(column_ids: Vec<u64>) -> Self {
        Self {
            column_ids,
            filters: TableFilterSet::new(),
        }
    }

    pub fn with_filters(mut self, filters: TableFilterSet) -> Self {
        self.filters = filters;
        self
    }
}

/// Start a scan task: build its SELECT, claim its first pages, then borrow a connection.
///
/// When no pages are left the task comes back already done without touching
/// the pool, so a late task never waits on connections held by busy ones.
pub fn mysql_scan_local_init(
    bind_data: &MysqlBindData,
    global_state: &MysqlGlobalState,
    request: ScanRequest,
) -> Result<MysqlLocalState> {
    let base_sql = duckdb_to_mysql_request(bind_data, &request.column_ids, &request.filters)?;
    let mut local_state = MysqlLocalState::new(base_sql, request.column_ids, request.filters);
    if local_state.ensure_pages(global_state) {
        local_state.attach_connection(bind_data.pool.acquire()?);
    }
    Ok(local_state)
}
