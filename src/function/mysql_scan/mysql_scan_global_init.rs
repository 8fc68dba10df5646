use crate::model::mysql_bind_data::PagedState;
use crate::model::mysql_global_state::MysqlGlobalState;

/// Shared scan progress for one query: nothing claimed yet, parallelism capped
/// by the paging figures (and, for a bound table, by its pool size).
pub fn mysql_scan_global_init(bind_data: &impl PagedState) -> MysqlGlobalState {
    let state = MysqlGlobalState::new(bind_data);
    tracing::debug!(
        page_estimate = bind_data.get_page_estimate(),
        max_threads = state.max_threads(),
        "initialized MySQL scan"
    );
    state
}
