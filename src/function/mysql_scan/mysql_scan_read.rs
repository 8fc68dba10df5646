use crate::error::{Error, Result};
use crate::model::mysql_bind_data::{MysqlBindData, COLUMN_IDENTIFIER_ROW_ID};
use crate::model::mysql_global_state::MysqlGlobalState;
use crate::model::mysql_local_state::MysqlLocalState;
use crate::model::output_chunk::OutputChunk;
use crate::transformer::duckdb_to_mysql_request::paged_request;
use crate::transformer::mysql_to_duckdb_result::process_value;

fn emit_rows(
    bind_data: &MysqlBindData,
    local_state: &mut MysqlLocalState,
    output: &mut dyn OutputChunk,
) -> Result<usize> {
    let capacity = output.capacity();
    let Some((result, column_ids)) = local_state.open_result() else {
        return Ok(0);
    };

    let mut row = 0;
    while row < capacity && result.next() {
        for (out_col, &column_id) in column_ids.iter().enumerate() {
            if column_id == COLUMN_IDENTIFIER_ROW_ID {
                output.set_null(out_col, row);
                continue;
            }
            let column = usize::try_from(column_id)
                .ok()
                .and_then(|idx| bind_data.columns.get(idx))
                .ok_or_else(|| Error::internal(format!("projected column id {} out of range", column_id)))?;
            process_value(result, column, out_col, output, out_col, row)?;
        }
        row += 1;
    }
    Ok(row)
}

/**
Fill one output batch for a scan task.

Fetches the task's next page when the previous one is used up, claiming a new
page range from the shared state when the current range is exhausted. Returns
the number of rows written; 0 means the task is done. A page that comes back
empty ends the task even if the estimate promised more.
 */
pub fn mysql_scan_read(
    bind_data: &MysqlBindData,
    global_state: &MysqlGlobalState,
    local_state: &mut MysqlLocalState,
    output: &mut dyn OutputChunk,
) -> Result<usize> {
    loop {
        if !local_state.exec {
            if !local_state.ensure_pages(global_state) {
                output.set_len(0);
                return Ok(0);
            }
            let page = local_state.current_page;
            local_state.current_page += 1;
            let sql = paged_request(&local_state.base_sql, page, bind_data.page_size);
            let rows = local_state.execute(&sql)?.rows_count();
            if rows == 0 {
                tracing::debug!(table = %bind_data, page, "empty page, scan task done");
                local_state.finish();
                output.set_len(0);
                return Ok(0);
            }
        }

        let emitted = emit_rows(bind_data, local_state, output)?;
        if emitted > 0 {
            output.set_len(emitted);
            return Ok(emitted);
        }
        local_state.close_result();
    }
}
