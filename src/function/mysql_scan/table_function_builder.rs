use std::sync::Arc;

use duckdb::Connection;
use parking_lot::Mutex;

use crate::model::extension_global_state::ExtensionState;
use crate::table_function::{
    AttachContext, MysqlAttachVTab, MysqlCloseVTab, MysqlScanPushdownVTab, MysqlScanVTab,
};

/// Register every table function of the extension on `con`.
pub fn register_table_functions(con: &Connection, state: Arc<ExtensionState>) -> duckdb::Result<()> {
    con.register_table_function_with_extra_info::<MysqlScanVTab, _>("mysql_scan", &state)?;
    con.register_table_function_with_extra_info::<MysqlScanPushdownVTab, _>("mysql_scan_pushdown", &state)?;
    con.register_table_function_with_extra_info::<MysqlCloseVTab, _>("mysql_close", &state)?;

    let context = AttachContext {
        connection: Arc::new(Mutex::new(con.try_clone()?)),
        state,
    };
    con.register_table_function_with_extra_info::<MysqlAttachVTab, _>("mysql_attach", &context)?;
    Ok(())
}
