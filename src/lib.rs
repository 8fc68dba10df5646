//! DuckDB extension exposing MySQL tables as table functions
//!
//! ```sql
//! LOAD 'mysql_scanner.duckdb_extension';
//! SELECT * FROM mysql_scan('127.0.0.1', 'reader', 'secret', 'shop', 'orders');
//! SELECT * FROM mysql_attach('127.0.0.1', 'reader', 'secret', source_schema='shop');
//! ```

extern crate duckdb;
extern crate duckdb_loadable_macros;
extern crate libduckdb_sys;

pub mod config;
pub mod error;
pub mod function;
pub mod model;
pub mod mysql;
pub mod table_function;
pub mod transformer;
pub mod util;

use std::error::Error;
use std::sync::Arc;

use duckdb::Connection;
use duckdb_loadable_macros::duckdb_entrypoint_c_api;
use tracing_subscriber::EnvFilter;

use crate::config::ScannerConfig;
use crate::function::mysql_scan::table_function_builder::register_table_functions;
use crate::model::extension_global_state::ExtensionState;
use crate::mysql::MysqlConnector;

/// Extension name.
pub const EXTENSION_NAME: &str = "mysql_scanner";

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "MYSQL_SCANNER_LOG";

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // the host may already have installed a subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Init hook for DuckDB, registers all functionality provided by this extension
#[duckdb_entrypoint_c_api(ext_name = "mysql_scanner")]
pub unsafe fn mysql_scanner_init(con: Connection) -> Result<(), Box<dyn Error>> {
    init_logging();

    let config = ScannerConfig::from_env();
    config.validate()?;
    let state = Arc::new(ExtensionState::new(Arc::new(MysqlConnector::new()), config));
    register_table_functions(&con, state)?;

    tracing::info!(
        "Loading {} v{} extension",
        EXTENSION_NAME,
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}
