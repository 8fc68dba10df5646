pub mod duckdb_to_mysql_request;
pub mod mysql_to_duckdb_result;
