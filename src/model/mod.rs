pub mod attach_function_data;
pub mod duckdb_type;
pub mod extension_global_state;
pub mod mysql_bind_data;
pub mod mysql_global_state;
pub mod mysql_local_state;
pub mod output_chunk;
pub mod table_filter;
