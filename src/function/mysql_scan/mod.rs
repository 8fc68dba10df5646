pub mod mysql_scan_bind;
pub mod mysql_scan_global_init;
pub mod mysql_scan_local_init;
pub mod mysql_scan_read;
pub mod mysql_scan_scheduler;
pub mod table_function_builder;
