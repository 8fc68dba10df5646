pub mod mysql_attach;
pub mod mysql_scan;
