/// Options of one `mysql_attach` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachFunctionData {
    pub host: String,
    pub username: String,
    pub password: String,
    /// MySQL schema whose tables are exposed
    pub source_schema: String,
    /// DuckDB schema receiving the views
    pub sink_schema: String,
    /// Replace views that already exist
    pub overwrite: bool,
    /// Back views with `mysql_scan_pushdown` instead of `mysql_scan`
    pub filter_pushdown: bool,
}

impl AttachFunctionData {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        AttachFunctionData {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            source_schema: "public".to_string(),
            sink_schema: "main".to_string(),
            overwrite: false,
            filter_pushdown: true,
        }
    }

    /// Table function the created views select from
    pub fn scan_function(&self) -> &'static str {
        if self.filter_pushdown {
            "mysql_scan_pushdown"
        } else {
            "mysql_scan"
        }
    }
}
