use crate::error::Result;
use crate::model::attach_function_data::AttachFunctionData;
use crate::mysql::ResultSet;
use crate::transformer::duckdb_to_mysql_request::quote_literal;
use crate::util::connection_pool_registry::ConnectionPoolRegistry;

/// Where `mysql_attach` creates its views
pub trait ViewCatalog {
    /// Execute one DDL statement
    fn execute(&mut self, sql: &str) -> Result<()>;
}

fn tables_query(schema: &str) -> String {
    format!(
        "SELECT table_name FROM information_schema.tables WHERE table_schema = {}",
        quote_literal(schema)
    )
}

fn duckdb_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn duckdb_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// DuckDB statement creating the view over one MySQL table
pub fn create_view_sql(data: &AttachFunctionData, table: &str) -> String {
    format!(
        "CREATE {}VIEW {}.{} AS SELECT * FROM {}({}, {}, {}, {}, {})",
        if data.overwrite { "OR REPLACE " } else { "" },
        duckdb_identifier(&data.sink_schema),
        duckdb_identifier(table),
        data.scan_function(),
        duckdb_literal(&data.host),
        duckdb_literal(&data.username),
        duckdb_literal(&data.password),
        duckdb_literal(&data.source_schema),
        duckdb_literal(table)
    )
}

fn table_names(mut result: ResultSet) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(result.rows_count());
    while result.next() {
        names.push(result.get_string(1)?.into_owned());
    }
    Ok(names)
}

/**
Expose every table of the MySQL source schema as a view in the DuckDB sink schema.

Returns the names of the created views. Without `overwrite` an existing view
of the same name makes the statement, and the attach, fail.
 */
pub fn mysql_attach(
    registry: &ConnectionPoolRegistry,
    data: &AttachFunctionData,
    catalog: &mut dyn ViewCatalog,
) -> Result<Vec<String>> {
    let pool = registry.pool_for(&data.host, &data.username, &data.password)?;
    let tables = {
        let mut conn = pool.acquire()?;
        table_names(conn.query(&tables_query(&data.source_schema))?)?
    };

    for table in &tables {
        catalog.execute(&create_view_sql(data, table))?;
    }
    tracing::debug!(
        source_schema = %data.source_schema,
        sink_schema = %data.sink_schema,
        views = tables.len(),
        "attached MySQL schema"
    );
    Ok(tables)
}
