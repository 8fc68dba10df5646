use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::model::duckdb_type::{duckdb_type, MysqlTypeInfo};
use crate::model::mysql_bind_data::{MysqlBindData, MysqlColumnInfo};
use crate::mysql::ResultSet;
use crate::transformer::duckdb_to_mysql_request::{quote_identifier, quote_literal};
use crate::util::connection_pool::ConnectionPool;
use crate::util::connection_pool_registry::ConnectionPoolRegistry;

/// Positional arguments of `mysql_scan` / `mysql_scan_pushdown`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanParameters {
    pub host: String,
    pub username: String,
    pub password: String,
    pub schema: String,
    pub table: String,
}

fn page_count_query(schema: &str, table: &str, page_size: usize) -> String {
    format!(
        "SELECT CEIL(COUNT(*) / {}) FROM {}.{}",
        page_size,
        quote_identifier(schema),
        quote_identifier(table)
    )
}

fn columns_query(schema: &str, table: &str) -> String {
    format!(
        "SELECT column_name, data_type, column_type, character_maximum_length, \
         numeric_precision, numeric_scale, \
         IF(data_type = 'enum', SUBSTRING(column_type, 5), NULL) AS enum_values \
         FROM information_schema.columns \
         WHERE table_schema = {} AND table_name = {} \
         ORDER BY ordinal_position",
        quote_literal(schema),
        quote_literal(table)
    )
}

fn optional_u64(result: &ResultSet, col: usize) -> Result<Option<u64>> {
    if result.is_null(col)? {
        Ok(None)
    } else {
        result.get_u64(col).map(Some)
    }
}

fn optional_string(result: &ResultSet, col: usize) -> Result<Option<String>> {
    if result.is_null(col)? {
        Ok(None)
    } else {
        Ok(Some(result.get_string(col)?.into_owned()))
    }
}

/// Turn the introspection rows into column descriptors.
fn read_columns(mut result: ResultSet) -> Result<Vec<MysqlColumnInfo>> {
    let mut columns = Vec::with_capacity(result.rows_count());
    while result.next() {
        let type_info = MysqlTypeInfo {
            data_type: result.get_string(2)?.to_ascii_lowercase(),
            column_type: result.get_string(3)?.into_owned(),
            char_max_length: optional_u64(&result, 4)?,
            numeric_precision: optional_u64(&result, 5)?,
            numeric_scale: optional_u64(&result, 6)?,
            enum_values: optional_string(&result, 7)?,
        };
        let (duckdb_type, needs_cast) = duckdb_type(&type_info);
        columns.push(MysqlColumnInfo {
            column_name: result.get_string(1)?.into_owned(),
            type_info,
            duckdb_type,
            needs_cast,
        });
    }
    Ok(columns)
}

fn read_page_count(mut result: ResultSet) -> Result<u64> {
    if result.rows_count() != 1 {
        return Err(Error::malformed(format!(
            "row count query returned {} rows instead of 1",
            result.rows_count()
        )));
    }
    result.next();
    if result.is_null(1)? {
        return Ok(0);
    }
    result.get_u64(1)
}

/// Run one bind statement on its own connection and thread.
fn spawn_query<T, F>(pool: &Arc<ConnectionPool>, sql: String, read: F) -> mpsc::Receiver<Result<T>>
where
    T: Send + 'static,
    F: FnOnce(ResultSet) -> Result<T> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let pool = Arc::clone(pool);
    std::thread::spawn(move || {
        let result = pool.acquire().and_then(|mut conn| conn.query(&sql)).and_then(read);
        // the binder may have given up waiting
        let _ = sender.send(result);
    });
    receiver
}

/// Wait for a spawned statement until `deadline`.
fn await_result<T>(receiver: mpsc::Receiver<Result<T>>, deadline: Instant, what: &str) -> Result<T> {
    let budget = deadline.saturating_duration_since(Instant::now());
    match receiver.recv_timeout(budget) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::timeout(format!(
            "{} did not finish within the bind timeout",
            what
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(Error::internal(format!("worker for {} exited without a result", what)))
        }
    }
}

/**
Resolve the scanned table: its columns, their DuckDB types and the page estimate.

The row count and the column introspection are independent, so each runs on
its own connection and thread. Both must come back within the configured bind
timeout, measured from the start of bind; an unresponsive server fails the
bind instead of hanging it.
 */
pub fn mysql_scan_bind(registry: &ConnectionPoolRegistry, params: &ScanParameters) -> Result<MysqlBindData> {
    let config = registry.config();
    let pool = registry.pool_for(&params.host, &params.username, &params.password)?;
    let qualified = format!("{}.{}", params.schema, params.table);
    let deadline = Instant::now() + config.bind_timeout;

    let page_count = spawn_query(
        &pool,
        page_count_query(&params.schema, &params.table, config.page_size),
        read_page_count,
    );
    let columns = spawn_query(&pool, columns_query(&params.schema, &params.table), read_columns);

    let columns = await_result(columns, deadline, &format!("reading the columns of {}", qualified))?;
    if columns.is_empty() {
        return Err(Error::TableNotFound {
            schema: params.schema.clone(),
            table: params.table.clone(),
        });
    }

    let approx_number_of_pages = await_result(page_count, deadline, &format!("counting rows of {}", qualified))?;
    tracing::debug!(
        table = %qualified,
        columns = columns.len(),
        approx_number_of_pages,
        "bound MySQL table"
    );

    Ok(MysqlBindData {
        schema_name: params.schema.clone(),
        table_name: params.table.clone(),
        columns,
        approx_number_of_pages,
        pages_per_task: config.pages_per_task,
        page_size: config.page_size,
        pool,
    })
}
