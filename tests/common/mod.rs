//! In-memory MySQL used by the integration tests
//!
//! `FakeMysql` understands exactly the statements the scanner issues: the
//! row count estimate, the two information_schema queries, paged SELECTs and
//! `SELECT CONNECTION_ID()`. Failures can be injected per connect, per
//! validation and per query.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mysql::Value;
use parking_lot::Mutex;

use mysql_scanner::config::ScannerConfig;
use mysql_scanner::error::{Error, Result};
use mysql_scanner::model::mysql_bind_data::MysqlBindData;
use mysql_scanner::model::mysql_global_state::MysqlGlobalState;
use mysql_scanner::model::mysql_local_state::MysqlLocalState;
use mysql_scanner::model::output_chunk::{DuckValue, OutputChunk};
use mysql_scanner::mysql::{Connection, Connector, Endpoint, ResultSet};
use mysql_scanner::function::mysql_scan::mysql_scan_read::mysql_scan_read;
use mysql_scanner::util::connection_pool_registry::ConnectionPoolRegistry;

pub fn text(s: &str) -> Value {
    Value::Bytes(s.as_bytes().to_vec())
}

#[derive(Debug, Clone)]
pub struct FakeColumn {
    pub name: String,
    pub data_type: String,
    pub column_type: String,
    pub precision: Option<u64>,
    pub scale: Option<u64>,
}

impl FakeColumn {
    pub fn new(name: &str, data_type: &str, column_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            column_type: column_type.to_string(),
            precision: None,
            scale: None,
        }
    }

    pub fn decimal(name: &str, precision: u64, scale: u64) -> Self {
        Self {
            precision: Some(precision),
            scale: Some(scale),
            ..Self::new(name, "decimal", &format!("decimal({},{})", precision, scale))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub columns: Vec<FakeColumn>,
    pub rows: Vec<Vec<Value>>,
}

/// `orders(id INT, name VARCHAR, status ENUM('a','b'))` with three rows
pub fn orders_table() -> FakeTable {
    FakeTable {
        columns: vec![
            FakeColumn::new("id", "int", "int"),
            FakeColumn::new("name", "varchar", "varchar(64)"),
            FakeColumn::new("status", "enum", "enum('a','b')"),
        ],
        rows: vec![
            vec![text("1"), text("widget"), text("a")],
            vec![text("2"), text("gadget"), text("b")],
            vec![text("3"), Value::NULL, text("a")],
        ],
    }
}

/// `numbers(id BIGINT)` holding 1..=n
pub fn numbers_table(n: u64) -> FakeTable {
    FakeTable {
        columns: vec![FakeColumn::new("id", "bigint", "bigint")],
        rows: (1..=n).map(|i| vec![text(&i.to_string())]).collect(),
    }
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn quoted_after<'a>(sql: &'a str, marker: &str) -> Option<&'a str> {
    let start = sql.find(marker)? + marker.len();
    let rest = &sql[start..];
    let end = rest.find('\'')?;
    Some(&rest[..end])
}

fn backticked(name: &str) -> Option<&str> {
    let start = name.find('`')? + 1;
    let end = start + name[start..].find('`')?;
    Some(&name[start..end])
}

/// Shared state of the fake server
#[derive(Default)]
pub struct FakeMysql {
    tables: Mutex<HashMap<(String, String), FakeTable>>,
    queries: Mutex<Vec<String>>,
    /// Page count reported regardless of the table size
    pub page_count_override: Mutex<Option<u64>>,
    pub count_delay: Mutex<Option<Duration>>,
    pub columns_delay: Mutex<Option<Duration>>,
    /// Host whose connects take the given time
    pub slow_host: Mutex<Option<(String, Duration)>>,
    pub fail_connects: AtomicUsize,
    pub invalid_validations: AtomicUsize,
    pub dropped_queries: AtomicUsize,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeMysql {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_table(self: Arc<Self>, schema: &str, table: &str, data: FakeTable) -> Arc<Self> {
        self.tables
            .lock()
            .insert((schema.to_string(), table.to_string()), data);
        self
    }

    pub fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(FakeConnector {
            server: Arc::clone(self),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Paged data SELECTs issued so far
    pub fn page_queries(&self) -> Vec<String> {
        self.queries()
            .into_iter()
            .filter(|q| q.contains(" LIMIT "))
            .collect()
    }

    /// Connections opened and not yet closed
    pub fn open_connections(&self) -> usize {
        self.connects.load(Ordering::SeqCst) - self.closes.load(Ordering::SeqCst)
    }

    fn run(&self, sql: &str, connection_id: usize) -> Result<ResultSet> {
        self.queries.lock().push(sql.to_string());

        if sql == "SELECT CONNECTION_ID()" {
            return Ok(ResultSet::new(vec![vec![text(&connection_id.to_string())]]));
        }
        if sql.starts_with("SELECT CEIL(COUNT(*)") {
            return self.page_count(sql);
        }
        if sql.contains("FROM information_schema.columns") {
            return Ok(self.columns(sql));
        }
        if sql.contains("FROM information_schema.tables") {
            return Ok(self.table_names(sql));
        }
        self.select(sql)
    }

    fn lookup(&self, qualified: &str) -> Result<FakeTable> {
        let (schema, table) = qualified
            .split_once("`.`")
            .map(|(s, t)| (s.trim_matches('`'), t.trim_matches('`')))
            .ok_or_else(|| Error::query(format!("cannot parse table {}", qualified)))?;
        self.tables
            .lock()
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .ok_or_else(|| Error::query(format!("Table '{}.{}' doesn't exist (code 1146)", schema, table)))
    }

    fn page_count(&self, sql: &str) -> Result<ResultSet> {
        let delay = *self.count_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let page_size: u64 = sql
            .split("/ ")
            .nth(1)
            .and_then(|rest| rest.split(')').next())
            .and_then(|n| n.trim().parse().ok())
            .ok_or_else(|| Error::query("cannot parse page size"))?;
        let qualified = sql
            .split(" FROM ")
            .nth(1)
            .ok_or_else(|| Error::query("missing FROM"))?;
        let table = self.lookup(qualified)?;
        let pages = self
            .page_count_override
            .lock()
            .unwrap_or_else(|| (table.rows.len() as u64).div_ceil(page_size));
        Ok(ResultSet::new(vec![vec![text(&pages.to_string())]]))
    }

    fn columns(&self, sql: &str) -> ResultSet {
        let delay = *self.columns_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let schema = quoted_after(sql, "table_schema = '").unwrap_or_default();
        let table = quoted_after(sql, "table_name = '").unwrap_or_default();
        let tables = self.tables.lock();
        let Some(found) = tables.get(&(schema.to_string(), table.to_string())) else {
            return ResultSet::new(vec![]);
        };
        let opt = |v: Option<u64>| v.map(|v| text(&v.to_string())).unwrap_or(Value::NULL);
        ResultSet::new(
            found
                .columns
                .iter()
                .map(|c| {
                    let enum_values = if c.data_type == "enum" {
                        text(&c.column_type[4..])
                    } else {
                        Value::NULL
                    };
                    vec![
                        text(&c.name),
                        text(&c.data_type),
                        text(&c.column_type),
                        Value::NULL,
                        opt(c.precision),
                        opt(c.scale),
                        enum_values,
                    ]
                })
                .collect(),
        )
    }

    fn table_names(&self, sql: &str) -> ResultSet {
        let schema = quoted_after(sql, "table_schema = '").unwrap_or_default();
        let mut names: Vec<String> = self
            .tables
            .lock()
            .keys()
            .filter(|(s, _)| s == schema)
            .map(|(_, t)| t.clone())
            .collect();
        names.sort();
        ResultSet::new(names.iter().map(|n| vec![text(n)]).collect())
    }

    fn select(&self, sql: &str) -> Result<ResultSet> {
        let body = sql
            .strip_prefix("SELECT ")
            .ok_or_else(|| Error::query(format!("unexpected statement {}", sql)))?;
        let (projection, rest) = body
            .split_once(" FROM ")
            .ok_or_else(|| Error::query("missing FROM"))?;
        let qualified = rest.split(' ').next().unwrap_or_default();
        let table = self.lookup(qualified)?;

        let (limit, offset) = match rest.split_once(" LIMIT ") {
            Some((_, paging)) => {
                let (limit, offset) = paging.split_once(" OFFSET ").unwrap_or((paging, "0"));
                (
                    limit.trim().parse::<usize>().unwrap_or(usize::MAX),
                    offset.trim().parse::<usize>().unwrap_or(0),
                )
            }
            None => (usize::MAX, 0),
        };

        let selected: Vec<(Option<usize>, bool)> = projection
            .split(", ")
            .map(|item| {
                if item == "NULL" {
                    return (None, false);
                }
                let name = backticked(item).unwrap_or(item);
                let index = table.columns.iter().position(|c| c.name == name);
                (index, item.starts_with("CAST("))
            })
            .collect();

        let rows = table
            .rows
            .iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                selected
                    .iter()
                    .map(|(index, cast)| match index {
                        None => Value::NULL,
                        Some(i) => match (&row[*i], cast) {
                            (Value::Int(v), true) => text(&v.to_string()),
                            (value, _) => value.clone(),
                        },
                    })
                    .collect()
            })
            .collect();
        Ok(ResultSet::new(rows))
    }
}

pub struct FakeConnector {
    server: Arc<FakeMysql>,
}

impl Connector for FakeConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>> {
        let slow = self.server.slow_host.lock().clone();
        if let Some((host, delay)) = slow {
            if host == endpoint.host() {
                std::thread::sleep(delay);
            }
        }
        if take(&self.server.fail_connects) {
            return Err(Error::connection(format!("connection to {} refused", endpoint)));
        }
        self.server.connects.fetch_add(1, Ordering::SeqCst);
        let id = self.server.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(FakeConnection {
            server: Arc::clone(&self.server),
            id,
        }))
    }
}

struct FakeConnection {
    server: Arc<FakeMysql>,
    id: usize,
}

impl Connection for FakeConnection {
    fn query(&mut self, sql: &str) -> Result<ResultSet> {
        if take(&self.server.dropped_queries) {
            return Err(Error::connection("server has gone away"));
        }
        self.server.run(sql, self.id)
    }

    fn is_valid(&mut self) -> bool {
        !take(&self.server.invalid_validations)
    }

    fn close(self: Box<Self>) {
        self.server.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn registry(server: &Arc<FakeMysql>, config: ScannerConfig) -> ConnectionPoolRegistry {
    ConnectionPoolRegistry::new(server.connector(), config)
}

/// A materialized output cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Unset,
    Null,
    Int(i128),
    UInt(u64),
    Float(f64),
    Bytes(Vec<u8>),
}

impl Cell {
    pub fn text(s: &str) -> Self {
        Cell::Bytes(s.as_bytes().to_vec())
    }
}

/// Column-major [`OutputChunk`] kept in memory
pub struct MemoryChunk {
    capacity: usize,
    columns: Vec<Vec<Cell>>,
    len: usize,
}

impl MemoryChunk {
    pub fn new(columns: usize, capacity: usize) -> Self {
        Self {
            capacity,
            columns: vec![vec![Cell::Unset; capacity]; columns],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Rows of the current batch, row-major
    pub fn rows(&self) -> Vec<Vec<Cell>> {
        (0..self.len)
            .map(|row| self.columns.iter().map(|col| col[row].clone()).collect())
            .collect()
    }

    fn reset(&mut self) {
        for col in &mut self.columns {
            col.iter_mut().for_each(|cell| *cell = Cell::Unset);
        }
        self.len = 0;
    }
}

impl OutputChunk for MemoryChunk {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_null(&mut self, col: usize, row: usize) {
        self.columns[col][row] = Cell::Null;
    }

    fn write(&mut self, col: usize, row: usize, value: DuckValue<'_>) -> Result<()> {
        self.columns[col][row] = match value {
            DuckValue::TinyInt(v) => Cell::Int(v.into()),
            DuckValue::SmallInt(v) | DuckValue::Decimal16(v) => Cell::Int(v.into()),
            DuckValue::Integer(v) | DuckValue::Decimal32(v) | DuckValue::Date(v) => Cell::Int(v.into()),
            DuckValue::BigInt(v) | DuckValue::Decimal64(v) | DuckValue::Time(v) | DuckValue::Timestamp(v) => {
                Cell::Int(v.into())
            }
            DuckValue::Decimal128(v) => Cell::Int(v),
            DuckValue::UTinyInt(v) | DuckValue::EnumU8(v) => Cell::UInt(v.into()),
            DuckValue::USmallInt(v) | DuckValue::EnumU16(v) => Cell::UInt(v.into()),
            DuckValue::UInteger(v) | DuckValue::EnumU32(v) => Cell::UInt(v.into()),
            DuckValue::UBigInt(v) => Cell::UInt(v),
            DuckValue::Float(v) => Cell::Float(v.into()),
            DuckValue::Double(v) => Cell::Float(v),
            DuckValue::Varchar(b) | DuckValue::Blob(b) => Cell::Bytes(b.to_vec()),
        };
        Ok(())
    }

    fn set_len(&mut self, rows: usize) {
        self.len = rows;
    }
}

/// Drive one task to completion and collect every row it emits.
pub fn drain_task(
    bind_data: &MysqlBindData,
    global_state: &MysqlGlobalState,
    local_state: &mut MysqlLocalState,
    columns: usize,
    capacity: usize,
) -> Result<Vec<Vec<Cell>>> {
    let mut chunk = MemoryChunk::new(columns, capacity);
    let mut rows = Vec::new();
    loop {
        chunk.reset();
        let emitted = mysql_scan_read(bind_data, global_state, local_state, &mut chunk)?;
        if emitted == 0 {
            return Ok(rows);
        }
        assert_eq!(emitted, chunk.len());
        rows.extend(chunk.rows());
    }
}
