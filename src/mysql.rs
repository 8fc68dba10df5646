//! MySQL connectivity
//!
//! The pool and the scan code only talk to MySQL through the [`Connector`] and
//! [`Connection`] traits. [`MysqlConnector`] is the production implementation on
//! top of the blocking `mysql` client; tests plug in an in-memory one.
//!
//! Results are fully buffered per statement. The scanner pages its queries, so
//! one statement never returns more than one output chunk worth of rows.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use mysql::prelude::Queryable;
use mysql::{OptsBuilder, Value};

use crate::error::{Error, Result};

/// Default MySQL server port
pub const DEFAULT_PORT: u16 = 3306;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One MySQL endpoint: the (host, username, password) triple pools are keyed by.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl Endpoint {
    /// Build an endpoint from the user-supplied host string.
    ///
    /// `host` may be `name`, `name:port` or carry a `tcp://` / `mysql://` prefix.
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self> {
        let trimmed = host
            .trim()
            .trim_start_matches("tcp://")
            .trim_start_matches("mysql://")
            .trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::config("MySQL host must not be empty"));
        }

        let (name, port) = match trimmed.rsplit_once(':') {
            Some((name, port)) if !name.is_empty() && !name.ends_with(':') => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::config(format!("invalid MySQL port in host {:?}", host)))?;
                (name, port)
            }
            _ => (trimmed, DEFAULT_PORT),
        };

        Ok(Self {
            host: name.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Host name or address, without port
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Login user
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Login password
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A live connection to MySQL
pub trait Connection: Send {
    /// Run a statement and buffer its rows.
    fn query(&mut self, sql: &str) -> Result<ResultSet>;

    /// Cheap liveness check used when a pooled connection is reused.
    fn is_valid(&mut self) -> bool;

    /// Terminate the session.
    fn close(self: Box<Self>);
}

/// Opens connections to an endpoint
pub trait Connector: Send + Sync {
    /// Open a new connection
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>>;
}

/// A buffered MySQL result with a JDBC-style cursor.
///
/// The cursor starts before the first row; [`ResultSet::next`] positions it.
/// Column indexes are 1-based.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    rows: Vec<Vec<Value>>,
    cursor: Option<usize>,
}

impl ResultSet {
    /// Wrap fetched rows
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self { rows, cursor: None }
    }

    /// Number of buffered rows
    pub fn rows_count(&self) -> usize {
        self.rows.len()
    }

    /// Advance to the next row; false once the rows are exhausted.
    pub fn next(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next < self.rows.len() {
            self.cursor = Some(next);
            true
        } else {
            self.cursor = Some(self.rows.len());
            false
        }
    }

    fn value(&self, col: usize) -> Result<&Value> {
        let row = self
            .cursor
            .and_then(|c| self.rows.get(c))
            .ok_or_else(|| Error::internal("result cursor is not positioned on a row"))?;
        col.checked_sub(1)
            .and_then(|i| row.get(i))
            .ok_or_else(|| Error::internal(format!("result column {} out of range", col)))
    }

    /// Whether the value in column `col` is SQL NULL
    pub fn is_null(&self, col: usize) -> Result<bool> {
        Ok(matches!(self.value(col)?, Value::NULL))
    }

    /// Read column `col` as a signed integer
    pub fn get_i64(&self, col: usize) -> Result<i64> {
        match self.value(col)? {
            Value::Int(v) => Ok(*v),
            Value::UInt(v) => i64::try_from(*v).map_err(|_| conversion(col, "BIGINT")),
            Value::Bytes(b) => parse_text(b, col, "BIGINT"),
            _ => Err(conversion(col, "BIGINT")),
        }
    }

    /// Read column `col` as an unsigned integer
    pub fn get_u64(&self, col: usize) -> Result<u64> {
        match self.value(col)? {
            Value::UInt(v) => Ok(*v),
            Value::Int(v) => u64::try_from(*v).map_err(|_| conversion(col, "UBIGINT")),
            Value::Bytes(b) => parse_text(b, col, "UBIGINT"),
            _ => Err(conversion(col, "UBIGINT")),
        }
    }

    /// Read column `col` as a double
    pub fn get_f64(&self, col: usize) -> Result<f64> {
        match self.value(col)? {
            Value::Double(v) => Ok(*v),
            Value::Float(v) => Ok(f64::from(*v)),
            Value::Int(v) => Ok(*v as f64),
            Value::UInt(v) => Ok(*v as f64),
            Value::Bytes(b) => parse_text(b, col, "DOUBLE"),
            _ => Err(conversion(col, "DOUBLE")),
        }
    }

    /// Read column `col` as a single-precision float without going through f64.
    pub fn get_f32(&self, col: usize) -> Result<f32> {
        match self.value(col)? {
            Value::Float(v) => Ok(*v),
            Value::Bytes(b) => parse_text(b, col, "FLOAT"),
            Value::Double(v) => Ok(*v as f32),
            _ => Err(conversion(col, "FLOAT")),
        }
    }

    /// Raw payload of column `col`; numbers are rendered as text.
    pub fn get_bytes(&self, col: usize) -> Result<Cow<'_, [u8]>> {
        Ok(match self.value(col)? {
            Value::Bytes(b) => Cow::Borrowed(b.as_slice()),
            other => Cow::Owned(render(other).into_bytes()),
        })
    }

    /// Column `col` as UTF-8 text
    pub fn get_string(&self, col: usize) -> Result<Cow<'_, str>> {
        match self.value(col)? {
            Value::Bytes(b) => std::str::from_utf8(b)
                .map(Cow::Borrowed)
                .map_err(|_| conversion(col, "VARCHAR")),
            other => Ok(Cow::Owned(render(other))),
        }
    }
}

fn parse_text<T: std::str::FromStr>(bytes: &[u8], col: usize, target: &str) -> Result<T> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .ok_or_else(|| conversion(col, target))
}

fn conversion(col: usize, target: &str) -> Error {
    Error::internal(format!("cannot read result column {} as {}", col, target))
}

fn render(value: &Value) -> String {
    match value {
        Value::NULL => String::new(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Date(y, mo, d, h, mi, s, us) => {
            format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}", y, mo, d, h, mi, s, us)
        }
        Value::Time(neg, days, h, mi, s, us) => {
            let hours = u32::from(*h) + days * 24;
            let sign = if *neg { "-" } else { "" };
            format!("{}{:02}:{:02}:{:02}.{:06}", sign, hours, mi, s, us)
        }
    }
}

/// [`Connector`] backed by the blocking `mysql` client
#[derive(Debug, Clone)]
pub struct MysqlConnector {
    connect_timeout: Duration,
}

impl Default for MysqlConnector {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl MysqlConnector {
    /// Create a connector with the default connect timeout
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for MysqlConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(endpoint.host()))
            .tcp_port(endpoint.port())
            .user(Some(endpoint.username()))
            .pass(Some(endpoint.password()))
            .tcp_connect_timeout(Some(self.connect_timeout));

        let conn = mysql::Conn::new(opts).map_err(|e| {
            Error::connection_with_source(format!("could not connect to {}", endpoint), e)
        })?;
        tracing::debug!(%endpoint, "opened MySQL connection");
        Ok(Box::new(MysqlConnection { conn }))
    }
}

struct MysqlConnection {
    conn: mysql::Conn,
}

impl Connection for MysqlConnection {
    fn query(&mut self, sql: &str) -> Result<ResultSet> {
        let rows: Vec<mysql::Row> = self
            .conn
            .query(sql)
            .map_err(|e| Error::from(e).with_sql(sql))?;
        Ok(ResultSet::new(rows.into_iter().map(mysql::Row::unwrap).collect()))
    }

    fn is_valid(&mut self) -> bool {
        self.conn.query_drop("SELECT 1").is_ok()
    }

    fn close(self: Box<Self>) {
        // COM_QUIT is sent when the client handle drops
        drop(self.conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parsing() {
        let e = Endpoint::new("db.local", "u", "p").unwrap();
        assert_eq!(e.host(), "db.local");
        assert_eq!(e.port(), DEFAULT_PORT);

        let e = Endpoint::new("tcp://127.0.0.1:3307", "u", "p").unwrap();
        assert_eq!(e.host(), "127.0.0.1");
        assert_eq!(e.port(), 3307);

        assert!(Endpoint::new("db:notaport", "u", "p").is_err());
        assert!(Endpoint::new("  ", "u", "p").is_err());
    }

    #[test]
    fn test_endpoint_never_shows_password() {
        let e = Endpoint::new("h", "reader", "s3cret").unwrap();
        assert_eq!(e.to_string(), "reader@h:3306");
        assert!(!format!("{:?}", e).contains("s3cret"));
    }

    #[test]
    fn test_result_set_cursor() {
        let mut rs = ResultSet::new(vec![
            vec![Value::Bytes(b"42".to_vec()), Value::NULL],
            vec![Value::Int(-7), Value::Bytes(b"x".to_vec())],
        ]);
        assert_eq!(rs.rows_count(), 2);
        assert!(rs.is_null(1).is_err());

        assert!(rs.next());
        assert_eq!(rs.get_i64(1).unwrap(), 42);
        assert!(rs.is_null(2).unwrap());

        assert!(rs.next());
        assert_eq!(rs.get_i64(1).unwrap(), -7);
        assert!(rs.get_u64(1).is_err());
        assert_eq!(rs.get_string(2).unwrap(), "x");
        assert!(rs.get_string(3).is_err());

        assert!(!rs.next());
        assert!(!rs.next());
    }

    #[test]
    fn test_float_reads_do_not_round_through_double() {
        let mut rs = ResultSet::new(vec![vec![Value::Bytes(b"0.1".to_vec())]]);
        assert!(rs.next());
        assert_eq!(rs.get_f32(1).unwrap().to_bits(), 0.1_f32.to_bits());
        assert_eq!(rs.get_f64(1).unwrap().to_bits(), 0.1_f64.to_bits());
    }
}
