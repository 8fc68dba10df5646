//! Bounded, thread-safe pool of MySQL connections for one endpoint
//!
//! - `min_size` connections are opened eagerly, in parallel, when the pool is built
//! - idle connections are validated before being handed out again
//! - borrowed connections come back through the [`PooledConnection`] guard

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::ScannerConfig;
use crate::error::{Error, Result};
use crate::mysql::{Connection, Connector, Endpoint, ResultSet};

/// Sizing and retry settings of one pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Connections opened at construction
    pub min_size: usize,
    /// Upper bound on live connections
    pub max_size: usize,
    /// Attempts to open a connection on demand
    pub connect_retries: usize,
    /// Maximum time to wait for a connection at capacity
    pub acquire_timeout: Duration,
}

impl From<&ScannerConfig> for PoolOptions {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            min_size: config.min_pool_size,
            max_size: config.max_pool_size,
            connect_retries: config.connect_retries,
            acquire_timeout: config.acquire_timeout,
        }
    }
}

impl PoolOptions {
    /// Override the pool bounds
    pub fn with_sizes(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }
}

/// Pool statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections opened, including replacements
    pub connections_created: u64,
    /// Connections closed
    pub connections_closed: u64,
    /// Successful acquisitions
    pub acquisitions: u64,
    /// Times a caller had to wait because the pool was at capacity
    pub exhausted_count: u64,
    /// Idle connections that failed validation
    pub health_check_failures: u64,
    /// Queries resubmitted on a fresh connection
    pub reconnects: u64,
}

/// Pool counters updated without taking the pool lock
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct AtomicPoolStats {
    pub connections_created: AtomicU64,
    pub connections_closed: AtomicU64,
    pub acquisitions: AtomicU64,
    pub exhausted_count: AtomicU64,
    pub health_check_failures: AtomicU64,
    pub reconnects: AtomicU64,
}

impl AtomicPoolStats {
    fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_exhausted(&self) {
        self.exhausted_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_health_check_failure(&self) {
        self.health_check_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot current stats
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            exhausted_count: self.exhausted_count.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

struct PoolState {
    /// LIFO free set
    idle: Vec<Box<dyn Connection>>,
    /// Idle plus borrowed plus slots reserved for a connect in progress
    total: usize,
    closed: bool,
}

enum Slot {
    Reuse(Box<dyn Connection>),
    Create,
}

/// Connection pool for one [`Endpoint`]
pub struct ConnectionPool {
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    options: PoolOptions,
    state: Mutex<PoolState>,
    available: Condvar,
    stats: AtomicPoolStats,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Build a pool and open `min_size` connections, one thread per connection.
    ///
    /// A connection that fails to open is logged and left out; the pool grows
    /// on demand later.
    pub fn new(
        endpoint: Endpoint,
        connector: Arc<dyn Connector>,
        options: PoolOptions,
    ) -> Result<Arc<Self>> {
        if options.max_size == 0 || options.min_size > options.max_size {
            return Err(Error::config(format!(
                "invalid pool bounds min={} max={}",
                options.min_size, options.max_size
            )));
        }

        let opened: Vec<Box<dyn Connection>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..options.min_size)
                .map(|_| scope.spawn(|| connector.connect(&endpoint)))
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| match handle.join() {
                    Ok(Ok(conn)) => Some(conn),
                    Ok(Err(e)) => {
                        tracing::warn!(%endpoint, error = %e, "failed to open pooled connection");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(%endpoint, "connection thread panicked");
                        None
                    }
                })
                .collect()
        });

        let stats = AtomicPoolStats::default();
        for _ in &opened {
            stats.record_created();
        }
        tracing::debug!(%endpoint, opened = opened.len(), min = options.min_size, "connection pool ready");

        Ok(Arc::new(Self {
            state: Mutex::new(PoolState {
                total: opened.len(),
                idle: opened,
                closed: false,
            }),
            available: Condvar::new(),
            stats,
            endpoint,
            connector,
            options,
        }))
    }

    /// Endpoint served by this pool
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Borrow a validated connection.
    ///
    /// Reuses an idle connection after a liveness check, otherwise opens a new
    /// one while under `max_size`, otherwise waits up to `acquire_timeout`.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let deadline = Instant::now() + self.options.acquire_timeout;

        let slot = {
            let mut state = self.state.lock();
            let mut waited = false;
            loop {
                if state.closed {
                    return Err(Error::PoolClosed {
                        endpoint: self.endpoint.to_string(),
                    });
                }
                if let Some(conn) = state.idle.pop() {
                    break Slot::Reuse(conn);
                }
                if state.total < self.options.max_size {
                    state.total += 1;
                    break Slot::Create;
                }
                if !waited {
                    self.stats.record_exhausted();
                    waited = true;
                }
                if self.available.wait_until(&mut state, deadline).timed_out()
                    && state.idle.is_empty()
                    && state.total >= self.options.max_size
                {
                    return Err(Error::config(format!(
                        "no connection to {} available within {:?}",
                        self.endpoint, self.options.acquire_timeout
                    )));
                }
            }
        };

        let conn = match slot {
            Slot::Reuse(mut conn) => {
                if conn.is_valid() {
                    conn
                } else {
                    tracing::warn!(endpoint = %self.endpoint, "discarding invalid pooled connection");
                    self.stats.record_health_check_failure();
                    self.stats.record_closed();
                    conn.close();
                    self.open_in_reserved_slot()?
                }
            }
            Slot::Create => self.open_in_reserved_slot()?,
        };

        self.stats.record_acquisition();
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
        })
    }

    /// Open a connection for a slot already counted in `total`; the slot is
    /// given back if every attempt fails.
    fn open_in_reserved_slot(&self) -> Result<Box<dyn Connection>> {
        match self.connect_with_retries() {
            Ok(conn) => Ok(conn),
            Err(e) => {
                self.forget_slot();
                Err(e)
            }
        }
    }

    fn connect_with_retries(&self) -> Result<Box<dyn Connection>> {
        let attempts = self.options.connect_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.connector.connect(&self.endpoint) {
                Ok(conn) => {
                    self.stats.record_created();
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::warn!(endpoint = %self.endpoint, attempt, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(Error::config(format!(
            "could not open a connection to {} after {} attempts: {}",
            self.endpoint,
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn forget_slot(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }

    fn release(&self, conn: Box<dyn Connection>) {
        let mut state = self.state.lock();
        if state.closed {
            state.total = state.total.saturating_sub(1);
            drop(state);
            self.stats.record_closed();
            conn.close();
            return;
        }
        state.idle.push(conn);
        drop(state);
        self.available.notify_one();
    }

    fn discard(&self, conn: Box<dyn Connection>) {
        self.stats.record_closed();
        conn.close();
        self.forget_slot();
    }

    /// Close every idle connection and refuse further acquisitions.
    ///
    /// Borrowed connections are closed as they come back. Calling it twice is harmless.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            tracing::debug!(endpoint = %self.endpoint, "closing connection pool");
        }
        state.closed = true;
        let drained = state.idle.len();
        for conn in state.idle.drain(..) {
            conn.close();
            self.stats.record_closed();
        }
        state.total -= drained;
        drop(state);
        self.available.notify_all();
    }

    /// Whether [`ConnectionPool::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Live connections, idle or borrowed
    pub fn size(&self) -> usize {
        self.state.lock().total
    }

    /// Upper bound on live connections
    pub fn max_size(&self) -> usize {
        self.options.max_size
    }

    /// Connections in the free set
    pub fn idle(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Connections currently borrowed
    pub fn in_use(&self) -> usize {
        let state = self.state.lock();
        state.total - state.idle.len()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close();
    }
}

/// A connection borrowed from a [`ConnectionPool`].
///
/// Goes back to the free set when dropped, exactly once.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<ConnectionPool>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("endpoint", self.pool.endpoint())
            .finish()
    }
}

impl PooledConnection {
    fn connection(&mut self) -> Result<&mut Box<dyn Connection>> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::internal("pooled connection already returned"))
    }

    /// Run a statement; a dropped connection is replaced and the statement
    /// resubmitted once.
    pub fn query(&mut self, sql: &str) -> Result<ResultSet> {
        tracing::debug!(sql, "executing MySQL query");
        match self.connection()?.query(sql) {
            Err(e) if e.is_retriable() => {
                tracing::warn!(endpoint = %self.pool.endpoint(), error = %e, "connection lost, reconnecting and resubmitting");
                let fresh = self.pool.connector.connect(&self.pool.endpoint)?;
                self.pool.stats.record_created();
                self.pool.stats.record_reconnect();
                if let Some(old) = self.conn.replace(fresh) {
                    self.pool.stats.record_closed();
                    old.close();
                }
                self.connection()?.query(sql)
            }
            other => other,
        }
    }

    /// Close the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(conn);
        }
    }

    /// Pool this connection belongs to
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
