//! DuckDB table functions
//!
//! Thin `VTab` adapters: arguments are read from DuckDB, the work is done by
//! the host-independent scan and attach code, and cells are written through
//! [`DuckdbChunk`].

use std::error::Error;
use std::ffi::{c_char, CString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use duckdb::core::{DataChunkHandle, Inserter, LogicalTypeHandle, LogicalTypeId};
use duckdb::ffi;
use duckdb::vtab::{BindInfo, InitInfo, TableFunctionInfo, VTab};
use duckdb::Connection;
use parking_lot::Mutex;

use crate::config::STANDARD_VECTOR_SIZE;
use crate::function::mysql_attach::{mysql_attach, ViewCatalog};
use crate::function::mysql_scan::mysql_scan_bind::{mysql_scan_bind, ScanParameters};
use crate::function::mysql_scan::mysql_scan_local_init::ScanRequest;
use crate::function::mysql_scan::mysql_scan_scheduler::MysqlScanScheduler;
use crate::model::attach_function_data::AttachFunctionData;
use crate::model::duckdb_type::DuckdbType;
use crate::model::extension_global_state::ExtensionState;
use crate::model::mysql_bind_data::MysqlBindData;
use crate::model::output_chunk::{DuckValue, OutputChunk};

/// Extra info of `mysql_attach`: it also needs a connection to create views with
#[derive(Clone)]
pub struct AttachContext {
    pub state: Arc<ExtensionState>,
    pub connection: Arc<Mutex<Connection>>,
}

impl ViewCatalog for Connection {
    fn execute(&mut self, sql: &str) -> crate::error::Result<()> {
        self.execute_batch(sql)
            .map_err(|e| crate::error::Error::query(e.to_string()).with_sql(sql))
    }
}

/// [`OutputChunk`] over a DuckDB data chunk
struct DuckdbChunk<'a> {
    chunk: &'a mut DataChunkHandle,
}

impl OutputChunk for DuckdbChunk<'_> {
    fn capacity(&self) -> usize {
        STANDARD_VECTOR_SIZE
    }

    fn set_null(&mut self, col: usize, row: usize) {
        self.chunk.flat_vector(col).set_null(row);
    }

    fn write(&mut self, col: usize, row: usize, value: DuckValue<'_>) -> crate::error::Result<()> {
        let mut vector = self.chunk.flat_vector(col);
        // SAFETY: each `DuckValue` variant matches the physical storage of the column type it is bound to
        unsafe { match value {
            DuckValue::TinyInt(v) => vector.as_mut_slice::<i8>()[row] = v,
            DuckValue::SmallInt(v) | DuckValue::Decimal16(v) => vector.as_mut_slice::<i16>()[row] = v,
            DuckValue::Integer(v) | DuckValue::Decimal32(v) | DuckValue::Date(v) => {
                vector.as_mut_slice::<i32>()[row] = v
            }
            DuckValue::BigInt(v)
            | DuckValue::Decimal64(v)
            | DuckValue::Time(v)
            | DuckValue::Timestamp(v) => vector.as_mut_slice::<i64>()[row] = v,
            DuckValue::UTinyInt(v) | DuckValue::EnumU8(v) => vector.as_mut_slice::<u8>()[row] = v,
            DuckValue::USmallInt(v) | DuckValue::EnumU16(v) => vector.as_mut_slice::<u16>()[row] = v,
            DuckValue::UInteger(v) | DuckValue::EnumU32(v) => vector.as_mut_slice::<u32>()[row] = v,
            DuckValue::UBigInt(v) => vector.as_mut_slice::<u64>()[row] = v,
            DuckValue::Float(v) => vector.as_mut_slice::<f32>()[row] = v,
            DuckValue::Double(v) => vector.as_mut_slice::<f64>()[row] = v,
            DuckValue::Decimal128(v) => {
                vector.as_mut_slice::<ffi::duckdb_hugeint>()[row] = ffi::duckdb_hugeint {
                    lower: v as u64,
                    upper: (v >> 64) as i64,
                }
            }
            DuckValue::Varchar(bytes) | DuckValue::Blob(bytes) => vector.insert(row, bytes),
        } }
        Ok(())
    }

    fn set_len(&mut self, rows: usize) {
        self.chunk.set_len(rows);
    }
}

fn enum_type(levels: &[String]) -> anyhow::Result<LogicalTypeHandle> {
    let names = levels
        .iter()
        .map(|level| CString::new(level.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .context("ENUM literal contains a NUL byte")?;
    let mut pointers: Vec<*const c_char> = names.iter().map(|name| name.as_ptr()).collect();
    // SAFETY: `pointers` refers into `names`, which outlives the call; DuckDB copies the literals
    let handle = unsafe { ffi::duckdb_create_enum_type(pointers.as_mut_ptr(), pointers.len() as ffi::idx_t) };
    Ok(LogicalTypeHandle::from(handle))
}

/// DuckDB logical type of a scan column
pub fn logical_type(duckdb_type: &DuckdbType) -> anyhow::Result<LogicalTypeHandle> {
    let id = match duckdb_type {
        DuckdbType::Decimal { width, scale } => return Ok(LogicalTypeHandle::decimal(*width, *scale)),
        DuckdbType::Enum(levels) => return enum_type(levels),
        DuckdbType::TinyInt => LogicalTypeId::Tinyint,
        DuckdbType::SmallInt => LogicalTypeId::Smallint,
        DuckdbType::Integer => LogicalTypeId::Integer,
        DuckdbType::BigInt => LogicalTypeId::Bigint,
        DuckdbType::UTinyInt => LogicalTypeId::UTinyint,
        DuckdbType::USmallInt => LogicalTypeId::USmallint,
        DuckdbType::UInteger => LogicalTypeId::UInteger,
        DuckdbType::UBigInt => LogicalTypeId::UBigint,
        DuckdbType::Float => LogicalTypeId::Float,
        DuckdbType::Double => LogicalTypeId::Double,
        DuckdbType::Varchar => LogicalTypeId::Varchar,
        DuckdbType::Blob => LogicalTypeId::Blob,
        DuckdbType::Date => LogicalTypeId::Date,
        DuckdbType::Time => LogicalTypeId::Time,
        DuckdbType::Timestamp => LogicalTypeId::Timestamp,
    };
    Ok(LogicalTypeHandle::from(id))
}

fn varchar_parameters(count: usize) -> Option<Vec<LogicalTypeHandle>> {
    Some((0..count).map(|_| LogicalTypeHandle::from(LogicalTypeId::Varchar)).collect())
}

fn varchar_parameter(bind: &BindInfo, index: u64) -> String {
    bind.get_parameter(index).to_string()
}

fn bool_named_parameter(bind: &BindInfo, name: &str, default: bool) -> anyhow::Result<bool> {
    let Some(value) = bind.get_named_parameter(name) else {
        return Ok(default);
    };
    match value.to_string().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        other => Err(anyhow!("invalid value {:?} for {}", other, name)),
    }
}

fn varchar_named_parameter(bind: &BindInfo, name: &str, default: &str) -> String {
    bind.get_named_parameter(name)
        .map(|value| value.to_string())
        .unwrap_or_else(|| default.to_string())
}

fn extension_state(bind: &BindInfo) -> Arc<ExtensionState> {
    // SAFETY: the scan and close functions are registered with an Arc<ExtensionState>
    unsafe { Arc::clone(&*bind.get_extra_info::<Arc<ExtensionState>>()) }
}

fn scan_bind(bind: &BindInfo) -> anyhow::Result<MysqlBindData> {
    let state = extension_state(bind);
    let params = ScanParameters {
        host: varchar_parameter(bind, 0),
        username: varchar_parameter(bind, 1),
        password: varchar_parameter(bind, 2),
        schema: varchar_parameter(bind, 3),
        table: varchar_parameter(bind, 4),
    };
    let bind_data = mysql_scan_bind(state.registry(), &params)
        .with_context(|| format!("failed to bind MySQL table {}.{}", params.schema, params.table))?;
    for column in &bind_data.columns {
        bind.add_result_column(&column.column_name, logical_type(&column.duckdb_type)?);
    }
    Ok(bind_data)
}

/// The C table-function API hands over the projection only. Filters DuckDB
/// would push down never reach the scan, so both scan functions request every
/// row and DuckDB applies the filters itself. The WHERE translation is used
/// through [`ScanRequest::with_filters`].
fn scan_init(init: &InitInfo) -> anyhow::Result<MysqlScanScheduler> {
    // SAFETY: DuckDB hands back the bind data produced by `scan_bind`
    let bind_data = unsafe { &*init.get_bind_data::<MysqlBindData>() };
    let scheduler = MysqlScanScheduler::new(bind_data, ScanRequest::new(init.get_column_indices()));
    init.set_max_threads(scheduler.max_threads());
    Ok(scheduler)
}

fn scan_func(
    bind_data: &MysqlBindData,
    scheduler: &MysqlScanScheduler,
    output: &mut DataChunkHandle,
) -> anyhow::Result<()> {
    let mut chunk = DuckdbChunk { chunk: output };
    scheduler
        .next_chunk(bind_data, &mut chunk)
        .with_context(|| format!("failed to scan MySQL table {}", bind_data))?;
    Ok(())
}

/// Both scan functions share bind, init and read; they differ only in name.
macro_rules! scan_vtab {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name;

        impl VTab for $name {
            type InitData = MysqlScanScheduler;
            type BindData = MysqlBindData;

            fn bind(bind: &BindInfo) -> Result<Self::BindData, Box<dyn Error>> {
                Ok(scan_bind(bind)?)
            }

            fn init(init: &InitInfo) -> Result<Self::InitData, Box<dyn Error>> {
                Ok(scan_init(init)?)
            }

            fn func(func: &TableFunctionInfo<Self>, output: &mut DataChunkHandle) -> Result<(), Box<dyn Error>> {
                Ok(scan_func(func.get_bind_data(), func.get_init_data(), output)?)
            }

            fn supports_pushdown() -> bool {
                true
            }

            fn parameters() -> Option<Vec<LogicalTypeHandle>> {
                varchar_parameters(5)
            }
        }
    };
}

scan_vtab!(
    /// `mysql_scan(host, user, password, schema, table)`
    MysqlScanVTab
);

scan_vtab!(
    /// `mysql_scan_pushdown(host, user, password, schema, table)`
    ///
    /// Registered under its own name for views made by `mysql_attach`. Until
    /// the host passes filters it reads the same rows as `mysql_scan`.
    MysqlScanPushdownVTab
);

pub struct AttachBindData {
    data: AttachFunctionData,
    context: AttachContext,
}

pub struct RunOnceInitData {
    finished: AtomicBool,
}

impl RunOnceInitData {
    fn new() -> Self {
        Self {
            finished: AtomicBool::new(false),
        }
    }
}

/// `mysql_attach(host, user, password, overwrite, filter_pushdown, source_schema, sink_schema)`
pub struct MysqlAttachVTab;

impl VTab for MysqlAttachVTab {
    type InitData = RunOnceInitData;
    type BindData = AttachBindData;

    fn bind(bind: &BindInfo) -> Result<Self::BindData, Box<dyn Error>> {
        // SAFETY: mysql_attach is registered with an AttachContext
        let context = unsafe { (*bind.get_extra_info::<AttachContext>()).clone() };
        let mut data = AttachFunctionData::new(
            &varchar_parameter(bind, 0),
            &varchar_parameter(bind, 1),
            &varchar_parameter(bind, 2),
        );
        data.overwrite = bool_named_parameter(bind, "overwrite", data.overwrite)?;
        data.filter_pushdown = bool_named_parameter(bind, "filter_pushdown", data.filter_pushdown)?;
        data.source_schema = varchar_named_parameter(bind, "source_schema", &data.source_schema);
        data.sink_schema = varchar_named_parameter(bind, "sink_schema", &data.sink_schema);

        bind.add_result_column("Success", LogicalTypeHandle::from(LogicalTypeId::Boolean));
        Ok(AttachBindData { data, context })
    }

    fn init(_: &InitInfo) -> Result<Self::InitData, Box<dyn Error>> {
        Ok(RunOnceInitData::new())
    }

    fn func(func: &TableFunctionInfo<Self>, output: &mut DataChunkHandle) -> Result<(), Box<dyn Error>> {
        let init_data = func.get_init_data();
        if init_data.finished.swap(true, Ordering::Relaxed) {
            output.set_len(0);
            return Ok(());
        }

        let bind_data = func.get_bind_data();
        let mut connection = bind_data.context.connection.lock();
        mysql_attach(bind_data.context.state.registry(), &bind_data.data, &mut *connection)
            .with_context(|| format!("failed to attach MySQL schema {}", bind_data.data.source_schema))?;

        // SAFETY: column 0 is BOOLEAN
        unsafe { output.flat_vector(0).as_mut_slice::<bool>()[0] = true };
        output.set_len(1);
        Ok(())
    }

    fn parameters() -> Option<Vec<LogicalTypeHandle>> {
        varchar_parameters(3)
    }

    fn named_parameters() -> Option<Vec<(String, LogicalTypeHandle)>> {
        Some(vec![
            ("overwrite".to_string(), LogicalTypeHandle::from(LogicalTypeId::Boolean)),
            ("filter_pushdown".to_string(), LogicalTypeHandle::from(LogicalTypeId::Boolean)),
            ("source_schema".to_string(), LogicalTypeHandle::from(LogicalTypeId::Varchar)),
            ("sink_schema".to_string(), LogicalTypeHandle::from(LogicalTypeId::Varchar)),
        ])
    }
}

pub struct CloseBindData {
    state: Arc<ExtensionState>,
    host: String,
    username: String,
    password: String,
}

/// `mysql_close(host, user, password)`: drop the pool of one endpoint
pub struct MysqlCloseVTab;

impl VTab for MysqlCloseVTab {
    type InitData = RunOnceInitData;
    type BindData = CloseBindData;

    fn bind(bind: &BindInfo) -> Result<Self::BindData, Box<dyn Error>> {
        bind.add_result_column("closed", LogicalTypeHandle::from(LogicalTypeId::Boolean));
        Ok(CloseBindData {
            state: extension_state(bind),
            host: varchar_parameter(bind, 0),
            username: varchar_parameter(bind, 1),
            password: varchar_parameter(bind, 2),
        })
    }

    fn init(_: &InitInfo) -> Result<Self::InitData, Box<dyn Error>> {
        Ok(RunOnceInitData::new())
    }

    fn func(func: &TableFunctionInfo<Self>, output: &mut DataChunkHandle) -> Result<(), Box<dyn Error>> {
        let init_data = func.get_init_data();
        if init_data.finished.swap(true, Ordering::Relaxed) {
            output.set_len(0);
            return Ok(());
        }

        let bind_data = func.get_bind_data();
        let closed = bind_data
            .state
            .registry()
            .close(&bind_data.host, &bind_data.username, &bind_data.password)?;

        // SAFETY: column 0 is BOOLEAN
        unsafe { output.flat_vector(0).as_mut_slice::<bool>()[0] = closed };
        output.set_len(1);
        Ok(())
    }

    fn parameters() -> Option<Vec<LogicalTypeHandle>> {
        varchar_parameters(3)
    }
}
