use crate::error::Result;

/// One decoded cell, in DuckDB's physical representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DuckValue<'a> {
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    UTinyInt(u8),
    USmallInt(u16),
    UInteger(u32),
    UBigInt(u64),
    Float(f32),
    Double(f64),
    Decimal16(i16),
    Decimal32(i32),
    Decimal64(i64),
    Decimal128(i128),
    Varchar(&'a [u8]),
    Blob(&'a [u8]),
    EnumU8(u8),
    EnumU16(u16),
    EnumU32(u32),
    /// Days since 1970-01-01
    Date(i32),
    /// Microseconds since midnight
    Time(i64),
    /// Microseconds since the Unix epoch
    Timestamp(i64),
}

/// Column-major output batch the scan writes into.
pub trait OutputChunk {
    /// Maximum rows in one batch
    fn capacity(&self) -> usize;

    /// Clear the validity bit of a cell
    fn set_null(&mut self, col: usize, row: usize);

    fn write(&mut self, col: usize, row: usize, value: DuckValue<'_>) -> Result<()>;

    /// Number of rows produced in this batch
    fn set_len(&mut self, rows: usize);
}
