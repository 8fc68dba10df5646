use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::model::duckdb_type::{DecimalStorage, DuckdbType, EnumStorage};
use crate::model::mysql_bind_data::MysqlColumnInfo;
use crate::model::output_chunk::{DuckValue, OutputChunk};
use crate::mysql::ResultSet;

fn integer<T: TryFrom<i64>>(value: i64, target: &str) -> Result<T> {
    T::try_from(value).map_err(|_| Error::internal(format!("value {} does not fit {}", value, target)))
}

fn unsigned<T: TryFrom<u64>>(value: u64, target: &str) -> Result<T> {
    T::try_from(value).map_err(|_| Error::internal(format!("value {} does not fit {}", value, target)))
}

fn decode_decimal(text: &str, width: u8, scale: u8) -> Result<DuckValue<'static>> {
    let mut value = Decimal::from_str(text.trim())
        .map_err(|e| Error::internal(format!("cannot decode DECIMAL value {:?}: {}", text, e)))?;
    value.rescale(u32::from(scale));
    let scaled = value.mantissa();
    let target = "DECIMAL";
    Ok(match DecimalStorage::for_width(width) {
        DecimalStorage::Int16 => DuckValue::Decimal16(i16::try_from(scaled).map_err(|_| overflow(text, target))?),
        DecimalStorage::Int32 => DuckValue::Decimal32(i32::try_from(scaled).map_err(|_| overflow(text, target))?),
        DecimalStorage::Int64 => DuckValue::Decimal64(i64::try_from(scaled).map_err(|_| overflow(text, target))?),
        DecimalStorage::Int128 => DuckValue::Decimal128(scaled),
    })
}

fn overflow(text: &str, target: &str) -> Error {
    Error::internal(format!("value {} does not fit {}", text, target))
}

fn is_zero_date(text: &str) -> bool {
    text.starts_with("0000-00-00")
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Days since 1970-01-01 of a `YYYY-MM-DD` value; `None` for MySQL's zero date.
pub fn decode_date(text: &str) -> Result<Option<i32>> {
    if is_zero_date(text) {
        return Ok(None);
    }
    let date = text
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| Error::internal(format!("cannot decode DATE value {:?}", text)))?;
    let days = date.signed_duration_since(unix_epoch()).num_days();
    Ok(Some(integer(days, "DATE")?))
}

/// Microseconds since midnight of a `HH:MM:SS[.ffffff]` value
pub fn decode_time(text: &str) -> Result<i64> {
    let time = NaiveTime::parse_from_str(text.trim(), "%H:%M:%S%.f")
        .map_err(|_| Error::internal(format!("cannot decode TIME value {:?}", text)))?;
    Ok(i64::from(time.num_seconds_from_midnight()) * 1_000_000 + i64::from(time.nanosecond() / 1_000))
}

/// Microseconds since the Unix epoch of a `YYYY-MM-DD HH:MM:SS[.ffffff]` value;
/// `None` for MySQL's zero date.
pub fn decode_timestamp(text: &str) -> Result<Option<i64>> {
    if is_zero_date(text) {
        return Ok(None);
    }
    let timestamp = NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|_| Error::internal(format!("cannot decode TIMESTAMP value {:?}", text)))?;
    Ok(Some(timestamp.and_utc().timestamp_micros()))
}

/**
Decode one cell of the current result row into the output chunk.

`query_col_idx` is the 0-based position in the SELECT list; the result set
is read 1-based. The cursor must already be positioned on a row.
 */
pub fn process_value(
    result: &ResultSet,
    column: &MysqlColumnInfo,
    query_col_idx: usize,
    output: &mut dyn OutputChunk,
    out_col: usize,
    row: usize,
) -> Result<()> {
    let col_idx = query_col_idx + 1;
    if result.is_null(col_idx)? {
        output.set_null(out_col, row);
        return Ok(());
    }

    let value = match &column.duckdb_type {
        DuckdbType::TinyInt => DuckValue::TinyInt(integer(result.get_i64(col_idx)?, "TINYINT")?),
        DuckdbType::SmallInt => DuckValue::SmallInt(integer(result.get_i64(col_idx)?, "SMALLINT")?),
        DuckdbType::Integer => DuckValue::Integer(integer(result.get_i64(col_idx)?, "INTEGER")?),
        DuckdbType::BigInt => DuckValue::BigInt(result.get_i64(col_idx)?),
        DuckdbType::UTinyInt => DuckValue::UTinyInt(unsigned(result.get_u64(col_idx)?, "UTINYINT")?),
        DuckdbType::USmallInt => DuckValue::USmallInt(unsigned(result.get_u64(col_idx)?, "USMALLINT")?),
        DuckdbType::UInteger => DuckValue::UInteger(unsigned(result.get_u64(col_idx)?, "UINTEGER")?),
        DuckdbType::UBigInt => DuckValue::UBigInt(result.get_u64(col_idx)?),
        DuckdbType::Float => DuckValue::Float(result.get_f32(col_idx)?),
        DuckdbType::Double => DuckValue::Double(result.get_f64(col_idx)?),
        DuckdbType::Decimal { width, scale } => {
            decode_decimal(&result.get_string(col_idx)?, *width, *scale)?
        }
        DuckdbType::Varchar => {
            let bytes = result.get_bytes(col_idx)?;
            return output.write(out_col, row, DuckValue::Varchar(&bytes[..]));
        }
        DuckdbType::Blob => {
            let bytes = result.get_bytes(col_idx)?;
            return output.write(out_col, row, DuckValue::Blob(&bytes[..]));
        }
        DuckdbType::Enum(levels) => {
            let literal = result.get_string(col_idx)?;
            let pos = levels
                .iter()
                .position(|level| *level == *literal)
                .ok_or_else(|| Error::EnumMapping {
                    column: column.column_name.clone(),
                    value: literal.to_string(),
                })?;
            match EnumStorage::for_levels(levels.len()) {
                EnumStorage::UInt8 => DuckValue::EnumU8(pos as u8),
                EnumStorage::UInt16 => DuckValue::EnumU16(pos as u16),
                EnumStorage::UInt32 => DuckValue::EnumU32(pos as u32),
            }
        }
        DuckdbType::Date => match decode_date(&result.get_string(col_idx)?)? {
            Some(days) => DuckValue::Date(days),
            None => {
                output.set_null(out_col, row);
                return Ok(());
            }
        },
        DuckdbType::Time => DuckValue::Time(decode_time(&result.get_string(col_idx)?)?),
        DuckdbType::Timestamp => match decode_timestamp(&result.get_string(col_idx)?)? {
            Some(micros) => DuckValue::Timestamp(micros),
            None => {
                output.set_null(out_col, row);
                return Ok(());
            }
        },
    };
    output.write(out_col, row, value)
}
