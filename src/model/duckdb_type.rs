use std::fmt;

/// Widest DECIMAL decoded natively; `rust_decimal` carries 28 significant digits
pub const MAX_DECIMAL_WIDTH: u8 = 28;

/// Column type of a scan result, as declared to DuckDB
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuckdbType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    UTinyInt,
    USmallInt,
    UInteger,
    UBigInt,
    Float,
    Double,
    Decimal { width: u8, scale: u8 },
    Varchar,
    Blob,
    /// Ordered literal domain; a value is stored as its position
    Enum(Vec<String>),
    Date,
    Time,
    Timestamp,
}

/// Physical integer backing a DECIMAL of a given width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalStorage {
    Int16,
    Int32,
    Int64,
    Int128,
}

impl DecimalStorage {
    pub fn for_width(width: u8) -> Self {
        match width {
            0..=4 => Self::Int16,
            5..=9 => Self::Int32,
            10..=18 => Self::Int64,
            _ => Self::Int128,
        }
    }
}

/// Physical integer backing an ENUM with a given number of levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumStorage {
    UInt8,
    UInt16,
    UInt32,
}

impl EnumStorage {
    pub fn for_levels(levels: usize) -> Self {
        if levels <= u8::MAX as usize {
            Self::UInt8
        } else if levels <= u16::MAX as usize {
            Self::UInt16
        } else {
            Self::UInt32
        }
    }
}

impl fmt::Display for DuckdbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TinyInt => write!(f, "TINYINT"),
            Self::SmallInt => write!(f, "SMALLINT"),
            Self::Integer => write!(f, "INTEGER"),
            Self::BigInt => write!(f, "BIGINT"),
            Self::UTinyInt => write!(f, "UTINYINT"),
            Self::USmallInt => write!(f, "USMALLINT"),
            Self::UInteger => write!(f, "UINTEGER"),
            Self::UBigInt => write!(f, "UBIGINT"),
            Self::Float => write!(f, "FLOAT"),
            Self::Double => write!(f, "DOUBLE"),
            Self::Decimal { width, scale } => write!(f, "DECIMAL({},{})", width, scale),
            Self::Varchar => write!(f, "VARCHAR"),
            Self::Blob => write!(f, "BLOB"),
            Self::Enum(levels) => {
                let quoted: Vec<String> = levels
                    .iter()
                    .map(|l| format!("'{}'", l.replace('\'', "''")))
                    .collect();
                write!(f, "ENUM({})", quoted.join(", "))
            }
            Self::Date => write!(f, "DATE"),
            Self::Time => write!(f, "TIME"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// Type metadata of one column, as read from `information_schema.columns`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MysqlTypeInfo {
    /// `DATA_TYPE`, lower case (`int`, `varchar`, ...)
    pub data_type: String,
    /// `COLUMN_TYPE` (`int unsigned`, `enum('a','b')`, ...)
    pub column_type: String,
    pub char_max_length: Option<u64>,
    pub numeric_precision: Option<u64>,
    pub numeric_scale: Option<u64>,
    /// Literal list of an enum column, e.g. `('a','b')`
    pub enum_values: Option<String>,
}

impl MysqlTypeInfo {
    fn is_unsigned(&self) -> bool {
        self.column_type.to_ascii_lowercase().contains("unsigned")
    }
}

/// Map a MySQL column onto its DuckDB type.
///
/// Returns the declared type and whether the column must be read through a
/// string cast. Unknown types are never rejected; they come back as
/// `(Varchar, true)`.
pub fn duckdb_type(info: &MysqlTypeInfo) -> (DuckdbType, bool) {
    let unsigned = info.is_unsigned();
    let mapped = match info.data_type.to_ascii_lowercase().as_str() {
        "tinyint" if unsigned => DuckdbType::UTinyInt,
        "tinyint" => DuckdbType::TinyInt,
        "smallint" if unsigned => DuckdbType::USmallInt,
        "smallint" | "year" => DuckdbType::SmallInt,
        "mediumint" | "int" | "integer" if unsigned => DuckdbType::UInteger,
        "mediumint" | "int" | "integer" => DuckdbType::Integer,
        "bigint" if unsigned => DuckdbType::UBigInt,
        "bigint" => DuckdbType::BigInt,
        "float" => DuckdbType::Float,
        "double" | "real" => DuckdbType::Double,
        "decimal" | "numeric" => match (info.numeric_precision, info.numeric_scale) {
            (Some(width), scale) if width >= 1 && width <= u64::from(MAX_DECIMAL_WIDTH) => {
                DuckdbType::Decimal {
                    width: width as u8,
                    scale: scale.unwrap_or(0).min(width) as u8,
                }
            }
            _ => return (DuckdbType::Varchar, true),
        },
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "json" | "set" => {
            DuckdbType::Varchar
        }
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "bit" => {
            DuckdbType::Blob
        }
        "enum" => {
            let source = info.enum_values.as_deref().unwrap_or(&info.column_type);
            match parse_enum_levels(source) {
                Some(levels) if !levels.is_empty() => DuckdbType::Enum(levels),
                _ => return (DuckdbType::Varchar, true),
            }
        }
        "date" => DuckdbType::Date,
        "time" => DuckdbType::Time,
        "datetime" | "timestamp" => DuckdbType::Timestamp,
        other => {
            tracing::debug!(mysql_type = other, "unmapped MySQL type, reading as VARCHAR");
            return (DuckdbType::Varchar, true);
        }
    };
    (mapped, false)
}

/// Split an enum literal list such as `('a','b','it''s')` into its levels.
///
/// An `enum` prefix is accepted. Returns `None` when the text is not a
/// parenthesized list of quoted literals.
pub fn parse_enum_levels(text: &str) -> Option<Vec<String>> {
    let text = text.trim();
    let text = text
        .strip_prefix("enum")
        .or_else(|| text.strip_prefix("ENUM"))
        .unwrap_or(text)
        .trim();
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;

    let mut levels = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.next()? != '\'' {
            return None;
        }
        let mut level = String::new();
        loop {
            match chars.next()? {
                '\'' if chars.peek() == Some(&'\'') => {
                    chars.next();
                    level.push('\'');
                }
                '\'' => break,
                '\\' => level.push(chars.next()?),
                c => level.push(c),
            }
        }
        levels.push(level);
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => return Some(levels),
            Some(',') => continue,
            Some(_) => return None,
        }
    }
}
