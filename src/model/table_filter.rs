//! Filters DuckDB pushes into a scan.
//!
//! The variant set is closed: the request transformer matches on it
//! exhaustively, so a new filter kind is a compile error there.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

/// Comparison operator of a constant filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    IsDistinctFrom,
    IsNotDistinctFrom,
}

/// Constant side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum FilterConstant {
    Boolean(bool),
    Integer(i64),
    UInteger(u64),
    Double(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl fmt::Display for FilterConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", u8::from(*v)),
            Self::Integer(v) => write!(f, "{}", v),
            Self::UInteger(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Self::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<&str> for FilterConstant {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<i64> for FilterConstant {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

/// One column's pushed-down filter
#[derive(Debug, Clone, PartialEq)]
pub enum TableFilter {
    IsNull,
    IsNotNull,
    ConstantComparison {
        op: ComparisonOp,
        constant: FilterConstant,
    },
    ConjunctionAnd(Vec<TableFilter>),
    ConjunctionOr(Vec<TableFilter>),
}

impl TableFilter {
    pub fn compare(op: ComparisonOp, constant: impl Into<FilterConstant>) -> Self {
        Self::ConstantComparison {
            op,
            constant: constant.into(),
        }
    }
}

/// Filters keyed by position in the scan's projected column list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableFilterSet {
    filters: BTreeMap<usize, TableFilter>,
}

impl TableFilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter for projected column `index`; a second filter on the same
    /// column is AND-ed with the first.
    pub fn push(&mut self, index: usize, filter: TableFilter) {
        let merged = match self.filters.remove(&index) {
            Some(TableFilter::ConjunctionAnd(mut children)) => {
                children.push(filter);
                TableFilter::ConjunctionAnd(children)
            }
            Some(existing) => TableFilter::ConjunctionAnd(vec![existing, filter]),
            None => filter,
        };
        self.filters.insert(index, merged);
    }

    pub fn with(mut self, index: usize, filter: TableFilter) -> Self {
        self.push(index, filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &TableFilter)> {
        self.filters.iter().map(|(k, v)| (*k, v))
    }
}
