use crate::error::{Error, Result};
use crate::model::mysql_bind_data::{MysqlBindData, MysqlColumnInfo, COLUMN_IDENTIFIER_ROW_ID};
use crate::model::table_filter::{ComparisonOp, TableFilter, TableFilterSet};

/// Quote a MySQL identifier with backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a MySQL string literal
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            '\0' => quoted.push_str("\\0"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

fn transform_comparison(op: ComparisonOp) -> Result<&'static str> {
    match op {
        ComparisonOp::Equal => Ok("="),
        ComparisonOp::NotEqual => Ok("!="),
        ComparisonOp::LessThan => Ok("<"),
        ComparisonOp::GreaterThan => Ok(">"),
        ComparisonOp::LessThanOrEqual => Ok("<="),
        ComparisonOp::GreaterThanOrEqual => Ok(">="),
        ComparisonOp::IsDistinctFrom | ComparisonOp::IsNotDistinctFrom => Err(
            Error::unsupported_filter(format!("comparison {:?} cannot be pushed down", op)),
        ),
    }
}

fn create_expression(column_name: &str, filters: &[TableFilter], op: &str) -> Result<String> {
    if filters.is_empty() {
        return Err(Error::unsupported_filter(format!("empty {} conjunction", op)));
    }
    let entries = filters
        .iter()
        .map(|filter| transform_filter(column_name, filter))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", entries.join(&format!(" {} ", op))))
}

/// Render one column's filter as a MySQL predicate over an already quoted column.
pub fn transform_filter(column_name: &str, filter: &TableFilter) -> Result<String> {
    match filter {
        TableFilter::IsNull => Ok(format!("{} IS NULL", column_name)),
        TableFilter::IsNotNull => Ok(format!("{} IS NOT NULL", column_name)),
        TableFilter::ConjunctionAnd(children) => create_expression(column_name, children, "AND"),
        TableFilter::ConjunctionOr(children) => create_expression(column_name, children, "OR"),
        TableFilter::ConstantComparison { op, constant } => Ok(format!(
            "{} {} {}",
            column_name,
            transform_comparison(*op)?,
            quote_literal(&constant.to_string())
        )),
    }
}

fn projected_column<'a>(bind_data: &'a MysqlBindData, column_id: u64) -> Result<&'a MysqlColumnInfo> {
    usize::try_from(column_id)
        .ok()
        .and_then(|idx| bind_data.columns.get(idx))
        .ok_or_else(|| Error::internal(format!("projected column id {} out of range", column_id)))
}

/// Build the task's SELECT for the projected columns and pushed filters, without paging.
pub fn duckdb_to_mysql_request(
    bind_data: &MysqlBindData,
    column_ids: &[u64],
    filters: &TableFilterSet,
) -> Result<String> {
    let mut col_names = Vec::with_capacity(column_ids.len());
    for &column_id in column_ids {
        if column_id == COLUMN_IDENTIFIER_ROW_ID {
            col_names.push("NULL".to_string());
            continue;
        }
        let column = projected_column(bind_data, column_id)?;
        let name = quote_identifier(&column.column_name);
        if column.needs_cast {
            col_names.push(format!("CAST({} AS CHAR) AS {}", name, name));
        } else {
            col_names.push(name);
        }
    }
    if col_names.is_empty() {
        col_names.push("NULL".to_string());
    }

    let mut filter_string = String::new();
    if !filters.is_empty() {
        let mut entries = Vec::new();
        for (index, filter) in filters.iter() {
            let column_id = column_ids.get(index).copied().ok_or_else(|| {
                Error::internal(format!("filter on projection index {} out of range", index))
            })?;
            if column_id == COLUMN_IDENTIFIER_ROW_ID {
                return Err(Error::unsupported_filter("filter on the row id"));
            }
            let column = projected_column(bind_data, column_id)?;
            entries.push(transform_filter(&quote_identifier(&column.column_name), filter)?);
        }
        filter_string = if entries.len() == 1 {
            format!(" WHERE {}", entries.join(""))
        } else {
            format!(" WHERE ({})", entries.join(" AND "))
        };
    }

    Ok(format!(
        "SELECT {} FROM {}.{}{}",
        col_names.join(", "),
        quote_identifier(&bind_data.schema_name),
        quote_identifier(&bind_data.table_name),
        filter_string
    ))
}

/// Append the LIMIT/OFFSET of `page` to a task's base SELECT.
pub fn paged_request(base_sql: &str, page: u64, page_size: usize) -> String {
    let page_size = page_size as u64;
    format!(
        "{} LIMIT {} OFFSET {}",
        base_sql,
        page_size,
        page.saturating_mul(page_size)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::table_filter::FilterConstant;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("orders"), "`orders`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("a"), "'a'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("c:\\tmp"), "'c:\\\\tmp'");
    }

    #[test]
    fn test_transform_filter() {
        let col = "`id`";
        assert_eq!(transform_filter(col, &TableFilter::IsNull).unwrap(), "`id` IS NULL");
        assert_eq!(
            transform_filter(col, &TableFilter::IsNotNull).unwrap(),
            "`id` IS NOT NULL"
        );

        let range = TableFilter::ConjunctionAnd(vec![
            TableFilter::compare(ComparisonOp::GreaterThanOrEqual, 1),
            TableFilter::compare(ComparisonOp::LessThan, 10),
        ]);
        assert_eq!(
            transform_filter(col, &range).unwrap(),
            "(`id` >= '1' AND `id` < '10')"
        );

        let either = TableFilter::ConjunctionOr(vec![
            TableFilter::IsNull,
            TableFilter::compare(ComparisonOp::NotEqual, FilterConstant::Text("x".into())),
        ]);
        assert_eq!(
            transform_filter(col, &either).unwrap(),
            "(`id` IS NULL OR `id` != 'x')"
        );
    }

    #[test]
    fn test_unsupported_comparison() {
        let filter = TableFilter::compare(ComparisonOp::IsDistinctFrom, 1);
        let err = transform_filter("`id`", &filter).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFilter { .. }));

        let err = transform_filter("`id`", &TableFilter::ConjunctionOr(vec![])).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFilter { .. }));
    }

    #[test]
    fn test_paged_request() {
        assert_eq!(
            paged_request("SELECT `id` FROM `s`.`t`", 3, 2048),
            "SELECT `id` FROM `s`.`t` LIMIT 2048 OFFSET 6144"
        );
        assert_eq!(paged_request("SELECT 1", 0, 10), "SELECT 1 LIMIT 10 OFFSET 0");
    }
}
