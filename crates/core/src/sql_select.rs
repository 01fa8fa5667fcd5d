use crate::dialect::PaginationSyntax;
use crate::dumper::{DumpError, SqlDumper, TemplateArg};
use crate::query_model::{
    ColumnReference, FilterOperand, FilterOperator, FilterPredicate, RangeSpec, Select, SqlValue,
};

const ROWNUM_WINDOW_ALIAS: &str = "page_window";
const ROWNUM_COLUMN_ALIAS: &str = "page_row_number";

/// Writes one terminated SELECT statement for `select`.
///
/// Clauses are emitted in a fixed order and column/ordering lists keep the
/// order of the model. Pagination syntax comes from the dumper's dialect.
pub fn dump_sql_select(dumper: &mut SqlDumper, select: &Select) -> Result<(), DumpError> {
    dump_select_body(dumper, select)?;
    dumper.end_command();
    Ok(())
}

fn dump_select_body(dumper: &mut SqlDumper, select: &Select) -> Result<(), DumpError> {
    let pagination = dumper.dialect().pagination;
    match (pagination, select.range) {
        (PaginationSyntax::RowNum, Some(range)) => dump_rownum_window(dumper, select, range),
        (PaginationSyntax::Top, Some(range)) if range.offset == 0 => {
            dumper.put_template(
                "^select ^top %s ",
                &[TemplateArg::Raw(&range.limit.to_string())],
            )?;
            dump_unpaged_select(dumper, select)
        }
        (PaginationSyntax::Top | PaginationSyntax::OffsetFetch, Some(range)) => {
            dumper.put_keyword("select");
            dumper.put_raw(" ");
            dump_unpaged_select(dumper, select)?;
            if select.order_by.is_empty() {
                dumper.put_template(" ^order ^by (^select ^null)", &[])?;
            }
            dump_offset_fetch(dumper, range)
        }
        (PaginationSyntax::LimitOffset, Some(range)) => {
            dumper.put_keyword("select");
            dumper.put_raw(" ");
            dump_unpaged_select(dumper, select)?;
            dump_limit_offset(dumper, range)
        }
        (_, None) => {
            dumper.put_keyword("select");
            dumper.put_raw(" ");
            dump_unpaged_select(dumper, select)
        }
    }
}

/// Everything after the SELECT keyword except pagination.
fn dump_unpaged_select(dumper: &mut SqlDumper, select: &Select) -> Result<(), DumpError> {
    if select.columns.is_empty() {
        dumper.put_raw("*");
    } else {
        for (index, column) in select.columns.iter().enumerate() {
            if index > 0 {
                dumper.put_raw(", ");
            }
            dump_column_expression(dumper, column)?;
            if let Some(alias) = &column.alias {
                dumper.put_template(" ^as %i", &[TemplateArg::Identifier(alias)])?;
            }
        }
    }

    dumper.put_template(" ^from %f", &[TemplateArg::Table(&select.from)])?;

    if !select.filters.is_empty() {
        dumper.put_template(" ^where ", &[])?;
        for (index, predicate) in select.filters.iter().enumerate() {
            if index > 0 {
                dumper.put_template(" ^and ", &[])?;
            }
            dump_predicate(dumper, predicate)?;
        }
    }

    if !select.order_by.is_empty() {
        dumper.put_template(" ^order ^by ", &[])?;
        for (index, order) in select.order_by.iter().enumerate() {
            if index > 0 {
                dumper.put_raw(", ");
            }
            dump_column_expression(dumper, &order.column)?;
            dumper.put_raw(" ");
            dumper.put_keyword(order.direction.keyword());
        }
    }

    Ok(())
}

fn dump_column_expression(
    dumper: &mut SqlDumper,
    column: &ColumnReference,
) -> Result<(), DumpError> {
    match column.aggregate {
        Some(aggregate) => {
            dumper.put_keyword(aggregate.keyword());
            dumper.put_raw("(");
            if column.is_wildcard() {
                dumper.put_raw("*");
            } else {
                dumper.put_identifier(&column.name)?;
            }
            dumper.put_raw(")");
            Ok(())
        }
        None if column.is_wildcard() => {
            dumper.put_raw("*");
            Ok(())
        }
        None => dumper.put_identifier(&column.name),
    }
}

fn dump_predicate(dumper: &mut SqlDumper, predicate: &FilterPredicate) -> Result<(), DumpError> {
    use FilterOperator::{Eq, In, IsNotNull, IsNull, NotEq, NotIn};

    // An empty IN list renders as a constant predicate.
    if let FilterOperand::List(values) = &predicate.operand {
        if values.is_empty() && matches!(predicate.operator, In | NotIn) {
            let constant = if predicate.operator == In { "1 = 0" } else { "1 = 1" };
            dumper.put_raw(constant);
            return Ok(());
        }
    }

    dump_column_expression(dumper, &predicate.column)?;
    let operator = predicate.operator;
    let null_operand = matches!(
        predicate.operand,
        FilterOperand::None | FilterOperand::Value(SqlValue::Null)
    );
    if operator == IsNull || (operator == Eq && null_operand) {
        return dumper.put_template(" ^is ^null", &[]);
    }
    if operator == IsNotNull || (operator == NotEq && null_operand) {
        return dumper.put_template(" ^is ^not ^null", &[]);
    }

    dumper.put_raw(" ");
    put_operator(dumper, operator);
    dumper.put_raw(" ");
    match &predicate.operand {
        FilterOperand::None => dumper.put_value(&SqlValue::Null),
        FilterOperand::Value(value) => dumper.put_value(value),
        FilterOperand::List(values) => {
            dumper.put_template("(%,v)", &[TemplateArg::Values(values)])?;
        }
        FilterOperand::SubQuery(subquery) => {
            dumper.put_raw("(");
            dump_select_body(dumper, subquery)?;
            dumper.put_raw(")");
        }
    }
    Ok(())
}

fn put_operator(dumper: &mut SqlDumper, operator: FilterOperator) {
    if operator.is_keyword() {
        dumper.put_keyword(operator.symbol());
    } else {
        dumper.put_raw(operator.symbol());
    }
}

fn dump_limit_offset(dumper: &mut SqlDumper, range: RangeSpec) -> Result<(), DumpError> {
    dumper.put_template(" ^limit %s", &[TemplateArg::Raw(&range.limit.to_string())])?;
    if range.offset > 0 {
        dumper.put_template(" ^offset %s", &[TemplateArg::Raw(&range.offset.to_string())])?;
    }
    Ok(())
}

fn dump_offset_fetch(dumper: &mut SqlDumper, range: RangeSpec) -> Result<(), DumpError> {
    dumper.put_template(
        " ^offset %s ^rows ^fetch ^next %s ^rows ^only",
        &[
            TemplateArg::Raw(&range.offset.to_string()),
            TemplateArg::Raw(&range.limit.to_string()),
        ],
    )
}

fn dump_rownum_window(
    dumper: &mut SqlDumper,
    select: &Select,
    range: RangeSpec,
) -> Result<(), DumpError> {
    let upper_bound = range.offset.saturating_add(range.limit).to_string();
    let unpaged = Select {
        range: None,
        ..select.clone()
    };

    if range.offset == 0 {
        dumper.put_template("^select * ^from (", &[])?;
        dump_select_body(dumper, &unpaged)?;
        return dumper.put_template(
            ") ^where ^rownum <= %s",
            &[TemplateArg::Raw(&upper_bound)],
        );
    }

    dumper.put_template(
        "^select * ^from (^select %i.*, ^rownum ^as %i ^from (",
        &[
            TemplateArg::Identifier(ROWNUM_WINDOW_ALIAS),
            TemplateArg::Identifier(ROWNUM_COLUMN_ALIAS),
        ],
    )?;
    dump_select_body(dumper, &unpaged)?;
    dumper.put_template(
        ") %i ^where ^rownum <= %s) ^where %i > %s",
        &[
            TemplateArg::Identifier(ROWNUM_WINDOW_ALIAS),
            TemplateArg::Raw(&upper_bound),
            TemplateArg::Identifier(ROWNUM_COLUMN_ALIAS),
            TemplateArg::Raw(&range.offset.to_string()),
        ],
    )
}
