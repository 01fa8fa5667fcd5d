use serde_json::Value;
use tracing::debug;

use crate::change_set::ChangeSet;
use crate::dumper::{DumpError, SqlDumper, TemplateArg};
use crate::grid_display::{GridDisplay, RowIdentity};
use crate::query_model::{SqlValue, TableName};
use crate::query_runner::Row;

/// Writes the statements that apply `change_set` to the display's table:
/// inserts, then updates, then deletes.
///
/// Rows identified only by position cannot be addressed in SQL and are left
/// out. A display without a table produces nothing.
pub fn dump_change_set(
    dumper: &mut SqlDumper,
    display: &GridDisplay,
    change_set: &ChangeSet,
) -> Result<(), DumpError> {
    let Some(table) = display.table() else {
        return Ok(());
    };

    for row in change_set.inserts() {
        dump_insert(dumper, table, row)?;
    }

    for (identity, row) in change_set.updates() {
        let RowIdentity::Key(key) = identity else {
            debug!("skipping update of a row without key columns");
            continue;
        };
        if row.is_empty() {
            continue;
        }
        dumper.put_template("^update %f ^set ", &[TemplateArg::Table(table)])?;
        for (index, (column, value)) in row.iter().enumerate() {
            if index > 0 {
                dumper.put_raw(", ");
            }
            dumper.put_template(
                "%i = %v",
                &[
                    TemplateArg::Identifier(column),
                    TemplateArg::Value(&SqlValue::from(value)),
                ],
            )?;
        }
        dump_key_condition(dumper, key)?;
        dumper.end_command();
    }

    for identity in change_set.deletes() {
        let RowIdentity::Key(key) = identity else {
            debug!("skipping delete of a row without key columns");
            continue;
        };
        dumper.put_template("^delete ^from %f", &[TemplateArg::Table(table)])?;
        dump_key_condition(dumper, key)?;
        dumper.end_command();
    }

    Ok(())
}

fn dump_insert(dumper: &mut SqlDumper, table: &TableName, row: &Row) -> Result<(), DumpError> {
    if row.is_empty() {
        return Ok(());
    }
    let columns: Vec<String> = row.keys().cloned().collect();
    let values: Vec<SqlValue> = row.values().map(SqlValue::from).collect();
    dumper.put_command(
        "^insert ^into %f (%,i) ^values (%,v)",
        &[
            TemplateArg::Table(table),
            TemplateArg::Identifiers(&columns),
            TemplateArg::Values(&values),
        ],
    )
}

fn dump_key_condition(dumper: &mut SqlDumper, key: &[(String, String)]) -> Result<(), DumpError> {
    for (index, (column, canonical)) in key.iter().enumerate() {
        let keyword = if index == 0 { " ^where " } else { " ^and " };
        dumper.put_template(keyword, &[])?;
        let value = key_value(canonical);
        if value.is_null() {
            dumper.put_template("%i ^is ^null", &[TemplateArg::Identifier(column)])?;
        } else {
            dumper.put_template(
                "%i = %v",
                &[TemplateArg::Identifier(column), TemplateArg::Value(&value)],
            )?;
        }
    }
    Ok(())
}

fn key_value(canonical: &str) -> SqlValue {
    serde_json::from_str::<Value>(canonical)
        .map(|value| SqlValue::from(&value))
        .unwrap_or_else(|_| SqlValue::Text(canonical.to_string()))
}
