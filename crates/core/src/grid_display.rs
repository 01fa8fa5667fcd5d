use serde_json::Value;

use crate::query_model::{Select, TableName};
use crate::query_runner::Row;

/// Identifies a row across reloads so pending edits stay attached to it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowIdentity {
    /// Key column names paired with the canonical JSON text of their values.
    Key(Vec<(String, String)>),
    /// Index into the loaded rows, used when no key is known.
    Position(usize),
}

/// What a grid shows and how its rows are identified.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridDisplay {
    pub select: Option<Select>,
    pub key_columns: Vec<String>,
    pub editable: bool,
}

impl GridDisplay {
    #[must_use]
    pub fn for_select(select: Select) -> Self {
        Self {
            select: Some(select),
            key_columns: Vec::new(),
            editable: false,
        }
    }

    /// Grid over rows that did not come from a query.
    #[must_use]
    pub fn sourceless() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = columns.into_iter().map(Into::into).collect();
        self.editable = !self.key_columns.is_empty();
        self
    }

    #[must_use]
    pub fn table(&self) -> Option<&TableName> {
        self.select.as_ref().map(|select| &select.from)
    }

    #[must_use]
    pub fn page_query(&self, offset: u64, limit: u64) -> Option<Select> {
        self.select
            .as_ref()
            .map(|select| select.page_query(offset, limit))
    }

    #[must_use]
    pub fn count_query(&self) -> Option<Select> {
        self.select.as_ref().map(Select::count_query)
    }

    /// Key identity when every key column is present in the row, otherwise
    /// the row's position.
    #[must_use]
    pub fn row_identity(&self, index: usize, row: &Row) -> RowIdentity {
        if self.key_columns.is_empty() {
            return RowIdentity::Position(index);
        }
        let key = self
            .key_columns
            .iter()
            .map(|column| {
                row.get(column)
                    .map(|value| (column.clone(), canonical_value(value)))
            })
            .collect::<Option<Vec<_>>>();
        key.map_or(RowIdentity::Position(index), RowIdentity::Key)
    }
}

fn canonical_value(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{GridDisplay, RowIdentity};
    use crate::query_model::{Select, TableName};
    use crate::query_runner::Row;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().expect("object row")
    }

    #[test]
    fn key_columns_identify_rows_independent_of_position() {
        let display = GridDisplay::for_select(Select::from_table(TableName::new("users")))
            .with_key_columns(["tenant", "id"]);
        let first = display.row_identity(0, &row(json!({"id": 7, "tenant": "a", "name": "x"})));
        let moved = display.row_identity(9, &row(json!({"name": "y", "tenant": "a", "id": 7})));

        assert_eq!(first, moved);
        assert_eq!(
            first,
            RowIdentity::Key(vec![
                ("tenant".to_string(), "\"a\"".to_string()),
                ("id".to_string(), "7".to_string()),
            ])
        );
        assert!(display.editable);
    }

    #[test]
    fn missing_key_falls_back_to_position() {
        let display = GridDisplay::sourceless();
        assert_eq!(
            display.row_identity(3, &row(json!({"id": 1}))),
            RowIdentity::Position(3)
        );

        let keyed = GridDisplay::sourceless().with_key_columns(["id"]);
        assert_eq!(
            keyed.row_identity(4, &row(json!({"name": "n"}))),
            RowIdentity::Position(4)
        );
    }

    #[test]
    fn derived_queries_need_a_select() {
        assert!(GridDisplay::sourceless().page_query(0, 10).is_none());

        let display = GridDisplay::for_select(Select::from_table(TableName::new("t")));
        let page = display.page_query(20, 10).expect("page query");
        assert_eq!(page.range.map(|range| range.offset), Some(20));
        assert!(display.count_query().is_some());
    }
}
