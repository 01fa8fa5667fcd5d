use std::sync::Arc;

use serde_json::Value;

use crate::change_set::{ChangeSet, ChangeSetAction};
use crate::grid_display::{GridDisplay, RowIdentity};
use crate::grid_loader::PagingGate;
use crate::macros::MacroPreview;
use crate::query_runner::Row;

/// A cell as the grid should present it.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Stored(Value),
    Modified(Value),
    Inserted(Value),
    Preview(Value),
    /// Stored value of a row marked for deletion.
    Deleted(Value),
    OutOfRange,
}

impl CellValue {
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Stored(value)
            | Self::Modified(value)
            | Self::Inserted(value)
            | Self::Preview(value)
            | Self::Deleted(value) => Some(value),
            Self::OutOfRange => None,
        }
    }
}

enum RowSlot<'r> {
    Loaded(usize, &'r Row),
    Inserted(usize),
    Missing,
}

/// Loaded rows merged with pending changes and, optionally, a macro preview.
///
/// Row indexes cover loaded rows first and pending inserts after them. Loaded
/// rows are never modified; every edit is dispatched to the change set.
pub struct ChangeSetGrider<'a> {
    loaded_rows: Arc<Vec<Row>>,
    change_set: &'a mut ChangeSet,
    display: &'a GridDisplay,
    macro_preview: Option<MacroPreview>,
}

impl<'a> ChangeSetGrider<'a> {
    #[must_use]
    pub fn new(
        loaded_rows: Arc<Vec<Row>>,
        change_set: &'a mut ChangeSet,
        display: &'a GridDisplay,
    ) -> Self {
        Self {
            loaded_rows,
            change_set,
            display,
            macro_preview: None,
        }
    }

    #[must_use]
    pub fn with_macro(mut self, preview: MacroPreview) -> Self {
        self.macro_preview = Some(preview);
        self
    }

    #[must_use]
    pub fn change_set(&self) -> &ChangeSet {
        self.change_set
    }

    #[must_use]
    pub fn macro_active(&self) -> bool {
        self.macro_preview.is_some()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.loaded_rows.len() + self.change_set.inserts().len()
    }

    #[must_use]
    pub fn row_identity(&self, row_index: usize) -> Option<RowIdentity> {
        match self.slot(row_index) {
            RowSlot::Loaded(index, row) => Some(self.display.row_identity(index, row)),
            RowSlot::Inserted(_) | RowSlot::Missing => None,
        }
    }

    #[must_use]
    pub fn is_deleted(&self, row_index: usize) -> bool {
        self.row_identity(row_index)
            .is_some_and(|identity| self.change_set.is_deleted(&identity))
    }

    #[must_use]
    pub fn get_cell_value(&self, row_index: usize, column: &str) -> CellValue {
        let overlay = self.overlay_value(row_index, column);
        let Some(preview) = &self.macro_preview else {
            return overlay;
        };
        let computed = match &overlay {
            CellValue::Stored(value) | CellValue::Modified(value) | CellValue::Inserted(value) => {
                preview.compute(row_index, column, value)
            }
            _ => None,
        };
        computed.map_or(overlay, CellValue::Preview)
    }

    pub fn set_cell_value(&mut self, row_index: usize, column: &str, value: Value) -> bool {
        let action = match self.slot(row_index) {
            RowSlot::Loaded(index, row) => ChangeSetAction::SetValue {
                identity: self.display.row_identity(index, row),
                column: column.to_string(),
                value,
            },
            RowSlot::Inserted(index) => ChangeSetAction::SetInsertValue {
                index,
                column: column.to_string(),
                value,
            },
            RowSlot::Missing => return false,
        };
        self.change_set.dispatch(action)
    }

    /// Appends an empty pending row and returns its grid index.
    pub fn insert_row(&mut self) -> usize {
        self.change_set.dispatch(ChangeSetAction::InsertRow(Row::new()));
        self.row_count() - 1
    }

    pub fn delete_row(&mut self, row_index: usize) -> bool {
        let action = match self.slot(row_index) {
            RowSlot::Loaded(index, row) => {
                ChangeSetAction::DeleteRow(self.display.row_identity(index, row))
            }
            RowSlot::Inserted(index) => ChangeSetAction::RemoveInsert(index),
            RowSlot::Missing => return false,
        };
        self.change_set.dispatch(action)
    }

    /// Drops pending edits of a loaded row, or the pending row itself.
    pub fn revert_row(&mut self, row_index: usize) -> bool {
        let action = match self.slot(row_index) {
            RowSlot::Loaded(index, row) => {
                ChangeSetAction::RevertRow(self.display.row_identity(index, row))
            }
            RowSlot::Inserted(index) => ChangeSetAction::RemoveInsert(index),
            RowSlot::Missing => return false,
        };
        self.change_set.dispatch(action)
    }

    /// Folds the preview into the change set as ordinary edits and ends the
    /// preview. Returns whether any cell changed.
    pub fn commit_macro(&mut self) -> bool {
        let Some(preview) = self.macro_preview.take() else {
            return false;
        };
        let mut changed = false;
        for (row_index, column) in preview.selection.iter() {
            let current = match self.overlay_value(row_index, column) {
                CellValue::Stored(value)
                | CellValue::Modified(value)
                | CellValue::Inserted(value) => value,
                _ => continue,
            };
            let Some(computed) = preview.compute(row_index, column, &current) else {
                continue;
            };
            if computed != current {
                changed |= self.set_cell_value(row_index, column, computed);
            }
        }
        changed
    }

    pub fn discard_macro(&mut self) {
        self.macro_preview = None;
    }

    fn overlay_value(&self, row_index: usize, column: &str) -> CellValue {
        match self.slot(row_index) {
            RowSlot::Loaded(index, row) => {
                let stored = row.get(column).cloned().unwrap_or(Value::Null);
                let identity = self.display.row_identity(index, row);
                if self.change_set.is_deleted(&identity) {
                    return CellValue::Deleted(stored);
                }
                self.change_set
                    .updated_value(&identity, column)
                    .cloned()
                    .map_or(CellValue::Stored(stored), CellValue::Modified)
            }
            RowSlot::Inserted(index) => CellValue::Inserted(
                self.change_set
                    .inserted_value(index, column)
                    .cloned()
                    .unwrap_or(Value::Null),
            ),
            RowSlot::Missing => CellValue::OutOfRange,
        }
    }

    fn slot(&self, row_index: usize) -> RowSlot<'_> {
        if let Some(row) = self.loaded_rows.get(row_index) {
            return RowSlot::Loaded(row_index, row);
        }
        let insert_index = row_index - self.loaded_rows.len();
        if insert_index < self.change_set.inserts().len() {
            RowSlot::Inserted(insert_index)
        } else {
            RowSlot::Missing
        }
    }
}

impl PagingGate for ChangeSetGrider<'_> {
    fn disable_load_next_page(&self) -> bool {
        self.macro_active()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{CellValue, ChangeSetGrider};
    use crate::change_set::ChangeSet;
    use crate::grid_display::GridDisplay;
    use crate::grid_loader::PagingGate;
    use crate::macros::{CellSelection, MacroDefinition, MacroKind, MacroPreview};
    use crate::query_model::{Select, TableName};
    use crate::query_runner::Row;

    fn rows() -> Arc<Vec<Row>> {
        Arc::new(
            [json!({"id": 1, "name": "ada"}), json!({"id": 2, "name": "bob"})]
                .into_iter()
                .map(|value| value.as_object().cloned().expect("object row"))
                .collect(),
        )
    }

    fn display() -> GridDisplay {
        GridDisplay::for_select(Select::from_table(TableName::new("users"))).with_key_columns(["id"])
    }

    fn uppercase_names(rows: &[usize]) -> MacroPreview {
        MacroPreview::new(
            MacroDefinition::new("uppercase", "Uppercase", MacroKind::UpperCase),
            Row::new(),
            rows.iter().map(|row| (*row, "name")).collect::<CellSelection>(),
        )
    }

    #[test]
    fn edits_overlay_loaded_rows_without_mutating_them() {
        let loaded = rows();
        let display = display();
        let mut changes = ChangeSet::new();
        let mut grider = ChangeSetGrider::new(Arc::clone(&loaded), &mut changes, &display);

        assert!(grider.set_cell_value(0, "name", json!("x")));
        assert_eq!(grider.get_cell_value(0, "name"), CellValue::Modified(json!("x")));
        assert_eq!(grider.get_cell_value(1, "name"), CellValue::Stored(json!("bob")));
        assert_eq!(loaded[0].get("name"), Some(&json!("ada")));
    }

    #[test]
    fn delete_marks_row_and_drops_its_edits() {
        let display = display();
        let mut changes = ChangeSet::new();
        let mut grider = ChangeSetGrider::new(rows(), &mut changes, &display);

        grider.set_cell_value(0, "name", json!("x"));
        assert!(grider.delete_row(0));
        assert!(grider.is_deleted(0));
        assert_eq!(grider.get_cell_value(0, "name"), CellValue::Deleted(json!("ada")));

        assert!(!grider.set_cell_value(0, "name", json!("y")));
        assert!(grider.revert_row(0));
        assert_eq!(grider.get_cell_value(0, "name"), CellValue::Stored(json!("ada")));
    }

    #[test]
    fn inserted_rows_follow_loaded_rows() {
        let display = display();
        let mut changes = ChangeSet::new();
        let mut grider = ChangeSetGrider::new(rows(), &mut changes, &display);

        let index = grider.insert_row();
        assert_eq!(index, 2);
        assert_eq!(grider.row_count(), 3);
        assert_eq!(grider.get_cell_value(2, "name"), CellValue::Inserted(json!(null)));

        assert!(grider.set_cell_value(2, "name", json!("new")));
        assert_eq!(grider.get_cell_value(2, "name"), CellValue::Inserted(json!("new")));
        assert_eq!(grider.get_cell_value(3, "name"), CellValue::OutOfRange);

        assert!(grider.delete_row(2));
        assert_eq!(grider.row_count(), 2);
    }

    #[test]
    fn macro_preview_is_pure_until_committed() {
        let display = display();
        let mut changes = ChangeSet::new();
        {
            let mut grider = ChangeSetGrider::new(rows(), &mut changes, &display)
                .with_macro(uppercase_names(&[0]));

            assert_eq!(grider.get_cell_value(0, "name"), CellValue::Preview(json!("ADA")));
            assert_eq!(grider.get_cell_value(1, "name"), CellValue::Stored(json!("bob")));
            assert!(grider.change_set().is_empty());
            assert!(grider.disable_load_next_page());

            grider.discard_macro();
            assert_eq!(grider.get_cell_value(0, "name"), CellValue::Stored(json!("ada")));
            assert!(!grider.disable_load_next_page());
        }
        assert!(changes.is_empty());
    }

    #[test]
    fn preview_applies_over_pending_edits() {
        let display = display();
        let mut changes = ChangeSet::new();
        let mut grider = ChangeSetGrider::new(rows(), &mut changes, &display);
        grider.set_cell_value(1, "name", json!("carol"));

        let grider = grider.with_macro(uppercase_names(&[1]));
        assert_eq!(grider.get_cell_value(1, "name"), CellValue::Preview(json!("CAROL")));
    }

    #[test]
    fn commit_folds_preview_into_change_set() {
        let display = display();
        let mut changes = ChangeSet::new();
        {
            let mut grider = ChangeSetGrider::new(rows(), &mut changes, &display)
                .with_macro(uppercase_names(&[0, 1]));
            grider.delete_row(1);

            assert!(grider.commit_macro());
            assert!(!grider.macro_active());
            assert_eq!(grider.get_cell_value(0, "name"), CellValue::Modified(json!("ADA")));
            assert_eq!(grider.get_cell_value(1, "name"), CellValue::Deleted(json!("bob")));
        }
        assert_eq!(changes.updates().len(), 1);
    }
}
