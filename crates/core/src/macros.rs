use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query_runner::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroValueType {
    #[default]
    Any,
    Text,
    Number,
}

/// Built-in transforms. Parameters come from the preview's arguments:
/// `Replace` reads `find`/`replace`, `Prefix`/`Suffix` read `text`,
/// `Constant` reads `value` and `Sequence` reads `start`/`step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroKind {
    UpperCase,
    LowerCase,
    Trim,
    Replace,
    Prefix,
    Suffix,
    Constant,
    SetNull,
    Sequence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDefinition {
    pub name: String,
    pub title: String,
    pub kind: MacroKind,
    #[serde(default)]
    pub input_type: MacroValueType,
    #[serde(default)]
    pub output_type: MacroValueType,
}

/// Where a computed value lands.
#[derive(Debug, Clone, Copy)]
pub struct MacroContext<'a> {
    pub row_index: usize,
    pub column: &'a str,
    /// Position of the cell within the selection, in row then column order.
    pub ordinal: usize,
}

impl MacroDefinition {
    #[must_use]
    pub fn new(name: &str, title: &str, kind: MacroKind) -> Self {
        let (input_type, output_type) = match kind {
            MacroKind::UpperCase
            | MacroKind::LowerCase
            | MacroKind::Trim
            | MacroKind::Replace
            | MacroKind::Prefix
            | MacroKind::Suffix => (MacroValueType::Text, MacroValueType::Text),
            MacroKind::Sequence => (MacroValueType::Any, MacroValueType::Number),
            MacroKind::Constant | MacroKind::SetNull => (MacroValueType::Any, MacroValueType::Any),
        };
        Self {
            name: name.to_string(),
            title: title.to_string(),
            kind,
            input_type,
            output_type,
        }
    }

    #[must_use]
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::new("uppercase", "Uppercase", MacroKind::UpperCase),
            Self::new("lowercase", "Lowercase", MacroKind::LowerCase),
            Self::new("trim", "Trim", MacroKind::Trim),
            Self::new("replace", "Replace text", MacroKind::Replace),
            Self::new("prefix", "Add prefix", MacroKind::Prefix),
            Self::new("suffix", "Add suffix", MacroKind::Suffix),
            Self::new("constant", "Set constant", MacroKind::Constant),
            Self::new("null", "Set NULL", MacroKind::SetNull),
            Self::new("sequence", "Number sequence", MacroKind::Sequence),
        ]
    }

    #[must_use]
    pub fn find_builtin(name: &str) -> Option<Self> {
        Self::builtin()
            .into_iter()
            .find(|definition| definition.name == name)
    }

    /// Computes the transformed value of one cell. Values the macro cannot
    /// accept are returned unchanged.
    #[must_use]
    pub fn compute(&self, value: &Value, args: &Row, context: &MacroContext<'_>) -> Value {
        if !self.accepts(value) {
            return value.clone();
        }
        match self.kind {
            MacroKind::UpperCase => map_text(value, str::to_uppercase),
            MacroKind::LowerCase => map_text(value, str::to_lowercase),
            MacroKind::Trim => map_text(value, |text| text.trim().to_string()),
            MacroKind::Replace => {
                let find = arg_text(args, "find");
                if find.is_empty() {
                    return value.clone();
                }
                let replacement = arg_text(args, "replace");
                map_text(value, |text| text.replace(&find, &replacement))
            }
            MacroKind::Prefix => {
                let prefix = arg_text(args, "text");
                map_text(value, |text| format!("{prefix}{text}"))
            }
            MacroKind::Suffix => {
                let suffix = arg_text(args, "text");
                map_text(value, |text| format!("{text}{suffix}"))
            }
            MacroKind::Constant => args.get("value").cloned().unwrap_or(Value::Null),
            MacroKind::SetNull => Value::Null,
            MacroKind::Sequence => {
                let start = arg_number(args, "start").unwrap_or(1);
                let step = arg_number(args, "step").unwrap_or(1);
                let ordinal = i64::try_from(context.ordinal).unwrap_or(i64::MAX);
                Value::from(start.saturating_add(step.saturating_mul(ordinal)))
            }
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self.input_type {
            MacroValueType::Any => true,
            MacroValueType::Text => !value.is_array() && !value.is_object(),
            MacroValueType::Number => value.is_number() || value.is_null(),
        }
    }
}

/// Applies a text transform. Null stays null; scalars are transformed through
/// their text form.
fn map_text(value: &Value, transform: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(text) => Value::String(transform(text)),
        other => Value::String(transform(&other.to_string())),
    }
}

fn arg_text(args: &Row, name: &str) -> String {
    match args.get(name) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn arg_number(args: &Row, name: &str) -> Option<i64> {
    match args.get(name)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Cells a macro applies to, keyed by row index and column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellSelection {
    cells: BTreeSet<(usize, String)>,
}

impl CellSelection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row_index: usize, column: impl Into<String>) {
        self.cells.insert((row_index, column.into()));
    }

    #[must_use]
    pub fn contains(&self, row_index: usize, column: &str) -> bool {
        self.cells.contains(&(row_index, column.to_string()))
    }

    /// Position of the cell within the selection.
    #[must_use]
    pub fn ordinal(&self, row_index: usize, column: &str) -> Option<usize> {
        let key = (row_index, column.to_string());
        self.cells
            .contains(&key)
            .then(|| self.cells.range(..key).count())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.cells
            .iter()
            .map(|(row_index, column)| (*row_index, column.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(usize, S)> for CellSelection {
    fn from_iter<T: IntoIterator<Item = (usize, S)>>(iter: T) -> Self {
        Self {
            cells: iter
                .into_iter()
                .map(|(row_index, column)| (row_index, column.into()))
                .collect(),
        }
    }
}

/// An active macro: what to compute, with which arguments, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroPreview {
    pub definition: MacroDefinition,
    pub args: Row,
    pub selection: CellSelection,
}

impl MacroPreview {
    #[must_use]
    pub fn new(definition: MacroDefinition, args: Row, selection: CellSelection) -> Self {
        Self {
            definition,
            args,
            selection,
        }
    }

    /// Preview value for a selected cell, `None` outside the selection.
    #[must_use]
    pub fn compute(&self, row_index: usize, column: &str, value: &Value) -> Option<Value> {
        let ordinal = self.selection.ordinal(row_index, column)?;
        let context = MacroContext {
            row_index,
            column,
            ordinal,
        };
        Some(self.definition.compute(value, &self.args, &context))
    }
}
