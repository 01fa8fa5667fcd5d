use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::grid_display::RowIdentity;
use crate::query_runner::Row;

/// Edits to a change set. Every mutation goes through [`ChangeSet::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeSetAction {
    SetValue {
        identity: RowIdentity,
        column: String,
        value: Value,
    },
    SetInsertValue {
        index: usize,
        column: String,
        value: Value,
    },
    InsertRow(Row),
    DeleteRow(RowIdentity),
    /// Drops pending updates and the delete mark of one existing row.
    RevertRow(RowIdentity),
    RemoveInsert(usize),
    Clear,
}

/// Pending modifications layered over loaded rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    updates: BTreeMap<RowIdentity, Row>,
    inserts: Vec<Row>,
    deletes: BTreeSet<RowIdentity>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one action and reports whether anything changed.
    ///
    /// A deleted row keeps no updates, and edits addressed to it are ignored
    /// until it is reverted.
    pub fn dispatch(&mut self, action: ChangeSetAction) -> bool {
        match action {
            ChangeSetAction::SetValue {
                identity,
                column,
                value,
            } => {
                if self.deletes.contains(&identity) {
                    return false;
                }
                let row = self.updates.entry(identity).or_default();
                if row.get(&column) == Some(&value) {
                    return false;
                }
                row.insert(column, value);
                true
            }
            ChangeSetAction::SetInsertValue {
                index,
                column,
                value,
            } => match self.inserts.get_mut(index) {
                Some(row) => {
                    row.insert(column, value);
                    true
                }
                None => false,
            },
            ChangeSetAction::InsertRow(row) => {
                self.inserts.push(row);
                true
            }
            ChangeSetAction::DeleteRow(identity) => {
                self.updates.remove(&identity);
                self.deletes.insert(identity)
            }
            ChangeSetAction::RevertRow(identity) => {
                let updated = self.updates.remove(&identity).is_some();
                let deleted = self.deletes.remove(&identity);
                updated || deleted
            }
            ChangeSetAction::RemoveInsert(index) => {
                if index < self.inserts.len() {
                    self.inserts.remove(index);
                    true
                } else {
                    false
                }
            }
            ChangeSetAction::Clear => {
                let changed = !self.is_empty();
                *self = Self::default();
                changed
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty() && self.deletes.is_empty()
    }

    #[must_use]
    pub fn updates(&self) -> &BTreeMap<RowIdentity, Row> {
        &self.updates
    }

    #[must_use]
    pub fn inserts(&self) -> &[Row] {
        &self.inserts
    }

    #[must_use]
    pub fn deletes(&self) -> &BTreeSet<RowIdentity> {
        &self.deletes
    }

    #[must_use]
    pub fn is_deleted(&self, identity: &RowIdentity) -> bool {
        self.deletes.contains(identity)
    }

    #[must_use]
    pub fn updated_value(&self, identity: &RowIdentity, column: &str) -> Option<&Value> {
        self.updates.get(identity)?.get(column)
    }

    #[must_use]
    pub fn inserted_value(&self, index: usize, column: &str) -> Option<&Value> {
        self.inserts.get(index)?.get(column)
    }
}
