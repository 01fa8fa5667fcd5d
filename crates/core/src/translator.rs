use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::change_script::dump_change_set;
use crate::change_set::ChangeSet;
use crate::dialect::Dialect;
use crate::drivers::{ConnectionDescriptor, DriverRegistry, EngineDriver};
use crate::dumper::DumpError;
use crate::grid_display::GridDisplay;
use crate::query_model::{Select, SelectRequest, TableName};
use crate::sql_select::dump_sql_select;

pub const DEFAULT_FALLBACK_LIMIT: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslatedQuery {
    /// Caller supplied finished SQL.
    PassThrough(String),
    Generated(String),
    /// The generated statement was unusable and a minimal browse query was
    /// synthesized instead.
    Fallback { sql: String, rejected: String },
    /// No query is available for this request.
    Unavailable,
}

impl TranslatedQuery {
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::PassThrough(sql) | Self::Generated(sql) | Self::Fallback { sql, .. } => {
                Some(sql)
            }
            Self::Unavailable => None,
        }
    }

    #[must_use]
    pub fn into_sql(self) -> Option<String> {
        match self {
            Self::PassThrough(sql) | Self::Generated(sql) | Self::Fallback { sql, .. } => {
                Some(sql)
            }
            Self::Unavailable => None,
        }
    }
}

/// Turns select requests into SQL for the engine behind a connection.
///
/// Holds its own "already warned" flag so separate grids or connections do
/// not share warning suppression.
#[derive(Debug)]
pub struct SqlTranslator {
    registry: Arc<DriverRegistry>,
    fallback_warned: AtomicBool,
}

impl SqlTranslator {
    #[must_use]
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            fallback_warned: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    #[must_use]
    pub fn fallback_warned(&self) -> bool {
        self.fallback_warned.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn can_translate(&self, connection: &ConnectionDescriptor) -> bool {
        self.registry
            .resolve(connection)
            .is_some_and(EngineDriver::supports_sql)
    }

    #[must_use]
    pub fn translate(
        &self,
        connection: &ConnectionDescriptor,
        request: &SelectRequest,
    ) -> TranslatedQuery {
        let select = match request {
            SelectRequest::Sql(sql) | SelectRequest::Wrapped { sql } => {
                return TranslatedQuery::PassThrough(sql.clone());
            }
            SelectRequest::Model(select) => select,
        };

        let Some(driver) = self.registry.resolve(connection) else {
            debug!(engine = ?connection.engine(), "no driver registered for connection");
            return TranslatedQuery::Unavailable;
        };
        self.translate_with_driver(driver, select)
    }

    #[must_use]
    pub fn translate_with_driver(&self, driver: &EngineDriver, select: &Select) -> TranslatedQuery {
        let Some(mut dumper) = driver.create_dumper() else {
            debug!(engine = %driver.engine, "driver does not produce SQL");
            return TranslatedQuery::Unavailable;
        };

        let rejected = match dump_sql_select(&mut dumper, select) {
            Ok(()) if !has_empty_identifier(dumper.as_str(), dumper.dialect()) => {
                return TranslatedQuery::Generated(dumper.finish());
            }
            Ok(()) | Err(DumpError::EmptyIdentifier) => dumper.finish(),
            Err(error) => {
                warn!(engine = %driver.engine, %error, "failed to translate select");
                return TranslatedQuery::Unavailable;
            }
        };

        self.fallback(driver, select, rejected)
    }

    /// Script applying a pending change set, or `None` when the engine has no
    /// SQL dialect or nothing can be written.
    #[must_use]
    pub fn change_set_script(
        &self,
        connection: &ConnectionDescriptor,
        display: &GridDisplay,
        change_set: &ChangeSet,
    ) -> Option<String> {
        let mut dumper = self.registry.resolve(connection)?.create_dumper()?;
        match dump_change_set(&mut dumper, display, change_set) {
            Ok(()) if dumper.command_count() > 0 => Some(dumper.finish()),
            Ok(()) => None,
            Err(error) => {
                warn!(%error, "failed to script pending changes");
                None
            }
        }
    }

    fn fallback(&self, driver: &EngineDriver, select: &Select, rejected: String) -> TranslatedQuery {
        let pure_name = select.from.pure_name.trim();
        if pure_name.is_empty() {
            debug!(rejected = %rejected, "no table name to recover from invalid select");
            return TranslatedQuery::Unavailable;
        }

        let mut table = TableName::new(pure_name);
        table.schema_name = select
            .from
            .schema_name
            .as_deref()
            .map(str::trim)
            .filter(|schema| !schema.is_empty())
            .map(str::to_string);
        let limit = select
            .range
            .map(|range| range.limit)
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_FALLBACK_LIMIT);
        if let Some(range) = select.range.filter(|range| range.offset > 0) {
            debug!(
                offset = range.offset,
                "fallback query ignores the page offset and starts at the first row"
            );
        }
        let browse = Select::from_table(table).range(0, limit);

        let Some(mut dumper) = driver.create_dumper() else {
            return TranslatedQuery::Unavailable;
        };
        if dump_sql_select(&mut dumper, &browse).is_err() {
            return TranslatedQuery::Unavailable;
        }
        let sql = dumper.finish();

        if !self.fallback_warned.swap(true, Ordering::Relaxed) {
            warn!(
                rejected = %rejected,
                fallback = %sql,
                "generated SQL contained an empty identifier, using fallback"
            );
        }
        TranslatedQuery::Fallback { sql, rejected }
    }
}

/// Reports quoted identifiers that are empty, blank or never closed.
///
/// The scan is a single pass that follows the dialect's quoting rules: a
/// doubled closing character is an escape, and string literals are skipped.
#[must_use]
pub fn has_empty_identifier(sql: &str, dialect: &Dialect) -> bool {
    let open = dialect.identifier_open;
    let close = dialect.identifier_close;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\'' {
            loop {
                match chars.next() {
                    None => return false,
                    Some('\\') if dialect.backslash_escapes => {
                        chars.next();
                    }
                    Some('\'') => {
                        if chars.next_if_eq(&'\'').is_none() {
                            break;
                        }
                    }
                    Some(_) => {}
                }
            }
        } else if ch == open {
            let mut blank = true;
            let mut closed = false;
            while let Some(inner) = chars.next() {
                if inner == close {
                    if chars.next_if_eq(&close).is_some() {
                        blank = false;
                        continue;
                    }
                    closed = true;
                    break;
                }
                if !inner.is_whitespace() {
                    blank = false;
                }
            }
            if blank || !closed {
                return true;
            }
        }
    }
    false
}
