use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::drivers::ConnectionDescriptor;
use crate::grid_display::GridDisplay;
use crate::grid_loader::{LoadError, PageSource};
use crate::query_runner::{QueryBackend, QueryRunner, Row};
use crate::translator::SqlTranslator;

const COUNT_COLUMN_NAMES: [&str; 6] = [
    "count", "COUNT", "Count", "COUNT(1)", "COUNT(*)", "count(*)",
];

/// Pages a SQL table view: translates the display's derived queries for the
/// connection's engine and runs them through a backend.
pub struct SqlPageSource<B: QueryBackend> {
    translator: Arc<SqlTranslator>,
    connection: ConnectionDescriptor,
    display: GridDisplay,
    runner: QueryRunner<B>,
}

impl<B: QueryBackend> SqlPageSource<B> {
    #[must_use]
    pub fn new(
        translator: Arc<SqlTranslator>,
        connection: ConnectionDescriptor,
        display: GridDisplay,
        runner: QueryRunner<B>,
    ) -> Self {
        Self {
            translator,
            connection,
            display,
            runner,
        }
    }

    #[must_use]
    pub fn display(&self) -> &GridDisplay {
        &self.display
    }

    #[must_use]
    pub fn translator(&self) -> &SqlTranslator {
        &self.translator
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    /// SQL for one page, `None` when it cannot be produced.
    #[must_use]
    pub fn page_sql(&self, offset: u64, limit: u64) -> Option<String> {
        let select = self.display.page_query(offset, limit)?;
        self.translator
            .translate(&self.connection, &select.into())
            .into_sql()
    }

    #[must_use]
    pub fn count_sql(&self) -> Option<String> {
        let select = self.display.count_query()?;
        self.translator
            .translate(&self.connection, &select.into())
            .into_sql()
    }
}

#[async_trait]
impl<B: QueryBackend> PageSource for SqlPageSource<B> {
    fn is_available(&self) -> bool {
        self.page_sql(0, 1).is_some()
    }

    async fn load_page(&self, offset: u64, limit: u64) -> Result<Vec<Row>, LoadError> {
        let sql = self
            .page_sql(offset, limit)
            .ok_or_else(|| LoadError::new("no SQL is available for this grid"))?;
        // A short page ends paging, so the row cap must not shorten one.
        let cap = usize::try_from(limit)
            .unwrap_or(usize::MAX)
            .max(self.runner.max_rows());
        let fetched = self.runner.fetch_rows_capped(&sql, cap).await?;
        Ok(fetched.rows)
    }

    async fn load_row_count(&self) -> Option<u64> {
        let sql = self.count_sql()?;
        match self.runner.fetch_rows(&sql).await {
            Ok(fetched) => extract_row_count(&fetched.rows),
            Err(error) => {
                debug!(%error, "row count query failed");
                None
            }
        }
    }
}

/// Reads a row count from the first row of a count query's result.
///
/// Known count column names are tried first, then the first numeric value in
/// the row. Numbers may arrive as JSON numbers or numeric strings.
#[must_use]
pub fn extract_row_count(rows: &[Row]) -> Option<u64> {
    let row = rows.first()?;
    COUNT_COLUMN_NAMES
        .iter()
        .filter_map(|name| row.get(*name))
        .find_map(count_value)
        .or_else(|| row.values().find_map(count_value))
}

fn count_value(value: &Value) -> Option<u64> {
    let number = match value {
        Value::Number(number) => {
            if let Some(count) = number.as_u64() {
                return Some(count);
            }
            number.as_f64()?
        }
        Value::String(text) => {
            let text = text.trim();
            if let Ok(count) = text.parse::<u64>() {
                return Some(count);
            }
            text.parse::<f64>().ok()?
        }
        _ => return None,
    };
    (number.is_finite() && number >= 0.0).then(|| number.trunc() as u64)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::{extract_row_count, SqlPageSource};
    use crate::drivers::{ConnectionDescriptor, DriverRegistry};
    use crate::grid_display::GridDisplay;
    use crate::grid_loader::{GridLoader, LoadOutcome, LoaderState, PageSource, SkipReason};
    use crate::query_model::{ColumnReference, Select, SortDirection, TableName};
    use crate::query_runner::{
        QueryBackend, QueryBackendError, QueryRowStream, QueryRunner, Row, DEFAULT_MAX_ROWS,
    };
    use crate::settings::GridSettings;
    use crate::translator::SqlTranslator;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().expect("object row")
    }

    type Responder = Box<dyn Fn(&str) -> Result<Vec<Row>, QueryBackendError> + Send + Sync>;

    struct RecordingBackend {
        statements: Arc<Mutex<Vec<String>>>,
        respond: Responder,
    }

    struct VecStream(VecDeque<Row>);

    #[async_trait::async_trait]
    impl QueryRowStream for VecStream {
        async fn next_row(&mut self) -> Result<Option<Row>, QueryBackendError> {
            Ok(self.0.pop_front())
        }
    }

    #[async_trait::async_trait]
    impl QueryBackend for RecordingBackend {
        type Stream = VecStream;

        async fn start_query(&self, sql: &str) -> Result<Self::Stream, QueryBackendError> {
            self.statements
                .lock()
                .expect("statements lock")
                .push(sql.to_string());
            (self.respond)(sql).map(|rows| VecStream(rows.into()))
        }
    }

    fn users_display() -> GridDisplay {
        GridDisplay::for_select(
            Select::from_table(TableName::new("users"))
                .order(ColumnReference::new("id"), SortDirection::Asc),
        )
        .with_key_columns(["id"])
    }

    fn source(
        engine: &str,
        respond: Responder,
    ) -> (SqlPageSource<RecordingBackend>, Arc<Mutex<Vec<String>>>) {
        source_for(engine, users_display(), DEFAULT_MAX_ROWS, respond)
    }

    fn source_for(
        engine: &str,
        display: GridDisplay,
        max_rows: usize,
        respond: Responder,
    ) -> (SqlPageSource<RecordingBackend>, Arc<Mutex<Vec<String>>>) {
        let statements = Arc::new(Mutex::new(Vec::new()));
        let backend = RecordingBackend {
            statements: Arc::clone(&statements),
            respond,
        };
        let source = SqlPageSource::new(
            Arc::new(SqlTranslator::new(Arc::new(DriverRegistry::with_builtin_drivers()))),
            ConnectionDescriptor::from(engine),
            display,
            QueryRunner::new(backend).with_max_rows(max_rows),
        );
        (source, statements)
    }

    fn users_table(sql: &str) -> Result<Vec<Row>, QueryBackendError> {
        if sql.contains("COUNT(*)") {
            return Ok(vec![row(json!({"count": "7"}))]);
        }
        let offset = if sql.contains("OFFSET 5") { 5 } else { 0 };
        Ok((offset..(offset + 5).min(7))
            .map(|id| row(json!({"id": id})))
            .collect())
    }

    #[tokio::test]
    async fn pages_and_counts_through_translated_sql() {
        let (source, statements) = source("mysql", Box::new(users_table));

        let page = source.load_page(5, 5).await.expect("page should load");
        assert_eq!(page.len(), 2);
        assert_eq!(source.load_row_count().await, Some(7));

        assert_eq!(
            *statements.lock().expect("statements lock"),
            vec![
                "SELECT * FROM `users` ORDER BY `id` ASC LIMIT 5 OFFSET 5;".to_string(),
                "SELECT COUNT(*) AS `count` FROM `users`;".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn loader_pages_a_sql_source_to_completion() {
        let (source, statements) = source("mysql", Box::new(users_table));
        let loader = GridLoader::new(source, &GridSettings::default()).with_page_size(5);

        let first = loader.load_next_page().await;
        let second = loader.load_next_page().await;

        assert_eq!(
            first,
            LoadOutcome::Loaded {
                rows: 5,
                complete: false
            }
        );
        assert_eq!(
            second,
            LoadOutcome::Loaded {
                rows: 2,
                complete: true
            }
        );
        assert_eq!(loader.total_rows(), Some(7));
        assert_eq!(statements.lock().expect("statements lock").len(), 3);
    }

    #[tokio::test]
    async fn backend_errors_become_load_errors_and_unknown_counts() {
        let (source, _) = source(
            "mysql",
            Box::new(|_| Err(QueryBackendError::new("Access denied for user"))),
        );

        let error = source.load_page(0, 10).await.expect_err("page should fail");
        assert_eq!(error.message(), "Access denied for user");
        assert_eq!(source.load_row_count().await, None);
    }

    #[tokio::test]
    async fn engines_without_sql_are_unavailable() {
        let (mongo, statements) = source("mongo", Box::new(users_table));
        assert!(!mongo.is_available());
        assert!(mongo.load_page(0, 5).await.is_err());
        assert!(statements.lock().expect("statements lock").is_empty());

        let (mssql, _) = source("mssql", Box::new(users_table));
        assert!(mssql.is_available());
        assert_eq!(
            mssql.page_sql(0, 5).as_deref(),
            Some("SELECT TOP 5 * FROM [users] ORDER BY [id] ASC;")
        );
    }

    #[tokio::test]
    async fn row_cap_below_the_page_size_does_not_end_paging() {
        let (source, _) = source_for(
            "mysql",
            users_display(),
            50,
            Box::new(|sql| {
                if sql.contains("COUNT(*)") {
                    return Ok(vec![row(json!({"count": 1000}))]);
                }
                Ok((0..100).map(|id| row(json!({"id": id}))).collect())
            }),
        );
        let settings = GridSettings {
            page_size: 100,
            max_rows: 50,
        };
        let loader = GridLoader::new(source, &settings);

        assert_eq!(
            loader.load_next_page().await,
            LoadOutcome::Loaded {
                rows: 100,
                complete: false
            }
        );
        assert_eq!(loader.state(), LoaderState::Idle);
        assert_eq!(loader.total_rows(), Some(1000));
    }

    #[tokio::test]
    async fn untranslatable_select_is_skipped_rather_than_failed() {
        let display = GridDisplay::for_select(Select::from_table(TableName::new("  ")));
        let (source, statements) =
            source_for("mysql", display, DEFAULT_MAX_ROWS, Box::new(users_table));
        assert!(!source.is_available());

        let loader = GridLoader::new(source, &GridSettings::default());
        assert_eq!(
            loader.load_next_page().await,
            LoadOutcome::Skipped(SkipReason::Unavailable)
        );
        assert_eq!(loader.state(), LoaderState::Idle);
        assert_eq!(loader.error_message(), None);
        assert!(statements.lock().expect("statements lock").is_empty());
    }

    #[test]
    fn row_count_prefers_named_columns() {
        assert_eq!(extract_row_count(&[row(json!({"COUNT(*)": 12}))]), Some(12));
        assert_eq!(
            extract_row_count(&[row(json!({"label": "x", "Count": "31"}))]),
            Some(31)
        );
        assert_eq!(
            extract_row_count(&[row(json!({"total": 4, "count": 9}))]),
            Some(9)
        );
    }

    #[test]
    fn row_count_falls_back_to_first_numeric_value() {
        assert_eq!(
            extract_row_count(&[row(json!({"name": "t", "n": "-3", "rows": 8.0}))]),
            Some(8)
        );
        assert_eq!(extract_row_count(&[row(json!({"count": "many"}))]), None);
        assert_eq!(extract_row_count(&[row(json!({"x": -1}))]), None);
        assert_eq!(extract_row_count(&[]), None);
    }
}
