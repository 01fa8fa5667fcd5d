use async_trait::async_trait;
use futures_util::StreamExt;
use mysql_async::consts::ColumnType;
use mysql_async::prelude::Query;
use mysql_async::{OptsBuilder, Pool, ResultSetStream, Row, TextProtocol, Value};
use serde_json::{Number, Value as JsonValue};
use thiserror::Error;
use tinygrid_core::query_runner::{self, QueryBackend, QueryBackendError, QueryRowStream};
use tinygrid_core::settings::{ConnectionSettings, PASSWORD_ENV_VAR};
use tracing::debug;

pub const ENGINE: &str = "mysql";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MysqlAdapterError {
    #[error("connection `{name}` uses engine `{engine}`, which this backend cannot run")]
    UnsupportedEngine { name: String, engine: String },
}

#[derive(Debug, Clone)]
pub struct MysqlDataBackend {
    pool: Pool,
}

impl MysqlDataBackend {
    pub fn from_connection(connection: &ConnectionSettings) -> Result<Self, MysqlAdapterError> {
        if connection.engine != ENGINE {
            return Err(MysqlAdapterError::UnsupportedEngine {
                name: connection.name.clone(),
                engine: connection.engine.clone(),
            });
        }
        Ok(Self {
            pool: Pool::new(opts_from_connection(connection)),
        })
    }

    pub async fn disconnect(&self) -> Result<(), mysql_async::Error> {
        self.pool.clone().disconnect().await
    }
}

#[derive(Debug)]
pub struct MysqlStreamingRowStream {
    stream: Option<ResultSetStream<'static, 'static, 'static, Row, TextProtocol>>,
}

#[async_trait]
impl QueryRowStream for MysqlStreamingRowStream {
    async fn next_row(&mut self) -> Result<Option<query_runner::Row>, QueryBackendError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        match stream.next().await {
            Some(Ok(row)) => Ok(Some(row_to_json(row))),
            Some(Err(error)) => Err(to_query_error(error)),
            None => {
                self.stream = None;
                Ok(None)
            }
        }
    }

    async fn cancel(&mut self) -> Result<(), QueryBackendError> {
        self.stream = None;
        Ok(())
    }
}

#[async_trait]
impl QueryBackend for MysqlDataBackend {
    type Stream = MysqlStreamingRowStream;

    async fn start_query(&self, sql: &str) -> Result<Self::Stream, QueryBackendError> {
        debug!(sql, "starting mysql query");
        let stream = sql
            .to_string()
            .stream::<Row, _>(self.pool.clone())
            .await
            .map_err(to_query_error)?;
        Ok(MysqlStreamingRowStream {
            stream: Some(stream),
        })
    }
}

fn opts_from_connection(connection: &ConnectionSettings) -> OptsBuilder {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(connection.host.clone())
        .tcp_port(connection.port)
        .user(Some(connection.user.clone()));

    if let Some(password) = resolve_password() {
        builder = builder.pass(Some(password));
    }

    if let Some(database) = non_empty(connection.database.as_deref()) {
        builder = builder.db_name(Some(database.to_string()));
    }

    builder
}

fn resolve_password() -> Option<String> {
    std::env::var(PASSWORD_ENV_VAR)
        .ok()
        .filter(|password| !password.is_empty())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

fn row_to_json(row: Row) -> query_runner::Row {
    let columns = row.columns();
    columns
        .iter()
        .zip(row.unwrap())
        .map(|(column, value)| {
            (
                column.name_str().into_owned(),
                mysql_value_to_json(value, column.column_type()),
            )
        })
        .collect()
}

/// Converts one cell. The text protocol delivers numbers as bytes, so the
/// column type decides whether they become JSON numbers.
fn mysql_value_to_json(value: Value, column_type: ColumnType) -> JsonValue {
    match value {
        Value::NULL => JsonValue::Null,
        Value::Int(value) => JsonValue::from(value),
        Value::UInt(value) => JsonValue::from(value),
        Value::Float(value) => float_to_json(f64::from(value)),
        Value::Double(value) => float_to_json(value),
        Value::Bytes(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            if is_integer_type(column_type) {
                if let Ok(number) = text.parse::<i64>() {
                    return JsonValue::from(number);
                }
                if let Ok(number) = text.parse::<u64>() {
                    return JsonValue::from(number);
                }
            } else if matches!(
                column_type,
                ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE
            ) {
                if let Ok(number) = text.parse::<f64>() {
                    return float_to_json(number);
                }
            }
            JsonValue::String(text.into_owned())
        }
        Value::Date(year, month, day, hour, minute, second, micros) => {
            JsonValue::String(format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
            ))
        }
        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if is_negative { "-" } else { "" };
            JsonValue::String(format!(
                "{sign}{days:03} {hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}

fn is_integer_type(column_type: ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_LONGLONG
            | ColumnType::MYSQL_TYPE_YEAR
    )
}

fn float_to_json(value: f64) -> JsonValue {
    Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

fn to_query_error(error: mysql_async::Error) -> QueryBackendError {
    QueryBackendError::new(error.to_string())
}
