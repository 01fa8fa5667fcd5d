use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::dumper::SqlDumper;

/// A database engine known to the client.
///
/// SQL engines carry a [`Dialect`]; document engines (for example MongoDB)
/// have none and cannot create a dumper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDriver {
    pub engine: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub dialect: Option<Dialect>,
}

impl EngineDriver {
    #[must_use]
    pub fn sql(engine: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            engine: engine.into(),
            title: None,
            dialect: Some(dialect),
        }
    }

    #[must_use]
    pub fn document(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            title: None,
            dialect: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn supports_sql(&self) -> bool {
        self.dialect.is_some()
    }

    /// Fresh dumper for one statement, or `None` for engines without SQL.
    #[must_use]
    pub fn create_dumper(&self) -> Option<SqlDumper> {
        self.dialect.clone().map(SqlDumper::new)
    }
}

/// What a caller knows about the connection it wants to query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDescriptor {
    /// A bare engine identifier such as `mysql`.
    Engine(String),
    /// A stored connection, which may not declare its engine.
    Connection { engine: Option<String> },
}

impl ConnectionDescriptor {
    #[must_use]
    pub fn engine(&self) -> Option<&str> {
        let engine = match self {
            Self::Engine(engine) => Some(engine.as_str()),
            Self::Connection { engine } => engine.as_deref(),
        };
        engine.filter(|engine| !engine.is_empty())
    }
}

impl From<&str> for ConnectionDescriptor {
    fn from(engine: &str) -> Self {
        Self::Engine(engine.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: Vec<EngineDriver>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        registry.extend(builtin_drivers());
        registry
    }

    pub fn register(&mut self, driver: EngineDriver) {
        self.drivers.push(driver);
    }

    pub fn extend(&mut self, drivers: impl IntoIterator<Item = EngineDriver>) {
        self.drivers.extend(drivers);
    }

    #[must_use]
    pub fn drivers(&self) -> &[EngineDriver] {
        &self.drivers
    }

    /// First driver whose engine matches the descriptor. `None` means the
    /// connection cannot be translated, which is not an error.
    #[must_use]
    pub fn resolve(&self, connection: &ConnectionDescriptor) -> Option<&EngineDriver> {
        let engine = connection.engine()?;
        self.drivers.iter().find(|driver| driver.engine == engine)
    }
}

fn builtin_drivers() -> Vec<EngineDriver> {
    vec![
        EngineDriver::sql("mysql", Dialect::mysql()).with_title("MySQL"),
        EngineDriver::sql("postgres", Dialect::postgres()).with_title("PostgreSQL"),
        EngineDriver::sql("sqlite", Dialect::sqlite()).with_title("SQLite"),
        EngineDriver::sql("mssql", Dialect::mssql()).with_title("SQL Server"),
        EngineDriver::sql("oracle", Dialect::oracle()).with_title("Oracle"),
        EngineDriver::document("mongo").with_title("MongoDB"),
    ]
}

#[cfg(test)]
mod tests {
    use super::{ConnectionDescriptor, DriverRegistry, EngineDriver};
    use crate::dialect::Dialect;

    #[test]
    fn resolves_bare_engine_and_connection_shapes() {
        let registry = DriverRegistry::with_builtin_drivers();

        let by_id = registry
            .resolve(&ConnectionDescriptor::from("postgres"))
            .expect("postgres driver");
        assert_eq!(by_id.engine, "postgres");

        let by_connection = registry
            .resolve(&ConnectionDescriptor::Connection {
                engine: Some("mysql".to_string()),
            })
            .expect("mysql driver");
        assert_eq!(by_connection.dialect, Some(Dialect::mysql()));
    }

    #[test]
    fn missing_or_unknown_engine_resolves_to_none() {
        let registry = DriverRegistry::with_builtin_drivers();

        assert!(registry
            .resolve(&ConnectionDescriptor::Connection { engine: None })
            .is_none());
        assert!(registry
            .resolve(&ConnectionDescriptor::Engine(String::new()))
            .is_none());
        assert!(registry.resolve(&ConnectionDescriptor::from("db2")).is_none());
    }

    #[test]
    fn first_registered_driver_wins() {
        let mut registry = DriverRegistry::new();
        registry.register(EngineDriver::sql("mysql", Dialect::postgres()).with_title("custom"));
        registry.extend(DriverRegistry::with_builtin_drivers().drivers().to_vec());

        let driver = registry
            .resolve(&ConnectionDescriptor::from("mysql"))
            .expect("mysql driver");
        assert_eq!(driver.title.as_deref(), Some("custom"));
    }

    #[test]
    fn document_engines_resolve_but_cannot_dump_sql() {
        let registry = DriverRegistry::with_builtin_drivers();
        let mongo = registry
            .resolve(&ConnectionDescriptor::from("mongo"))
            .expect("mongo driver");

        assert!(!mongo.supports_sql());
        assert!(mongo.create_dumper().is_none());
    }
}
