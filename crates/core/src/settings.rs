use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drivers::{ConnectionDescriptor, DriverRegistry, EngineDriver};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const MIN_PAGE_SIZE: usize = 5;
pub const MAX_PAGE_SIZE: usize = 1000;
pub const PASSWORD_ENV_VAR: &str = "TINYGRID_DB_PASSWORD";

#[must_use]
pub fn clamp_page_size(page_size: usize) -> usize {
    page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GridSettings {
    pub page_size: usize,
    pub max_rows: usize,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_rows: crate::query_runner::DEFAULT_MAX_ROWS,
        }
    }
}

impl GridSettings {
    #[must_use]
    pub fn effective_page_size(&self) -> usize {
        clamp_page_size(self.page_size)
    }
}

fn default_engine() -> String {
    "mysql".to_string()
}

fn default_port() -> u16 {
    3306
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub name: String,
    #[serde(default = "default_engine")]
    pub engine: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub database: Option<String>,
}

impl ConnectionSettings {
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine: default_engine(),
            host: host.into(),
            port: default_port(),
            user: user.into(),
            database: None,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::Connection {
            engine: Some(self.engine.clone()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read settings file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write settings file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsDocument {
    #[serde(default)]
    pub grid: GridSettings,
    #[serde(default)]
    pub connections: Vec<ConnectionSettings>,
    #[serde(default)]
    pub drivers: Vec<EngineDriver>,
}

impl SettingsDocument {
    /// Keeps the last connection declared under each name, sorted by name.
    fn normalize(&mut self) {
        let mut by_name = std::collections::BTreeMap::new();
        for connection in self.connections.drain(..) {
            by_name.insert(connection.name.clone(), connection);
        }
        self.connections = by_name.into_values().collect();
    }
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
    document: SettingsDocument,
}

impl FileSettingsStore {
    pub fn load_default() -> Result<Self, SettingsError> {
        let path = default_settings_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                document: SettingsDocument::default(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                document: SettingsDocument::default(),
            });
        }

        let mut document: SettingsDocument =
            toml::from_str(&raw).map_err(|source| SettingsError::Parse {
                path: path.clone(),
                source,
            })?;
        document.normalize();

        Ok(Self { path, document })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn grid(&self) -> &GridSettings {
        &self.document.grid
    }

    pub fn set_grid(&mut self, grid: GridSettings) {
        self.document.grid = grid;
    }

    #[must_use]
    pub fn connections(&self) -> &[ConnectionSettings] {
        &self.document.connections
    }

    #[must_use]
    pub fn connection(&self, name: &str) -> Option<&ConnectionSettings> {
        self.document
            .connections
            .iter()
            .find(|connection| connection.name == name)
    }

    pub fn upsert_connection(&mut self, connection: ConnectionSettings) {
        let connections = &mut self.document.connections;
        if let Some(existing) = connections
            .iter_mut()
            .find(|existing| existing.name == connection.name)
        {
            *existing = connection;
        } else {
            connections.push(connection);
            connections.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        }
    }

    #[must_use]
    pub fn delete_connection(&mut self, name: &str) -> bool {
        let original_len = self.document.connections.len();
        self.document
            .connections
            .retain(|connection| connection.name != name);
        self.document.connections.len() != original_len
    }

    #[must_use]
    pub fn drivers(&self) -> &[EngineDriver] {
        &self.document.drivers
    }

    pub fn add_driver(&mut self, driver: EngineDriver) {
        self.document.drivers.push(driver);
    }

    /// Configured drivers followed by the built-in ones, so a configured
    /// engine takes precedence over a built-in engine of the same name.
    #[must_use]
    pub fn driver_registry(&self) -> DriverRegistry {
        let mut registry = DriverRegistry::new();
        registry.extend(self.document.drivers.iter().cloned());
        registry.extend(DriverRegistry::with_builtin_drivers().drivers().iter().cloned());
        registry
    }

    pub fn persist(&self) -> Result<(), SettingsError> {
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| SettingsError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = toml::to_string_pretty(&self.document)
            .map_err(|source| SettingsError::Serialize { source })?;

        fs::write(&self.path, rendered).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let base_dir = if let Some(custom) = env::var_os("TINYGRID_CONFIG_DIR") {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(SettingsError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(SettingsError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("tinygrid").join("settings.toml"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{ConnectionSettings, FileSettingsStore, GridSettings, SettingsError};
    use crate::dialect::{Dialect, PaginationSyntax};
    use crate::drivers::{ConnectionDescriptor, EngineDriver};

    fn temp_settings_path(temp_dir: &TempDir) -> PathBuf {
        temp_dir.path().join("tinygrid").join("settings.toml")
    }

    #[test]
    fn missing_or_empty_file_loads_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_settings_path(&temp_dir);

        let store = FileSettingsStore::load_from_path(&path).expect("failed to load store");
        assert!(store.connections().is_empty());
        assert_eq!(store.grid(), &GridSettings::default());

        fs::create_dir_all(path.parent().expect("parent dir")).expect("create dir");
        fs::write(&path, "  \n").expect("write empty file");
        let store = FileSettingsStore::load_from_path(&path).expect("failed to load store");
        assert_eq!(store.grid().page_size, 100);
    }

    #[test]
    fn parses_grid_connections_and_drivers() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");
        fs::write(
            &path,
            r#"
[grid]
page_size = 2

[[connections]]
name = "warehouse"
engine = "mssql"
host = "db.internal"
port = 1433
user = "reporter"

[[connections]]
name = "local"
host = "127.0.0.1"
user = "root"
database = "shop"

[[drivers]]
engine = "mysql"
title = "MySQL (ANSI)"

[drivers.dialect]
identifier_open = '"'
identifier_close = '"'
pagination = "offset_fetch"
"#,
        )
        .expect("write settings");

        let store = FileSettingsStore::load_from_path(&path).expect("failed to load store");
        assert_eq!(store.grid().effective_page_size(), 5);
        assert_eq!(store.grid().max_rows, 2000);

        let names: Vec<_> = store.connections().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["local", "warehouse"]);
        let local = store.connection("local").expect("local connection");
        assert_eq!(local.engine, "mysql");
        assert_eq!(local.port, 3306);

        let registry = store.driver_registry();
        let mysql = registry
            .resolve(&ConnectionDescriptor::from("mysql"))
            .expect("mysql driver");
        assert_eq!(mysql.title.as_deref(), Some("MySQL (ANSI)"));
        assert_eq!(
            mysql.dialect.as_ref().map(|dialect| dialect.pagination),
            Some(PaginationSyntax::OffsetFetch)
        );
        assert!(registry
            .resolve(&ConnectionDescriptor::from("postgres"))
            .is_some());
    }

    #[test]
    fn upsert_persist_reload_and_delete_connection() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_settings_path(&temp_dir);

        let mut store = FileSettingsStore::load_from_path(&path).expect("failed to load store");
        let mut connection = ConnectionSettings::new("local", "127.0.0.1", "root");
        connection.database = Some("shop".to_string());
        store.upsert_connection(connection.clone());
        store.add_driver(EngineDriver::sql("clickhouse", Dialect::mysql()));
        store.persist().expect("failed to persist store");

        let mut reloaded = FileSettingsStore::load_from_path(&path).expect("failed to reload");
        assert_eq!(reloaded.connection("local"), Some(&connection));
        assert_eq!(reloaded.drivers().len(), 1);
        assert_eq!(
            reloaded.connection("local").map(ConnectionSettings::descriptor),
            Some(ConnectionDescriptor::Connection {
                engine: Some("mysql".to_string())
            })
        );

        assert!(reloaded.delete_connection("local"));
        assert!(!reloaded.delete_connection("local"));
        reloaded.persist().expect("failed to persist deletion");

        let reloaded = FileSettingsStore::load_from_path(path).expect("failed final reload");
        assert!(reloaded.connections().is_empty());
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");
        fs::write(&path, "[grid\npage_size = ").expect("write settings");

        let error = FileSettingsStore::load_from_path(&path).expect_err("parse should fail");
        assert!(matches!(error, SettingsError::Parse { path: ref failed, .. } if failed == &path));
    }
}
