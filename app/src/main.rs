use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tinygrid_adapters::mysql::MysqlDataBackend;
use tinygrid_core::drivers::ConnectionDescriptor;
use tinygrid_core::grid_display::GridDisplay;
use tinygrid_core::grid_loader::{GridLoader, LoadOutcome, PageSource};
use tinygrid_core::query_model::{
    ColumnReference, FilterPredicate, Select, SelectRequest, SortDirection, TableName,
};
use tinygrid_core::query_runner::{QueryRunner, Row};
use tinygrid_core::settings::{ConnectionSettings, FileSettingsStore, GridSettings};
use tinygrid_core::sql_source::SqlPageSource;
use tinygrid_core::translator::SqlTranslator;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "TINYGRID_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseOutcome {
    Command,
    HelpRequested,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct GridCommand {
    settings_path: Option<PathBuf>,
    connection: Option<String>,
    engine: Option<String>,
    schema: Option<String>,
    table: Option<String>,
    columns: Vec<String>,
    key_columns: Vec<String>,
    filters: Vec<FilterPredicate>,
    order: Vec<(String, SortDirection)>,
    page_size: Option<usize>,
    pages: usize,
    sql: Option<String>,
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut command = GridCommand {
        pages: 1,
        ..GridCommand::default()
    };
    if parse_args_from(std::env::args().skip(1), &mut command)? == ParseOutcome::HelpRequested {
        print_help();
        return Ok(());
    }

    let store = match &command.settings_path {
        Some(path) => FileSettingsStore::load_from_path(path)?,
        None => FileSettingsStore::load_default()?,
    };
    let mut grid_settings = *store.grid();
    if let Some(page_size) = command.page_size {
        grid_settings.page_size = page_size;
    }

    let connection = resolve_connection(&store, &command)?;
    let descriptor = descriptor_for(&command, connection.as_ref())?;
    let translator = Arc::new(SqlTranslator::new(Arc::new(store.driver_registry())));

    if command.dry_run {
        for statement in dry_run_statements(&translator, &descriptor, &command, &grid_settings)? {
            println!("{statement}");
        }
        return Ok(());
    }

    let connection = connection
        .ok_or_else(|| io_other("a --connection is required unless --dry-run is set"))?;
    let backend = MysqlDataBackend::from_connection(&connection)?;
    let runner = QueryRunner::new(backend.clone()).with_max_rows(grid_settings.max_rows);

    if let Some(sql) = &command.sql {
        let fetched = runner.fetch_rows(sql).await?;
        print_rows(&fetched.rows)?;
        if fetched.truncated {
            warn!(max_rows = runner.max_rows(), "result truncated");
        }
    } else {
        let display = grid_display(&command)?;
        let source = SqlPageSource::new(translator, descriptor, display, runner);
        let loader = GridLoader::new(source, &grid_settings);
        browse(&loader, command.pages).await?;
    }

    backend.disconnect().await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn browse<S: PageSource>(loader: &GridLoader<S>, pages: usize) -> io::Result<()> {
    let mut printed = 0;
    for _ in 0..pages {
        match loader.load_next_page().await {
            LoadOutcome::Loaded { complete, .. } => {
                let rows = loader.loaded_rows();
                print_rows(&rows[printed..])?;
                printed = rows.len();
                if complete {
                    break;
                }
            }
            LoadOutcome::Failed { message, .. } => return Err(io_other(message)),
            LoadOutcome::Skipped(reason) => {
                warn!(?reason, "page was not loaded");
                break;
            }
            LoadOutcome::Stale => break,
        }
    }

    let snapshot = loader.snapshot();
    info!(
        loaded_rows = snapshot.loaded_rows,
        total_rows = ?snapshot.total_rows,
        state = ?snapshot.state,
        "grid loaded"
    );
    Ok(())
}

fn print_rows(rows: &[Row]) -> io::Result<()> {
    for row in rows {
        println!("{}", serde_json::to_string(row).map_err(io_other)?);
    }
    Ok(())
}

fn resolve_connection(
    store: &FileSettingsStore,
    command: &GridCommand,
) -> io::Result<Option<ConnectionSettings>> {
    let Some(name) = &command.connection else {
        return Ok(None);
    };
    store
        .connection(name)
        .cloned()
        .map(Some)
        .ok_or_else(|| io_other(format!("unknown connection `{name}`")))
}

fn descriptor_for(
    command: &GridCommand,
    connection: Option<&ConnectionSettings>,
) -> io::Result<ConnectionDescriptor> {
    match (&command.engine, connection) {
        (Some(engine), _) => Ok(ConnectionDescriptor::Engine(engine.clone())),
        (None, Some(connection)) => Ok(connection.descriptor()),
        (None, None) => Err(io_other("either --connection or --engine is required")),
    }
}

fn grid_display(command: &GridCommand) -> io::Result<GridDisplay> {
    let table = command
        .table
        .as_deref()
        .ok_or_else(|| io_other("either --table or --sql is required"))?;
    let mut from = TableName::new(table);
    from.schema_name.clone_from(&command.schema);

    let mut select = Select::from_table(from);
    for column in &command.columns {
        select = select.column(ColumnReference::new(column.as_str()));
    }
    for predicate in &command.filters {
        select = select.filter(predicate.clone());
    }
    for (column, direction) in &command.order {
        select = select.order(ColumnReference::new(column.as_str()), *direction);
    }

    Ok(GridDisplay::for_select(select).with_key_columns(command.key_columns.iter().cloned()))
}

fn dry_run_statements(
    translator: &SqlTranslator,
    descriptor: &ConnectionDescriptor,
    command: &GridCommand,
    settings: &GridSettings,
) -> io::Result<Vec<String>> {
    let requests: Vec<SelectRequest> = if let Some(sql) = &command.sql {
        vec![SelectRequest::Sql(sql.clone())]
    } else {
        let display = grid_display(command)?;
        let page_size = settings.effective_page_size() as u64;
        let mut requests = Vec::new();
        for page in 0..command.pages.max(1) as u64 {
            if let Some(select) = display.page_query(page * page_size, page_size) {
                requests.push(select.into());
            }
        }
        requests.extend(display.count_query().map(SelectRequest::from));
        requests
    };

    requests
        .iter()
        .map(|request| {
            translator
                .translate(descriptor, request)
                .into_sql()
                .ok_or_else(|| io_other("no SQL translation is available for this engine"))
        })
        .collect()
}

fn parse_args_from(
    args: impl IntoIterator<Item = String>,
    command: &mut GridCommand,
) -> io::Result<ParseOutcome> {
    let mut args = args.into_iter();

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "-h" | "--help" => return Ok(ParseOutcome::HelpRequested),
            "--settings" => {
                command.settings_path = Some(PathBuf::from(next_value(&mut args, "--settings")?));
            }
            "--connection" => command.connection = Some(next_value(&mut args, "--connection")?),
            "--engine" => command.engine = Some(next_value(&mut args, "--engine")?),
            "--schema" => command.schema = Some(next_value(&mut args, "--schema")?),
            "--table" => command.table = Some(next_value(&mut args, "--table")?),
            "--columns" => command.columns = split_list(&next_value(&mut args, "--columns")?),
            "--key" => command.key_columns = split_list(&next_value(&mut args, "--key")?),
            "--where" => {
                let raw = next_value(&mut args, "--where")?;
                command.filters.push(parse_filter(&raw)?);
            }
            "--order" => {
                let raw = next_value(&mut args, "--order")?;
                command.order.push(parse_order(&raw)?);
            }
            "--page-size" => {
                command.page_size = Some(
                    next_value(&mut args, "--page-size")?
                        .parse::<usize>()
                        .map_err(|error| io_other(format!("invalid --page-size value: {error}")))?,
                );
            }
            "--pages" => {
                command.pages = next_value(&mut args, "--pages")?
                    .parse::<usize>()
                    .map_err(|error| io_other(format!("invalid --pages value: {error}")))?;
            }
            "--sql" => command.sql = Some(next_value(&mut args, "--sql")?),
            "--dry-run" => command.dry_run = true,
            _ => {
                return Err(io_other(format!("unknown argument `{flag}`")));
            }
        }
    }

    Ok(ParseOutcome::Command)
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> io::Result<String> {
    args.next()
        .ok_or_else(|| io_other(format!("missing value for `{flag}`")))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// `column` or `column:asc|desc`.
fn parse_order(raw: &str) -> io::Result<(String, SortDirection)> {
    let (column, direction) = match raw.rsplit_once(':') {
        Some((column, direction)) => {
            let direction = match direction.trim().to_ascii_lowercase().as_str() {
                "asc" => SortDirection::Asc,
                "desc" => SortDirection::Desc,
                other => return Err(io_other(format!("invalid sort direction `{other}`"))),
            };
            (column, direction)
        }
        None => (raw, SortDirection::Asc),
    };
    Ok((column.trim().to_string(), direction))
}

/// `column=value`, compared as text.
fn parse_filter(raw: &str) -> io::Result<FilterPredicate> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| io_other(format!("invalid --where value `{raw}`, expected column=value")))?;
    Ok(FilterPredicate::equals(column.trim(), value))
}

fn print_help() {
    println!(
        "tinygrid table browser\n\n\
Usage:\n  tinygrid [OPTIONS]\n\n\
Options:\n  --settings <path>         Settings file (default: <config dir>/tinygrid/settings.toml)\n  --connection <name>       Connection from the settings file\n  --engine <id>             Engine used for translation, overriding the connection's\n  --schema <name>           Schema of the table\n  --table <name>            Table to browse\n  --columns <a,b,...>       Columns to select (default: all)\n  --key <a,b,...>           Key columns identifying rows\n  --where <column=value>    Equality filter, repeatable\n  --order <column[:desc]>   Sort column, repeatable\n  --page-size <rows>        Rows per page (clamped to 5..=1000)\n  --pages <count>           Number of pages to load (default: 1)\n  --sql <query>             Run SQL verbatim instead of browsing a table\n  --dry-run                 Print the generated SQL without connecting\n\n\
Environment:\n  TINYGRID_DB_PASSWORD is used for authentication.\n  TINYGRID_LOG sets the log filter (default: info).\n"
    );
}

fn io_other(error: impl std::fmt::Display) -> io::Error {
    io::Error::other(error.to_string())
}
