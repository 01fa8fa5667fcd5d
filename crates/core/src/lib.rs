pub mod change_script;
pub mod change_set;
pub mod dialect;
pub mod drivers;
pub mod dumper;
pub mod grid_display;
pub mod grid_loader;
pub mod grider;
pub mod macros;
pub mod query_model;
pub mod query_runner;
pub mod settings;
pub mod sql_select;
pub mod sql_source;
pub mod translator;
