//! SQLite implementation of the habitat ports and the `habitat` command line tool.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod habitats;
pub mod messages;
pub mod model;

pub use backend::SqliteBackend;
